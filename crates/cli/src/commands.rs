//! Sous-commandes de la CLI

pub mod check;
pub mod run;
