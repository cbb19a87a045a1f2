//! Types d'erreurs pour la préparation et l'orchestration du démultiplexage

use std::path::PathBuf;
use thiserror::Error;

/// Erreurs fatales pour l'ensemble du run
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("Feuille d'échantillons illisible ({path}): {source}")]
    SampleSheetUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Feuille d'échantillons vide: {0}")]
    EmptySampleSheet(PathBuf),

    #[error("Métadonnées du run illisibles ({path}): {reason}")]
    RunInfoUnreadable { path: PathBuf, reason: String },

    #[error("Colonne requise introuvable: {0}")]
    MissingColumn(String),

    #[error("Valeur de couloir invalide {value:?} à la ligne {row}")]
    InvalidLane { value: String, row: usize },

    #[error(
        "Couloir(s) {missing} absent(s) de la feuille d'échantillons; \
         relancer avec --omit-lanes {suggestion} si c'est voulu"
    )]
    MissingLanes { missing: String, suggestion: String },

    #[error("Outil externe non configuré: {0}")]
    ToolNotConfigured(&'static str),

    #[error("Erreur de configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Erreur IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erreur de sérialisation: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DemuxError>;
