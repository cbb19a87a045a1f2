//! Formatage des horodatages et des listes de couloirs

use chrono::{DateTime, TimeZone};
use std::collections::BTreeSet;
use std::fmt::Display;
use thiserror::Error;

/// Format des horodatages de run (`20240131_142501`)
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Erreur de lecture d'une liste de couloirs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaneListError {
    #[error("Numéro de couloir invalide: {0:?}")]
    InvalidLane(String),
}

/// Formate un horodatage de run
pub fn run_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format(RUN_TIMESTAMP_FORMAT).to_string()
}

/// Formate une liste de couloirs triée, séparée par des virgules (`3,6`)
pub fn format_lane_list<'a, I>(lanes: I) -> String
where
    I: IntoIterator<Item = &'a u8>,
{
    let sorted: BTreeSet<u8> = lanes.into_iter().copied().collect();
    sorted
        .iter()
        .map(|lane| lane.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Lit une liste de couloirs séparés par des virgules
///
/// Les entrées vides sont ignorées, `""` donne un ensemble vide.
pub fn parse_lane_list(value: &str) -> Result<BTreeSet<u8>, LaneListError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u8>()
                .map_err(|_| LaneListError::InvalidLane(item.to_string()))
        })
        .collect()
}
