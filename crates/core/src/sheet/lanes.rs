//! Répartition des lignes compilées par couloir

use super::barcode::CompiledSheet;
use super::header::{columns, HeaderIndex};
use super::table::SheetRow;
use crate::error::{DemuxError, Result};
use dmx_utils::format_lane_list;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Couloirs attendus pour un run
pub const EXPECTED_LANES: RangeInclusive<u8> = 1..=8;

/// Lignes compilées d'un couloir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneBarcodeSet {
    pub lane: u8,
    pub headers: Arc<HeaderIndex>,
    pub rows: Vec<SheetRow>,
}

impl LaneBarcodeSet {
    fn first_value(&self, name: &str) -> Option<&str> {
        self.rows.first().and_then(|row| row.get(&self.headers, name))
    }

    /// Structure de lecture de la première ligne
    pub fn read_structure(&self) -> Option<&str> {
        self.first_value(columns::READ_STRUCTURE)
    }

    /// Longueur d'index attendue selon la structure de lecture
    pub fn index_length(&self) -> Option<usize> {
        self.read_structure()
            .and_then(super::barcode::ReadStructure::parse)
            .map(|rs| rs.index_length)
    }

    /// Longueur du barcode compilé de la première ligne
    pub fn barcode_length(&self) -> Option<usize> {
        self.first_value(columns::BARCODE).map(|b| b.chars().count())
    }

    /// Barcode compilé d'une ligne
    pub fn barcode_of<'a>(&self, row: &'a SheetRow) -> Option<&'a str> {
        row.get(&self.headers, columns::BARCODE)
    }

    /// Projets présents dans le couloir, dans l'ordre d'apparition
    pub fn projects(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.rows
            .iter()
            .filter_map(|row| row.get(&self.headers, columns::PROJECT))
            .filter(|project| seen.insert(project.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Lignes d'un projet
    pub fn rows_for_project<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a SheetRow> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.get(&self.headers, columns::PROJECT) == Some(project))
    }
}

/// Résultat de la répartition
#[derive(Debug, Clone)]
pub struct LanePartition {
    /// Couloirs présents et non omis, par numéro
    pub lanes: BTreeMap<u8, LaneBarcodeSet>,
    /// Couloirs présents mais omis
    pub omitted: BTreeSet<u8>,
}

/// Couloirs ni présents ni omis
pub fn missing_lanes(present: &BTreeSet<u8>, omitted: &BTreeSet<u8>) -> BTreeSet<u8> {
    EXPECTED_LANES
        .filter(|lane| !present.contains(lane) && !omitted.contains(lane))
        .collect()
}

/// Regroupe les lignes par couloir et vérifie que chaque couloir attendu est
/// présent ou explicitement omis
pub fn partition(sheet: &CompiledSheet, omitted: &BTreeSet<u8>) -> Result<LanePartition> {
    let lane_column = sheet
        .headers
        .position(columns::LANE)
        .ok_or_else(|| DemuxError::MissingColumn(columns::LANE.to_string()))?;
    let headers = Arc::new(sheet.headers.clone());

    let mut grouped: BTreeMap<u8, Vec<SheetRow>> = BTreeMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        let value = row.values.get(lane_column).map(|v| v.trim()).unwrap_or_default();
        let lane = value
            .parse::<u8>()
            .ok()
            .filter(|lane| EXPECTED_LANES.contains(lane))
            .ok_or_else(|| DemuxError::InvalidLane {
                value: value.to_string(),
                row: i + 1,
            })?;
        grouped.entry(lane).or_default().push(row.clone());
    }

    let present: BTreeSet<u8> = grouped.keys().copied().collect();
    let missing = missing_lanes(&present, omitted);
    if !missing.is_empty() {
        let suggestion: BTreeSet<u8> = omitted.union(&missing).copied().collect();
        return Err(DemuxError::MissingLanes {
            missing: format_lane_list(&missing),
            suggestion: format_lane_list(&suggestion),
        });
    }

    let mut lanes = BTreeMap::new();
    let mut skipped = BTreeSet::new();
    for (lane, rows) in grouped {
        if omitted.contains(&lane) {
            tracing::info!("Couloir {} présent mais omis", lane);
            skipped.insert(lane);
            continue;
        }
        lanes.insert(
            lane,
            LaneBarcodeSet {
                lane,
                headers: headers.clone(),
                rows,
            },
        );
    }

    Ok(LanePartition {
        lanes,
        omitted: skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{BarcodeCompiler, SampleSheet};

    fn sheet_with_lanes(lanes: &[u8]) -> CompiledSheet {
        let mut text = String::from("Lane\tProject\tIndex\tRead Structure\n");
        for lane in lanes {
            text.push_str(&format!("{}\tP1\tACGT\t4I\n", lane));
        }
        BarcodeCompiler::compile(&SampleSheet::parse(&text).unwrap())
    }

    fn set(values: &[u8]) -> BTreeSet<u8> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_missing_lanes_with_omit_list() {
        let omitted = set(&[3]);
        assert!(missing_lanes(&set(&[1, 2, 4, 5, 6, 7, 8]), &omitted).is_empty());
        assert_eq!(missing_lanes(&set(&[1, 2, 4, 5, 7, 8]), &omitted), set(&[6]));
    }

    #[test]
    fn test_partition_groups_and_skips_omitted() {
        let sheet = sheet_with_lanes(&[1, 2, 2, 3, 4, 5, 6, 7, 8]);
        let partition = partition(&sheet, &set(&[3])).unwrap();

        assert_eq!(partition.lanes.len(), 7);
        assert_eq!(partition.lanes[&2].rows.len(), 2);
        assert!(!partition.lanes.contains_key(&3));
        assert_eq!(partition.omitted, set(&[3]));
    }

    #[test]
    fn test_partition_reports_missing_lanes_and_suggestion() {
        let sheet = sheet_with_lanes(&[1, 2, 4, 5, 7, 8]);
        let err = partition(&sheet, &set(&[3])).unwrap_err();

        match err {
            DemuxError::MissingLanes { missing, suggestion } => {
                assert_eq!(missing, "6");
                assert_eq!(suggestion, "3,6");
            }
            other => panic!("erreur inattendue: {:?}", other),
        }
    }

    #[test]
    fn test_partition_rejects_invalid_lane() {
        let sheet = sheet_with_lanes(&[1, 9]);
        let err = partition(&sheet, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, DemuxError::InvalidLane { row: 2, .. }));
    }

    #[test]
    fn test_lane_accessors() {
        let sheet = sheet_with_lanes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let partition = partition(&sheet, &BTreeSet::new()).unwrap();
        let lane = &partition.lanes[&1];

        assert_eq!(lane.read_structure(), Some("4I"));
        assert_eq!(lane.index_length(), Some(4));
        assert_eq!(lane.barcode_length(), Some(4));
        assert_eq!(lane.projects(), vec!["P1".to_string()]);
        assert_eq!(lane.rows_for_project("P1").count(), 1);
    }
}
