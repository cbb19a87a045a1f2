//! Chaîne de validation d'un couloir
//!
//! Les règles sont évaluées dans un ordre fixe et la première en échec
//! arrête la chaîne: seul son message est conservé.

use crate::config::ToolsConfig;
use crate::sheet::{columns, LaneBarcodeSet};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Colonnes dont la valeur est obligatoire sur chaque ligne
pub const REQUIRED_COLUMNS: &[&str] = &[
    columns::PROJECT,
    columns::SAMPLE_NAME,
    columns::LIBRARY_NAME,
    columns::BARCODE,
    columns::FCID,
    columns::READ_STRUCTURE,
];

/// Résultat de validation d'un couloir
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// État externe lu par certaines règles
#[derive(Debug, Clone, Default)]
pub struct ValidationEnv {
    /// Racine des répertoires projet
    pub output_root: PathBuf,
    pub tools: ToolsConfig,
}

/// Règle de validation d'un couloir
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err(message)` si le couloir viole la règle
    fn check(&self, lane: &LaneBarcodeSet, env: &ValidationEnv) -> Result<(), String>;
}

/// Chaque ligne porte une valeur pour chaque colonne obligatoire
pub struct RequiredValues;

impl ValidationRule for RequiredValues {
    fn name(&self) -> &'static str {
        "required-values"
    }

    fn check(&self, lane: &LaneBarcodeSet, _env: &ValidationEnv) -> Result<(), String> {
        for &column in REQUIRED_COLUMNS {
            let position = lane
                .headers
                .position(column)
                .ok_or_else(|| format!("En-tête requis introuvable: {}", column))?;

            for (i, row) in lane.rows.iter().enumerate() {
                if !row.has_value(position) {
                    return Err(format!(
                        "Valeur manquante pour {} à la ligne {} du couloir {}",
                        column,
                        i + 1,
                        lane.lane
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Aucun barcode compilé n'apparaît deux fois dans le couloir
pub struct UniqueBarcodes;

impl ValidationRule for UniqueBarcodes {
    fn name(&self) -> &'static str {
        "unique-barcodes"
    }

    fn check(&self, lane: &LaneBarcodeSet, _env: &ValidationEnv) -> Result<(), String> {
        let mut seen = HashSet::new();
        for row in &lane.rows {
            if let Some(barcode) = lane.barcode_of(row) {
                if !seen.insert(barcode) {
                    return Err(format!(
                        "Barcode {} présent plusieurs fois dans le couloir {}",
                        barcode, lane.lane
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Tous les barcodes ont la longueur du premier
pub struct EqualBarcodeLength;

impl ValidationRule for EqualBarcodeLength {
    fn name(&self) -> &'static str {
        "equal-barcode-length"
    }

    fn check(&self, lane: &LaneBarcodeSet, _env: &ValidationEnv) -> Result<(), String> {
        let Some(expected) = lane.barcode_length() else {
            return Ok(());
        };
        for row in &lane.rows {
            let barcode = lane.barcode_of(row).unwrap_or_default();
            let length = barcode.chars().count();
            if length != expected {
                return Err(format!(
                    "Longueur de barcode {} ({}) différente de {} dans le couloir {}",
                    length, barcode, expected, lane.lane
                ));
            }
        }
        Ok(())
    }
}

fn check_uniform(lane: &LaneBarcodeSet, column: &str) -> Result<(), String> {
    let mut values = lane.rows.iter().map(|row| row.get(&lane.headers, column));
    let Some(first) = values.next() else {
        return Ok(());
    };
    match values.find(|value| *value != first) {
        Some(other) => Err(format!(
            "{} différents dans le couloir {}: {} et {}",
            column,
            lane.lane,
            first.unwrap_or_default(),
            other.unwrap_or_default()
        )),
        None => Ok(()),
    }
}

/// Toutes les lignes partagent la structure de lecture
pub struct EqualReadStructure;

impl ValidationRule for EqualReadStructure {
    fn name(&self) -> &'static str {
        "equal-read-structure"
    }

    fn check(&self, lane: &LaneBarcodeSet, _env: &ValidationEnv) -> Result<(), String> {
        check_uniform(lane, columns::READ_STRUCTURE)
    }
}

/// Toutes les lignes partagent le FCID
pub struct EqualFlowcell;

impl ValidationRule for EqualFlowcell {
    fn name(&self) -> &'static str {
        "equal-fcid"
    }

    fn check(&self, lane: &LaneBarcodeSet, _env: &ValidationEnv) -> Result<(), String> {
        check_uniform(lane, columns::FCID)
    }
}

/// Aucune librairie du couloir n'a déjà de fichier dans son projet
pub struct LibraryNotPresent;

impl LibraryNotPresent {
    fn find_conflict(dir: &Path, libraries: &BTreeSet<&str>) -> Option<PathBuf> {
        let entries = fs::read_dir(dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                if let Some(found) = Self::find_conflict(&path, libraries) {
                    return Some(found);
                }
            } else {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let prefix = name.split('_').next().unwrap_or_default();
                if libraries.contains(prefix) {
                    return Some(path);
                }
            }
        }
        None
    }
}

impl ValidationRule for LibraryNotPresent {
    fn name(&self) -> &'static str {
        "library-not-present"
    }

    fn check(&self, lane: &LaneBarcodeSet, env: &ValidationEnv) -> Result<(), String> {
        for project in lane.projects() {
            let libraries: BTreeSet<&str> = lane
                .rows_for_project(&project)
                .filter_map(|row| row.get(&lane.headers, columns::LIBRARY_NAME))
                .collect();

            let project_root = env.output_root.join(&project);
            if let Some(path) = Self::find_conflict(&project_root, &libraries) {
                return Err(format!(
                    "Librairie déjà présente pour le projet {}: {}",
                    project,
                    path.display()
                ));
            }
        }
        Ok(())
    }
}

/// Les outils externes sont configurés
pub struct ToolsAvailable;

impl ValidationRule for ToolsAvailable {
    fn name(&self) -> &'static str {
        "tools-available"
    }

    fn check(&self, _lane: &LaneBarcodeSet, env: &ValidationEnv) -> Result<(), String> {
        env.tools.require().map(|_| ()).map_err(|e| e.to_string())
    }
}

/// Moteur de validation: règles ordonnées, arrêt à la première erreur
pub struct ValidationEngine {
    rules: Vec<Box<dyn ValidationRule>>,
    env: ValidationEnv,
}

impl ValidationEngine {
    /// Chaîne standard; `skip_library_check` retire la règle des librairies
    pub fn standard(env: ValidationEnv, skip_library_check: bool) -> Self {
        let mut rules: Vec<Box<dyn ValidationRule>> = vec![
            Box::new(RequiredValues),
            Box::new(UniqueBarcodes),
            Box::new(EqualBarcodeLength),
            Box::new(EqualReadStructure),
            Box::new(EqualFlowcell),
        ];
        if !skip_library_check {
            rules.push(Box::new(LibraryNotPresent));
        }
        rules.push(Box::new(ToolsAvailable));

        Self { rules, env }
    }

    /// Chaîne personnalisée
    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>, env: ValidationEnv) -> Self {
        Self { rules, env }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Valide un couloir
    pub fn validate(&self, lane: &LaneBarcodeSet) -> ValidationResult {
        for rule in &self.rules {
            if let Err(message) = rule.check(lane, &self.env) {
                tracing::warn!(
                    lane = lane.lane,
                    rule = rule.name(),
                    "Couloir {} refusé: {}",
                    lane.lane,
                    message
                );
                return ValidationResult::fail(message);
            }
        }
        tracing::debug!(lane = lane.lane, "Couloir {} validé", lane.lane);
        ValidationResult::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCommand;
    use crate::sheet::{partition, BarcodeCompiler, SampleSheet};

    const HEADER: &str = "FCID\tLane\tProject\tSample Name\tLibrary Name\tIndex\tRead Structure\n";

    fn lane_from(rows: &[&str]) -> LaneBarcodeSet {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        for lane in 2..=8 {
            text.push_str(&format!("FC1\t{}\tP9\tS\tL\tTTTT\t4I\n", lane));
        }
        let compiled = BarcodeCompiler::compile(&SampleSheet::parse(&text).unwrap());
        partition(&compiled, &BTreeSet::new()).unwrap().lanes.remove(&1).unwrap()
    }

    fn env_with_tools(output_root: &Path) -> ValidationEnv {
        ValidationEnv {
            output_root: output_root.to_path_buf(),
            tools: ToolsConfig {
                basecall_decoder: Some(ToolCommand::new("basecall-decoder")),
                index_decoder: Some(ToolCommand::new("index-decoder")),
            },
        }
    }

    #[test]
    fn test_valid_lane_passes() {
        let dir = tempfile::tempdir().unwrap();
        let lane = lane_from(&[
            "FC1\t1\tP1\tS1\tLIB1\tACGT\t4I",
            "FC1\t1\tP1\tS2\tLIB2\tTGCA\t4I",
        ]);
        let engine = ValidationEngine::standard(env_with_tools(dir.path()), false);
        assert_eq!(engine.validate(&lane), ValidationResult::pass());
    }

    #[test]
    fn test_missing_value() {
        let lane = lane_from(&["FC1\t1\tP1\tS1\t\tACGT\t4I"]);
        let err = RequiredValues.check(&lane, &ValidationEnv::default()).unwrap_err();
        assert!(err.contains(columns::LIBRARY_NAME));
    }

    #[test]
    fn test_missing_header_reports_original_name() {
        let text = "Lane\tProject\tSample Name\tLibrary Name\tFCID\tRead Structure\n\
                    1\tP1\tS1\tL1\tFC1\t8I\n";
        let compiled = BarcodeCompiler::compile(&SampleSheet::parse(text).unwrap());
        let omitted: BTreeSet<u8> = (2..=8).collect();
        let lane = partition(&compiled, &omitted).unwrap().lanes.remove(&1).unwrap();

        let err = RequiredValues.check(&lane, &ValidationEnv::default()).unwrap_err();
        assert_eq!(err, "En-tête requis introuvable: Index");
    }

    #[test]
    fn test_duplicate_barcode() {
        let lane = lane_from(&[
            "FC1\t1\tP1\tS1\tLIB1\tACGT\t4I",
            "FC1\t1\tP1\tS2\tLIB2\tACGT (dup)\t4I",
        ]);
        let err = UniqueBarcodes.check(&lane, &ValidationEnv::default()).unwrap_err();
        assert!(err.contains("ACGT"));
    }

    #[test]
    fn test_unequal_barcode_length() {
        let lane = lane_from(&[
            "FC1\t1\tP1\tS1\tLIB1\tACGT\t4I",
            "FC1\t1\tP1\tS2\tLIB2\tACGTA\t4I",
        ]);
        assert!(EqualBarcodeLength.check(&lane, &ValidationEnv::default()).is_err());
    }

    #[test]
    fn test_unequal_read_structure_and_fcid() {
        let lane = lane_from(&[
            "FC1\t1\tP1\tS1\tLIB1\tACGT\t4I",
            "FC2\t1\tP1\tS2\tLIB2\tTGCA\t2I2J",
        ]);
        assert!(EqualReadStructure.check(&lane, &ValidationEnv::default()).is_err());
        assert!(EqualFlowcell.check(&lane, &ValidationEnv::default()).is_err());
    }

    #[test]
    fn test_short_circuit_keeps_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Barcode dupliqué ET FCID différent: seule la règle d'unicité parle
        let lane = lane_from(&[
            "FC1\t1\tP1\tS1\tLIB1\tACGT\t4I",
            "FC2\t1\tP1\tS2\tLIB2\tACGT\t4I",
        ]);
        let engine = ValidationEngine::standard(env_with_tools(dir.path()), false);
        let result = engine.validate(&lane);

        assert!(!result.passed);
        let message = result.message.unwrap();
        assert!(message.starts_with("Barcode ACGT"));
        assert!(!message.contains("FCID"));
    }

    #[test]
    fn test_library_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let previous = dir.path().join("P1/OLD_RUN");
        fs::create_dir_all(&previous).unwrap();
        fs::write(previous.join("LIB2_S2_L001_R1.fastq.gz"), b"").unwrap();

        let lane = lane_from(&[
            "FC1\t1\tP1\tS1\tLIB1\tACGT\t4I",
            "FC1\t1\tP1\tS2\tLIB2\tTGCA\t4I",
        ]);
        let env = env_with_tools(dir.path());

        let err = LibraryNotPresent.check(&lane, &env).unwrap_err();
        assert!(err.contains("LIB2_S2_L001_R1.fastq.gz"));

        let engine = ValidationEngine::standard(env.clone(), true);
        assert!(!engine.rule_names().contains(&"library-not-present"));
        assert!(engine.validate(&lane).passed);
    }

    #[test]
    fn test_tools_not_configured() {
        let lane = lane_from(&["FC1\t1\tP1\tS1\tLIB1\tACGT\t4I"]);
        let err = ToolsAvailable.check(&lane, &ValidationEnv::default()).unwrap_err();
        assert!(err.contains("tools.basecall_decoder"));
    }
}
