//! Contexte d'un run: identifiant, horodatage et arborescence de sortie

use crate::error::{DemuxError, Result};
use crate::sheet::{columns, LaneBarcodeSet};
use chrono::Local;
use dmx_utils::run_timestamp;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Nom du répertoire des lectures non attribuées
pub const UNDETERMINED_DIR: &str = "Undetermined";

/// Métadonnées lues dans `RunInfo.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub run_number: Option<u32>,
    pub flowcell: Option<String>,
    pub instrument: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunInfoXml {
    #[serde(rename = "Run")]
    run: RunXml,
}

#[derive(Debug, Deserialize)]
struct RunXml {
    #[serde(rename = "@Id")]
    id: String,
    #[serde(rename = "@Number", default)]
    number: Option<u32>,
    #[serde(rename = "Flowcell", default)]
    flowcell: Option<String>,
    #[serde(rename = "Instrument", default)]
    instrument: Option<String>,
}

impl RunInfo {
    /// Analyse le contenu de `RunInfo.xml`
    pub fn parse(xml: &str) -> std::result::Result<Self, String> {
        let doc: RunInfoXml = quick_xml::de::from_str(xml).map_err(|e| e.to_string())?;
        let run_id = doc.run.id.trim().to_string();
        if run_id.is_empty() {
            return Err("attribut Run@Id vide".to_string());
        }

        Ok(Self {
            run_id,
            run_number: doc.run.number,
            flowcell: doc.run.flowcell,
            instrument: doc.run.instrument,
        })
    }

    /// Lit `RunInfo.xml` depuis le disque
    pub fn read(path: &Path) -> Result<Self> {
        let unreadable = |reason: String| DemuxError::RunInfoUnreadable {
            path: path.to_path_buf(),
            reason,
        };
        let xml = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        Self::parse(&xml).map_err(unreadable)
    }
}

/// Répertoires projet découverts pendant la compilation des barcodes
///
/// L'ensemble ne fait que croître.
#[derive(Debug, Default)]
pub struct OutputDirectorySet {
    dirs: Mutex<BTreeMap<String, PathBuf>>,
}

impl OutputDirectorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre le répertoire d'un projet; retourne `true` s'il est nouveau
    pub fn insert(&self, project: &str, dir: PathBuf) -> bool {
        let mut dirs = self.dirs.lock();
        if dirs.contains_key(project) {
            return false;
        }
        dirs.insert(project.to_string(), dir);
        true
    }

    pub fn get(&self, project: &str) -> Option<PathBuf> {
        self.dirs.lock().get(project).cloned()
    }

    /// Copie de l'ensemble, triée par projet
    pub fn snapshot(&self) -> BTreeMap<String, PathBuf> {
        self.dirs.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.dirs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.lock().is_empty()
    }
}

/// Contexte partagé par tous les composants d'un run
///
/// L'identifiant et l'horodatage sont calculés au premier accès puis figés.
#[derive(Debug)]
pub struct RunContext {
    run_dir: PathBuf,
    output_root: PathBuf,
    temp_root: PathBuf,
    run_info: OnceLock<RunInfo>,
    timestamp: OnceLock<String>,
    output_dirs: OutputDirectorySet,
}

impl RunContext {
    pub fn new(
        run_dir: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_dir: run_dir.into(),
            output_root: output_root.into(),
            temp_root: temp_root.into(),
            run_info: OnceLock::new(),
            timestamp: OnceLock::new(),
            output_dirs: OutputDirectorySet::new(),
        }
    }

    /// Fixe les métadonnées du run sans lire `RunInfo.xml`
    pub fn with_run_info(self, info: RunInfo) -> Self {
        let _ = self.run_info.set(info);
        self
    }

    /// Fixe l'horodatage du run
    pub fn with_timestamp(self, timestamp: impl Into<String>) -> Self {
        let _ = self.timestamp.set(timestamp.into());
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn run_info_path(&self) -> PathBuf {
        self.run_dir.join("RunInfo.xml")
    }

    /// Métadonnées du run, lues une seule fois
    pub fn run_info(&self) -> Result<&RunInfo> {
        if let Some(info) = self.run_info.get() {
            return Ok(info);
        }
        let info = RunInfo::read(&self.run_info_path())?;
        Ok(self.run_info.get_or_init(|| info))
    }

    pub fn run_id(&self) -> Result<&str> {
        Ok(&self.run_info()?.run_id)
    }

    /// Horodatage du run, formaté une seule fois
    pub fn timestamp(&self) -> &str {
        self.timestamp.get_or_init(|| run_timestamp(&Local::now()))
    }

    pub fn output_dirs(&self) -> &OutputDirectorySet {
        &self.output_dirs
    }

    pub fn basecalls_dir(&self) -> PathBuf {
        self.run_dir.join("Data").join("Intensities").join("BaseCalls")
    }

    /// `<temp_root>/<run_id>/`
    pub fn temp_dir(&self) -> Result<PathBuf> {
        Ok(self.temp_root.join(self.run_id()?))
    }

    /// Répertoire de travail d'un couloir
    pub fn lane_temp_dir(&self, lane: u8) -> Result<PathBuf> {
        Ok(self.temp_dir()?.join(format!("lane{}", lane)))
    }

    pub fn barcode_file(&self, lane: u8) -> Result<PathBuf> {
        Ok(self.temp_dir()?.join(format!("barcodes_{}.txt", lane)))
    }

    /// `<output_root>/Undetermined/<run_id>/<timestamp>/`
    pub fn undetermined_dir(&self) -> Result<PathBuf> {
        Ok(self
            .output_root
            .join(UNDETERMINED_DIR)
            .join(self.run_id()?)
            .join(self.timestamp()))
    }

    pub fn run_log_path(&self) -> Result<PathBuf> {
        Ok(self.undetermined_dir()?.join(format!("{}.log", self.run_id()?)))
    }

    pub fn lane_log_path(&self, lane: u8) -> Result<PathBuf> {
        Ok(self.undetermined_dir()?.join(format!("lane_{}.log", lane)))
    }

    pub fn metrics_file(&self, lane: u8) -> Result<PathBuf> {
        Ok(self
            .undetermined_dir()?
            .join(format!("{}_{}_barcode_metrics.txt", self.run_id()?, lane)))
    }

    /// `<output_root>/<project>/<run_id>/`
    pub fn project_dir(&self, project: &str) -> Result<PathBuf> {
        Ok(self.output_root.join(project).join(self.run_id()?))
    }

    pub fn project_sample_sheet(&self, project: &str, lane: u8) -> Result<PathBuf> {
        Ok(self.project_dir(project)?.join(format!(
            "{}_{}_{}_samplesheet.txt",
            project,
            self.run_id()?,
            lane
        )))
    }

    /// Associe chaque projet du couloir à son répertoire de sortie et le crée
    pub fn register_lane_projects(&self, lane: &LaneBarcodeSet) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for project in lane.projects() {
            let dir = self.project_dir(&project)?;
            if self.output_dirs.insert(&project, dir.clone()) {
                tracing::debug!("Répertoire projet {}: {}", project, dir.display());
            }
            fs::create_dir_all(&dir)?;
            dirs.push(dir);
        }
        Ok(dirs)
    }

    /// Signale les couloirs dont le FCID diffère de celui du run
    pub fn check_flowcell(&self, lane: &LaneBarcodeSet) {
        let Ok(info) = self.run_info() else { return };
        let (Some(expected), Some(found)) = (
            info.flowcell.as_deref(),
            lane.rows.first().and_then(|row| row.get(&lane.headers, columns::FCID)),
        ) else {
            return;
        };

        if !expected.eq_ignore_ascii_case(found) {
            tracing::warn!(
                "Couloir {}: FCID {} différent du flowcell du run {}",
                lane.lane,
                found,
                expected
            );
        }
    }
}
