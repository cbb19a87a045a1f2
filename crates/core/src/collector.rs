//! Collecte des artefacts du run, une seule fois après tous les couloirs

use crate::error::Result;
use crate::lane_log::RunLog;
use crate::run::RunContext;
use crate::sheet::LaneBarcodeSet;
use dmx_utils::{copy_to, CopyOutcome};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Métadonnées du run recopiées dans la zone Undetermined
pub const UNDETERMINED_ARTIFACTS: &[&str] = &[
    "RunInfo.xml",
    "runParameters.xml",
    "RunParameters.xml",
    "InterOp",
    "RTAComplete.txt",
    "Data/reports",
    "Data/Intensities/config.xml",
    "Data/Intensities/BaseCalls/config.xml",
];

/// Métadonnées recopiées dans chaque répertoire projet
pub const PROJECT_ARTIFACTS: &[&str] = &["RunInfo.xml", "runParameters.xml", "RunParameters.xml", "InterOp"];

/// Bilan de la collecte
#[derive(Debug, Default, Clone, Serialize)]
pub struct CollectionReport {
    pub copied: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub sample_sheets: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl CollectionReport {
    fn record(&mut self, outcome: std::io::Result<CopyOutcome>, source: &Path, target: &Path) {
        match outcome {
            Ok(CopyOutcome::Copied(target)) => self.copied.push(target),
            Ok(CopyOutcome::Missing(path)) => self.missing.push(path),
            Err(e) => self.warnings.push(format!(
                "Copie de {} vers {} impossible: {}",
                source.display(),
                target.display(),
                e
            )),
        }
    }
}

/// Copie des métadonnées et écriture des feuilles par projet
pub struct ArtifactCollector<'a> {
    ctx: &'a RunContext,
    run_log: &'a RunLog,
}

impl<'a> ArtifactCollector<'a> {
    pub fn new(ctx: &'a RunContext, run_log: &'a RunLog) -> Self {
        Self { ctx, run_log }
    }

    /// Passe finale: `raw_header` est la ligne d'en-tête d'origine,
    /// `lanes` les couloirs effectivement lancés
    pub fn collect(&self, raw_header: &str, lanes: &[LaneBarcodeSet]) -> CollectionReport {
        let mut report = CollectionReport::default();

        match self.ctx.undetermined_dir() {
            Ok(undetermined) => self.copy_artifacts(UNDETERMINED_ARTIFACTS, &undetermined, &mut report),
            Err(e) => report.warnings.push(format!("Zone Undetermined indisponible: {}", e)),
        }

        for (project, dir) in self.ctx.output_dirs().snapshot() {
            self.copy_artifacts(PROJECT_ARTIFACTS, &dir, &mut report);

            for lane in lanes {
                if lane.rows_for_project(&project).next().is_none() {
                    continue;
                }
                match self.write_project_sheet(&project, raw_header, lane) {
                    Ok(path) => report.sample_sheets.push(path),
                    Err(e) => report.warnings.push(format!(
                        "Feuille du projet {} (couloir {}) non écrite: {}",
                        project, lane.lane, e
                    )),
                }
            }
        }

        for path in &report.missing {
            self.warn(&format!("Source absente, copie ignorée: {}", path.display()));
        }
        for warning in &report.warnings {
            self.warn(warning);
        }
        self.run_log.record(
            Level::INFO,
            &format!(
                "Collecte terminée: {} copie(s), {} feuille(s) projet",
                report.copied.len(),
                report.sample_sheets.len()
            ),
        );

        report
    }

    /// Le chemin relatif au run est conservé sous `dest`
    fn copy_artifacts(&self, names: &[&str], dest: &Path, report: &mut CollectionReport) {
        for name in names {
            let source = self.ctx.run_dir().join(name);
            let target = dest.join(name);
            report.record(copy_to(&source, &target), &source, &target);
        }
    }

    /// `<project>_<runId>_<lane>_samplesheet.txt`: en-tête puis lignes d'origine
    fn write_project_sheet(&self, project: &str, raw_header: &str, lane: &LaneBarcodeSet) -> Result<PathBuf> {
        let path = self.ctx.project_sample_sheet(project, lane.lane)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", raw_header)?;
        for row in lane.rows_for_project(project) {
            writeln!(writer, "{}", row.raw)?;
        }
        writer.flush()?;

        tracing::debug!("Feuille projet écrite: {}", path.display());
        Ok(path)
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        self.run_log.record(Level::WARN, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunInfo;
    use crate::sheet::{partition, BarcodeCompiler, SampleSheet};
    use std::collections::BTreeSet;
    use std::fs;

    const SHEET: &str = "FCID\tLane\tSample Name\tIndex\tProject\tRead Structure\n\
        FC1\t1\tS1\tACGT\tP1\t4I\n\
        FC1\t1\tS2\tTTGG\tP2\t4I\n\
        FC1\t2\tS3\tGGCC\tP1\t4I\n";

    #[test]
    fn test_collect_copies_and_writes_project_sheets() {
        let run = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(run.path().join("RunInfo.xml"), "<RunInfo/>").unwrap();
        fs::create_dir_all(run.path().join("InterOp")).unwrap();
        fs::write(run.path().join("InterOp").join("QMetricsOut.bin"), b"qm").unwrap();

        let ctx = RunContext::new(run.path(), out.path(), out.path().join("tmp"))
            .with_run_info(RunInfo {
                run_id: "R1".to_string(),
                run_number: None,
                flowcell: None,
                instrument: None,
            })
            .with_timestamp("20240131_142501");
        let run_log = RunLog::open(ctx.run_log_path().unwrap()).unwrap();

        let compiled = BarcodeCompiler::compile(&SampleSheet::parse(SHEET).unwrap());
        let omitted: BTreeSet<u8> = (3..=8).collect();
        let lanes: Vec<_> = partition(&compiled, &omitted).unwrap().lanes.into_values().collect();
        for lane in &lanes {
            ctx.register_lane_projects(lane).unwrap();
        }

        let report = ArtifactCollector::new(&ctx, &run_log).collect(&compiled.raw_header, &lanes);

        let undetermined = ctx.undetermined_dir().unwrap();
        assert!(undetermined.join("RunInfo.xml").exists());
        assert!(undetermined.join("InterOp").join("QMetricsOut.bin").exists());
        assert!(out.path().join("P2").join("R1").join("InterOp").exists());
        assert!(report.missing.iter().any(|p| p.ends_with("RTAComplete.txt")));

        // P1 a des lignes sur les couloirs 1 et 2, P2 seulement sur le 1
        assert_eq!(report.sample_sheets.len(), 3);
        let p1_lane2 = fs::read_to_string(ctx.project_sample_sheet("P1", 2).unwrap()).unwrap();
        assert_eq!(
            p1_lane2,
            "FCID\tLane\tSample Name\tIndex\tProject\tRead Structure\nFC1\t2\tS3\tGGCC\tP1\t4I\n"
        );
        assert!(!ctx.project_sample_sheet("P2", 2).unwrap().exists());

        let log = fs::read_to_string(run_log.path()).unwrap();
        assert!(log.contains("RTAComplete.txt"));
    }

    #[test]
    fn test_nested_config_files_do_not_collide() {
        let run = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let intensities = run.path().join("Data").join("Intensities");
        fs::create_dir_all(intensities.join("BaseCalls")).unwrap();
        fs::write(intensities.join("config.xml"), "<Intensities/>").unwrap();
        fs::write(intensities.join("BaseCalls").join("config.xml"), "<BaseCalls/>").unwrap();

        let ctx = RunContext::new(run.path(), out.path(), out.path().join("tmp"))
            .with_run_info(RunInfo {
                run_id: "R1".to_string(),
                run_number: None,
                flowcell: None,
                instrument: None,
            })
            .with_timestamp("20240131_142501");
        let run_log = RunLog::open(ctx.run_log_path().unwrap()).unwrap();

        let report = ArtifactCollector::new(&ctx, &run_log).collect("FCID\tLane", &[]);

        let copied = ctx.undetermined_dir().unwrap().join("Data").join("Intensities");
        assert_eq!(fs::read_to_string(copied.join("config.xml")).unwrap(), "<Intensities/>");
        assert_eq!(
            fs::read_to_string(copied.join("BaseCalls").join("config.xml")).unwrap(),
            "<BaseCalls/>"
        );
        assert!(report.copied.iter().any(|p| p.ends_with("BaseCalls/config.xml")));
        assert!(report.warnings.is_empty());
    }
}
