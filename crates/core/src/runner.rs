//! Conduite d'un run complet
//!
//! `prepare` fait tout le travail synchrone (lecture, compilation,
//! répartition, validation) avant qu'aucun couloir ne démarre. `execute`
//! lance les couloirs validés, attend la barrière de fin puis agrège.

use crate::collector::{ArtifactCollector, CollectionReport};
use crate::config::{PipelineConfig, RunOptions};
use crate::error::Result;
use crate::lane_log::RunLog;
use crate::pipeline::{LaneOrchestrator, PipelineOutcome, PipelineSettings};
use crate::run::RunContext;
use crate::sheet::{partition, BarcodeCompiler, CompiledSheet, LaneBarcodeSet, LanePartition, SampleSheet};
use crate::validation::{ValidationEngine, ValidationEnv, ValidationResult};
use crate::{log_error, log_operation};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

/// Nom du bilan JSON écrit dans la zone Undetermined
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Verdict de validation d'un couloir
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneValidation {
    pub lane: u8,
    pub result: ValidationResult,
}

/// Run prêt à être lancé
#[derive(Debug)]
pub struct PreparedRun {
    pub options: RunOptions,
    pub settings: PipelineSettings,
    pub sheet: CompiledSheet,
    pub partition: LanePartition,
    pub validations: Vec<LaneValidation>,
}

impl PreparedRun {
    /// Couloirs ayant passé la validation, par numéro croissant
    pub fn runnable_lanes(&self) -> Vec<LaneBarcodeSet> {
        self.validations
            .iter()
            .filter(|v| v.result.passed)
            .filter_map(|v| self.partition.lanes.get(&v.lane).cloned())
            .collect()
    }

    /// Couloirs refusés par la validation
    pub fn rejected(&self) -> impl Iterator<Item = &LaneValidation> {
        self.validations.iter().filter(|v| !v.result.passed)
    }
}

/// Contexte d'un run à partir des options et de la configuration
pub fn context_for(options: &RunOptions, config: &PipelineConfig) -> RunContext {
    RunContext::new(&options.run_dir, &config.output_root, &config.temp_root)
}

/// Lit, compile, répartit et valide la feuille d'échantillons
pub fn prepare(options: RunOptions, config: &PipelineConfig) -> Result<PreparedRun> {
    log_operation!("prepare", {
        let sheet_path = options.sample_sheet_path();
        let sheet = SampleSheet::read(&sheet_path).map_err(|e| log_error!(e))?;
        tracing::info!("{} ligne(s) lue(s) dans {}", sheet.len(), sheet_path.display());

        let compiled = BarcodeCompiler::compile(&sheet);
        let partition = partition(&compiled, &options.omit_lanes).map_err(|e| log_error!(e))?;

        let engine = ValidationEngine::standard(
            ValidationEnv {
                output_root: config.output_root.clone(),
                tools: config.tools.clone(),
            },
            options.skip_library_check,
        );
        let validations = partition
            .lanes
            .values()
            .map(|lane| LaneValidation {
                lane: lane.lane,
                result: engine.validate(lane),
            })
            .collect();

        Ok(PreparedRun {
            settings: PipelineSettings::new(config, &options),
            options,
            sheet: compiled,
            partition,
            validations,
        })
    })
}

/// Bilan final d'un run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: String,
    /// Un résultat par couloir non omis, trié par couloir
    pub outcomes: Vec<PipelineOutcome>,
    pub omitted: Vec<u8>,
    pub collection: CollectionReport,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Écrit le bilan JSON et retourne son chemin
    pub fn write_summary(&self, ctx: &RunContext) -> Result<PathBuf> {
        let path = ctx.undetermined_dir()?.join(RUN_SUMMARY_FILE);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(path)
    }
}

/// Lance les couloirs validés puis la collecte finale
pub async fn execute(prepared: PreparedRun, ctx: Arc<RunContext>) -> Result<RunReport> {
    prepared.settings.tools.require().map_err(|e| log_error!(e))?;
    let run_id = ctx.run_id().map_err(|e| log_error!(e))?.to_string();

    let run_log = Arc::new(RunLog::open(ctx.run_log_path()?)?);
    run_log.record(Level::INFO, &format!("Run {} ({})", run_id, ctx.timestamp()));
    if !prepared.partition.omitted.is_empty() {
        run_log.record(
            Level::INFO,
            &format!(
                "Couloir(s) omis: {}",
                dmx_utils::format_lane_list(&prepared.partition.omitted)
            ),
        );
    }

    let mut outcomes: Vec<PipelineOutcome> = prepared
        .rejected()
        .map(|v| {
            let message = v.result.message.clone().unwrap_or_default();
            run_log.record(
                Level::ERROR,
                &format!("Couloir {} refusé par la validation: {}", v.lane, message),
            );
            PipelineOutcome::failed(v.lane, message)
        })
        .collect();

    let lanes = prepared.runnable_lanes();
    let orchestrator = LaneOrchestrator::new(ctx.clone(), prepared.settings.clone(), run_log.clone());
    let (lane_outcomes, collection) = orchestrator
        .run_all(lanes.clone(), |_| {
            ArtifactCollector::new(&ctx, &run_log).collect(&prepared.sheet.raw_header, &lanes)
        })
        .await;

    outcomes.extend(lane_outcomes);
    outcomes.sort_by_key(|outcome| outcome.lane);

    let report = RunReport {
        run_id,
        timestamp: ctx.timestamp().to_string(),
        outcomes,
        omitted: prepared.partition.omitted.iter().copied().collect(),
        collection,
    };

    match report.write_summary(&ctx) {
        Ok(path) => tracing::info!("Bilan écrit: {}", path.display()),
        Err(e) => {
            tracing::warn!("Bilan non écrit: {}", e);
            run_log.record(Level::WARN, &format!("Bilan non écrit: {}", e));
        }
    }
    run_log.record(
        Level::INFO,
        &format!(
            "Run terminé: {} couloir(s) réussi(s), {} en échec",
            report.succeeded(),
            report.failed()
        ),
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCommand;
    use crate::error::DemuxError;
    use std::fs;

    const HEADER: &str = "FCID\tLane\tSample Name\tLibrary Name\tIndex\tProject\tRead Structure";

    fn sheet(lanes: &[u8]) -> String {
        let mut text = format!("{}\n", HEADER);
        for lane in lanes {
            text.push_str(&format!("FC1\t{lane}\tS{lane}\tL{lane}\tACGT\tP1\t4I\n"));
        }
        text
    }

    fn config_with_tools(output_root: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.output_root = output_root.to_path_buf();
        config.tools.basecall_decoder = Some(ToolCommand::new("true"));
        config.tools.index_decoder = Some(ToolCommand::new("true"));
        config
    }

    #[test]
    fn test_prepare_missing_lanes_is_fatal() {
        let run = tempfile::tempdir().unwrap();
        fs::write(run.path().join("SampleSheet.txt"), sheet(&[1, 2])).unwrap();

        let err = prepare(RunOptions::new(run.path()), &PipelineConfig::default()).unwrap_err();
        match err {
            DemuxError::MissingLanes { missing, suggestion } => {
                assert_eq!(missing, "3,4,5,6,7,8");
                assert_eq!(suggestion, "3,4,5,6,7,8");
            }
            other => panic!("erreur inattendue: {}", other),
        }
    }

    #[test]
    fn test_prepare_validates_each_lane() {
        let run = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut text = sheet(&[1, 2, 3, 4, 5, 6, 7, 8]);
        // Barcode dupliqué sur le couloir 3
        text.push_str("FC1\t3\tS9\tL9\tACGT\tP1\t4I\n");
        fs::write(run.path().join("SampleSheet.txt"), text).unwrap();

        let prepared = prepare(RunOptions::new(run.path()), &config_with_tools(out.path())).unwrap();

        assert_eq!(prepared.validations.len(), 8);
        let rejected: Vec<u8> = prepared.rejected().map(|v| v.lane).collect();
        assert_eq!(rejected, vec![3]);
        assert_eq!(prepared.runnable_lanes().len(), 7);
    }

    #[test]
    fn test_prepare_with_omitted_lanes() {
        let run = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(run.path().join("SampleSheet.txt"), sheet(&[1, 2])).unwrap();

        let mut options = RunOptions::new(run.path());
        options.omit_lanes = (3..=8).collect();
        let prepared = prepare(options, &config_with_tools(out.path())).unwrap();

        assert_eq!(prepared.partition.lanes.len(), 2);
        assert!(prepared.rejected().next().is_none());
    }

    #[test]
    fn test_report_counts() {
        let report = RunReport {
            run_id: "R1".to_string(),
            timestamp: "20240131_142501".to_string(),
            outcomes: vec![
                PipelineOutcome::succeeded(1, "ok"),
                PipelineOutcome::failed(2, "étape B (index) terminée avec le code 2"),
            ],
            omitted: vec![],
            collection: CollectionReport::default(),
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
    }
}
