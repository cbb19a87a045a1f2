//! Orchestration concurrente des couloirs
//!
//! Chaque couloir validé tourne dans sa propre tâche et suit la machine
//! d'états `Pending → Running → Joined → Done`. L'orchestrateur attend toutes
//! les tâches avant d'appeler une seule fois la passe finale.

use super::invocation::{build_invocations, PipelineSettings, Stage};
use super::pipe::{resolve_lane_result, PipeEvent, StageExit, StagePipe};
use super::{describe_code, LaneError, LaneStatus, PipelineOutcome};
use crate::lane_log::{FileLaneLogger, LaneLogger, RunLog};
use crate::run::RunContext;
use crate::sheet::{CompiledSheet, LaneBarcodeSet};
use dmx_utils::{copy_to, CopyOutcome};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;

/// État d'un couloir
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    Pending,
    Running,
    Joined,
    Done(LaneStatus),
}

impl LaneState {
    fn can_advance_to(&self, next: &LaneState) -> bool {
        matches!(
            (self, next),
            (LaneState::Pending, LaneState::Running)
                | (LaneState::Running, LaneState::Joined)
                | (LaneState::Joined, LaneState::Done(_))
        )
    }
}

/// Suivi des transitions d'un couloir
#[derive(Debug)]
pub struct LaneTracker {
    lane: u8,
    state: LaneState,
}

impl LaneTracker {
    pub fn new(lane: u8) -> Self {
        Self {
            lane,
            state: LaneState::Pending,
        }
    }

    pub fn state(&self) -> LaneState {
        self.state
    }

    pub fn advance(&mut self, next: LaneState) {
        if !self.state.can_advance_to(&next) {
            tracing::warn!(
                lane = self.lane,
                "Transition inattendue {:?} -> {:?}",
                self.state,
                next
            );
        }
        tracing::debug!(lane = self.lane, "{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Orchestrateur des pipelines de couloir
#[derive(Clone)]
pub struct LaneOrchestrator {
    ctx: Arc<RunContext>,
    settings: Arc<PipelineSettings>,
    run_log: Arc<RunLog>,
}

impl LaneOrchestrator {
    pub fn new(ctx: Arc<RunContext>, settings: PipelineSettings, run_log: Arc<RunLog>) -> Self {
        Self {
            ctx,
            settings: Arc::new(settings),
            run_log,
        }
    }

    /// Lance tous les couloirs en parallèle, attend leur fin, puis appelle
    /// `on_all_done` une seule fois avec les résultats triés par couloir
    pub async fn run_all<F, T>(&self, lanes: Vec<LaneBarcodeSet>, on_all_done: F) -> (Vec<PipelineOutcome>, T)
    where
        F: FnOnce(&[PipelineOutcome]) -> T,
    {
        let handles: Vec<_> = lanes
            .into_iter()
            .map(|lane| {
                let number = lane.lane;
                let orchestrator = self.clone();
                let span = tracing::info_span!("lane", lane = number);
                let handle = tokio::spawn(async move { orchestrator.run_lane(lane).await }.instrument(span));
                (number, handle)
            })
            .collect();

        self.run_log
            .record(tracing::Level::INFO, &format!("{} couloir(s) démarré(s)", handles.len()));

        let mut outcomes = Vec::with_capacity(handles.len());
        for (lane, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => PipelineOutcome::failed(lane, format!("Tâche du couloir interrompue: {}", e)),
            };
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|outcome| outcome.lane);

        let finished = on_all_done(&outcomes);
        (outcomes, finished)
    }

    /// Exécute le pipeline complet d'un couloir
    pub async fn run_lane(&self, lane: LaneBarcodeSet) -> PipelineOutcome {
        let number = lane.lane;
        let mut tracker = LaneTracker::new(number);

        let logger: Arc<dyn LaneLogger> = match self
            .ctx
            .lane_log_path(number)
            .map_err(LaneError::from)
            .and_then(|path| Ok(FileLaneLogger::open(number, path, self.run_log.clone())?))
        {
            Ok(logger) => Arc::new(logger),
            Err(e) => {
                tracing::error!(lane = number, "Journal du couloir indisponible: {}", e);
                return PipelineOutcome::failed(number, e.to_string());
            }
        };

        tracker.advance(LaneState::Running);
        logger.info(&format!("Couloir {}: {} échantillon(s)", number, lane.rows.len()));
        let result = self.run_stages(&lane, logger.clone()).await;

        self.copy_lane_artifacts(&lane, logger.as_ref());
        tracker.advance(LaneState::Joined);

        let outcome = match result {
            Ok(summary) => {
                logger.info(&summary);
                PipelineOutcome::succeeded(number, summary)
            }
            Err(e) => {
                logger.error(&format!("Couloir {} en échec: {}", number, e));
                PipelineOutcome::failed(number, e.to_string())
            }
        };
        tracker.advance(LaneState::Done(outcome.status));
        outcome
    }

    async fn run_stages(&self, lane: &LaneBarcodeSet, logger: Arc<dyn LaneLogger>) -> Result<String, LaneError> {
        let number = lane.lane;

        for dir in self.ctx.register_lane_projects(lane)? {
            logger.info(&format!("Répertoire projet: {}", dir.display()));
        }
        self.ctx.check_flowcell(lane);

        let barcode_file = self.ctx.barcode_file(number)?;
        CompiledSheet::write_barcode_file(&lane.headers, &lane.rows, &barcode_file)?;
        fs::create_dir_all(self.ctx.lane_temp_dir(number)?)?;
        fs::create_dir_all(self.ctx.undetermined_dir()?)?;

        let (stage_a, stage_b) = build_invocations(&self.ctx, &self.settings, number)?;
        logger.info(&format!("{}: {}", stage_a.stage, stage_a.display()));
        logger.info(&format!("{}: {}", stage_b.stage, stage_b.display()));

        let mut pipe = StagePipe::spawn(&stage_a, &stage_b, logger.clone())?;
        let mut exit_a = None;
        let mut exit_b = None;

        while let Some(event) = pipe.next_event().await {
            match event {
                PipeEvent::StageAExited(exit) => {
                    exit_a = Some(exit);
                    if exit.is_success() {
                        logger.info(&format!("{} terminée", Stage::BasecallDecoder));
                    } else {
                        logger.error(&format!("{} en échec (code {})", Stage::BasecallDecoder, describe_code(&exit.code)));
                    }
                }
                PipeEvent::StageBExited(exit) => {
                    exit_b = Some(exit);
                    if exit.is_success() {
                        logger.info(&format!("{} terminée", Stage::IndexDecoder));
                    } else {
                        logger.error(&format!("{} en échec (code {})", Stage::IndexDecoder, describe_code(&exit.code)));
                        if pipe.stage_a_running() {
                            logger.warn(&format!("Arrêt forcé de {}", Stage::BasecallDecoder));
                            pipe.terminate_stage_a();
                        }
                    }
                }
            }
        }
        pipe.finish().await;

        resolve_lane_result(
            exit_a.unwrap_or_else(StageExit::killed),
            exit_b.unwrap_or_else(StageExit::killed),
        )?;

        Ok(format!(
            "Couloir {} démultiplexé ({} échantillon(s))",
            number,
            lane.rows.len()
        ))
    }

    /// Copies propres au couloir, une fois l'étape B terminée
    fn copy_lane_artifacts(&self, lane: &LaneBarcodeSet, logger: &dyn LaneLogger) {
        let number = lane.lane;
        let undetermined = match self.ctx.undetermined_dir() {
            Ok(dir) => dir,
            Err(e) => {
                logger.warn(&format!("Copies du couloir ignorées: {}", e));
                return;
            }
        };

        // Cibles qualifiées par couloir: les couloirs partagent `undetermined`
        let mut scheduled = Vec::new();
        if let Ok(barcode_file) = self.ctx.barcode_file(number) {
            if let Some(name) = barcode_file.file_name() {
                let target = undetermined.join(name);
                scheduled.push((barcode_file, target));
            }
        }
        if let Ok(lane_temp) = self.ctx.lane_temp_dir(number) {
            let target = undetermined.join(format!("lane{}", number)).join("config");
            scheduled.push((lane_temp.join("config"), target));
        }
        if let Ok(metrics) = self.ctx.metrics_file(number) {
            for project in lane.projects() {
                let dir = match self.ctx.output_dirs().get(&project) {
                    Some(dir) => dir,
                    None => match self.ctx.project_dir(&project) {
                        Ok(dir) => dir,
                        Err(_) => continue,
                    },
                };
                if let Some(name) = metrics.file_name() {
                    scheduled.push((metrics.clone(), dir.join(name)));
                }
            }
        }

        for (source, target) in scheduled {
            copy_logged(&source, &target, logger);
        }
    }
}

fn copy_logged(source: &Path, target: &Path, logger: &dyn LaneLogger) {
    match copy_to(source, target) {
        Ok(CopyOutcome::Copied(target)) => {
            tracing::debug!("Copié {} -> {}", source.display(), target.display())
        }
        Ok(CopyOutcome::Missing(path)) => {
            logger.warn(&format!("Source absente, copie ignorée: {}", path.display()))
        }
        Err(e) => logger.warn(&format!(
            "Copie de {} vers {} impossible: {}",
            source.display(),
            target.display(),
            e
        )),
    }
}
