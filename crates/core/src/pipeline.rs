//! Pipeline externe par couloir: invocations, tube entre étapes, orchestration

pub mod invocation;
pub mod orchestrator;
pub mod pipe;

pub use invocation::{build_invocations, PipelineSettings, Stage, StageInvocation};
pub use orchestrator::{LaneOrchestrator, LaneState};
pub use pipe::{resolve_lane_result, PipeEvent, StageExit, StagePipe};

use serde::Serialize;
use thiserror::Error;

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Échec limité à un couloir
#[derive(Error, Debug)]
pub enum LaneError {
    #[error("{stage} terminée avec le code {}", describe_code(.code))]
    StageFailed { stage: Stage, code: Option<i32> },

    #[error("Impossible de démarrer {stage}: {source}")]
    Spawn {
        stage: Stage,
        source: std::io::Error,
    },

    #[error("Préparation du couloir impossible: {0}")]
    Setup(#[from] crate::error::DemuxError),

    #[error("Erreur IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Issue d'un couloir
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneStatus {
    Succeeded,
    Failed,
}

/// Résultat d'un couloir, remonté à l'agrégation finale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub lane: u8,
    pub status: LaneStatus,
    /// Résumé en cas de succès, message d'erreur sinon
    pub message: String,
}

impl PipelineOutcome {
    pub fn succeeded(lane: u8, summary: impl Into<String>) -> Self {
        Self {
            lane,
            status: LaneStatus::Succeeded,
            message: summary.into(),
        }
    }

    pub fn failed(lane: u8, error: impl Into<String>) -> Self {
        Self {
            lane,
            status: LaneStatus::Failed,
            message: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LaneStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_message() {
        let err = LaneError::StageFailed {
            stage: Stage::IndexDecoder,
            code: Some(2),
        };
        assert_eq!(err.to_string(), "étape B (index) terminée avec le code 2");

        let err = LaneError::StageFailed {
            stage: Stage::BasecallDecoder,
            code: None,
        };
        assert_eq!(err.to_string(), "étape A (basecall) terminée avec le code signal");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PipelineOutcome::failed(2, "boom");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["lane"], 2);
        assert_eq!(json["status"], "failed");
        assert!(!outcome.is_success());
    }
}
