//! DMX Core Library
//!
//! Préparation et orchestration du démultiplexage par couloir: normalisation
//! de la feuille d'échantillons, compilation des barcodes, validation, puis
//! pipeline externe à deux étapes lancé en parallèle sur chaque couloir.

pub mod collector;
pub mod config;
pub mod error;
pub mod lane_log;
pub mod logging;
pub mod pipeline;
pub mod run;
pub mod runner;
pub mod sheet;
pub mod validation;

// Réexportations principales
pub use collector::{ArtifactCollector, CollectionReport};
pub use config::{OutputFormat, PipelineConfig, RunOptions, ToolCommand};
pub use error::{DemuxError, Result};
pub use lane_log::{FileLaneLogger, LaneLogger, RunLog};
pub use logging::init_logging;
// Les macros log_operation et log_error sont automatiquement exportées à la racine du crate
pub use pipeline::{LaneError, LaneOrchestrator, LaneStatus, PipelineOutcome, PipelineSettings};
pub use run::{RunContext, RunInfo};
pub use runner::{context_for, execute, prepare, LaneValidation, PreparedRun, RunReport};
pub use sheet::{BarcodeCompiler, CompiledSheet, LaneBarcodeSet, SampleSheet};
pub use validation::{ValidationEngine, ValidationResult};
