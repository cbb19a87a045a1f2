//! Construction des commandes des deux étapes externes

use crate::config::{MemoryConfig, OutputFormat, PipelineConfig, RunOptions, ToolCommand, ToolsConfig};
use crate::error::Result;
use crate::run::RunContext;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Étape du pipeline d'un couloir
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Étape A: décodage des intensités / basecalls
    BasecallDecoder,
    /// Étape B: décodage des index
    IndexDecoder,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::BasecallDecoder => write!(f, "étape A (basecall)"),
            Stage::IndexDecoder => write!(f, "étape B (index)"),
        }
    }
}

/// Réglages communs aux couloirs d'un run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tools: ToolsConfig,
    pub memory: MemoryConfig,
    pub max_mismatches: u32,
    pub min_mismatch_delta: u32,
    pub output_format: OutputFormat,
}

impl PipelineSettings {
    /// Combine la configuration statique et les options de l'utilisateur
    pub fn new(config: &PipelineConfig, options: &RunOptions) -> Self {
        let memory = match &options.memory {
            Some(memory) => MemoryConfig {
                basecall_decoder: memory.clone(),
                index_decoder: memory.clone(),
            },
            None => config.memory.clone(),
        };

        Self {
            tools: config.tools.clone(),
            memory,
            max_mismatches: options.max_mismatches,
            min_mismatch_delta: options.min_mismatch_delta,
            output_format: options.output_format,
        }
    }
}

/// Invocation complète d'une étape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl StageInvocation {
    fn from_tool(stage: Stage, tool: &ToolCommand) -> Self {
        Self {
            stage,
            program: tool.program.clone(),
            args: tool.args.clone(),
        }
    }

    fn arg(mut self, name: &str, value: impl ToString) -> Self {
        self.args.push(name.to_string());
        self.args.push(value.to_string());
        self
    }

    /// Commande tokio, flux standard non redirigés
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    /// Ligne de commande lisible pour les journaux
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Construit les invocations des étapes A et B d'un couloir
pub fn build_invocations(
    ctx: &RunContext,
    settings: &PipelineSettings,
    lane: u8,
) -> Result<(StageInvocation, StageInvocation)> {
    let (basecall, index) = settings.tools.require()?;
    let run_id = ctx.run_id()?;
    let tmp_dir = ctx.lane_temp_dir(lane)?;

    let stage_a = StageInvocation::from_tool(Stage::BasecallDecoder, basecall)
        .arg("--basecalls-dir", ctx.basecalls_dir().display())
        .arg("--lane", lane)
        .arg("--run-id", run_id)
        .arg("--tmp-dir", tmp_dir.display())
        .arg("--max-memory", &settings.memory.basecall_decoder)
        .arg("--max-mismatches", settings.max_mismatches)
        .arg("--min-mismatch-delta", settings.min_mismatch_delta);

    let stage_b = StageInvocation::from_tool(Stage::IndexDecoder, index)
        .arg("--input", "-")
        .arg("--barcode-file", ctx.barcode_file(lane)?.display())
        .arg("--lane", lane)
        .arg("--run-id", run_id)
        .arg("--output-dir", ctx.output_root().display())
        .arg("--metrics-file", ctx.metrics_file(lane)?.display())
        .arg("--tmp-dir", tmp_dir.display())
        .arg("--max-memory", &settings.memory.index_decoder)
        .arg("--max-mismatches", settings.max_mismatches)
        .arg("--min-mismatch-delta", settings.min_mismatch_delta)
        .arg("--output-format", settings.output_format.as_str());

    Ok((stage_a, stage_b))
}
