//! CLI pour le démultiplexage par couloir

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dmx_core::{init_logging, OutputFormat, PipelineConfig, RunOptions};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

mod commands;
mod display;

use commands::{check, run};

#[derive(Parser)]
#[command(name = "dmx")]
#[command(about = "Préparation et lancement du démultiplexage par couloir", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Fichier de configuration (TOML ou YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Niveau de verbosité
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, valide et démultiplexe tous les couloirs du run
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Affiche le bilan en JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile et valide la feuille d'échantillons sans rien lancer
    Check {
        #[command(flatten)]
        args: RunArgs,
    },
}

/// Options communes à `run` et `check`
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Répertoire du run
    pub run_dir: PathBuf,

    /// Feuille d'échantillons (par défaut <run_dir>/SampleSheet.txt)
    #[arg(short, long)]
    pub sample_sheet: Option<PathBuf>,

    /// Couloirs absents volontairement, ex: 3,5,6
    #[arg(long, value_name = "LANES")]
    pub omit_lanes: Option<String>,

    /// Nombre maximal de mésappariements par barcode
    #[arg(long, default_value = "1")]
    pub max_mismatches: u32,

    /// Écart minimal de mésappariements entre les deux meilleurs barcodes
    #[arg(long, default_value = "1")]
    pub min_mismatch_delta: u32,

    /// Mémoire allouée aux deux outils, ex: 8g
    #[arg(short, long)]
    pub memory: Option<String>,

    /// Format de sortie de l'étape B
    #[arg(long, value_enum, default_value = "fastq")]
    pub output_format: FormatArg,

    /// Ne pas vérifier les librairies déjà présentes
    #[arg(long)]
    pub skip_library_check: bool,

    /// Racine des répertoires projet (remplace la configuration)
    #[arg(short, long)]
    pub output_root: Option<PathBuf>,
}

impl RunArgs {
    pub fn to_options(&self) -> anyhow::Result<RunOptions> {
        let mut options = RunOptions::new(&self.run_dir);
        options.sample_sheet = self.sample_sheet.clone();
        if let Some(lanes) = &self.omit_lanes {
            options.omit_lanes = dmx_utils::parse_lane_list(lanes)
                .with_context(|| format!("--omit-lanes {}", lanes))?;
        }
        options.max_mismatches = self.max_mismatches;
        options.min_mismatch_delta = self.min_mismatch_delta;
        options.memory = self.memory.clone();
        options.output_format = self.output_format.into();
        options.skip_library_check = self.skip_library_check;
        Ok(options)
    }

    /// Applique les options qui remplacent la configuration chargée
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(root) = &self.output_root {
            config.output_root = root.clone();
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy)]
pub enum FormatArg {
    Fastq,
    Bam,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Fastq => OutputFormat::Fastq,
            FormatArg::Bam => OutputFormat::Bam,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    init_logging(&config.logging);

    match cli.command {
        Commands::Run { args, json } => {
            args.apply_to(&mut config);
            run::run(args.to_options()?, config, json).await?;
        }
        Commands::Check { args } => {
            args.apply_to(&mut config);
            check::run(args.to_options()?, config)?;
        }
    }

    Ok(())
}

/// Crée une barre de progression spinner
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
