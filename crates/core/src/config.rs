//! Configuration statique du pipeline et options d'exécution

use crate::error::{DemuxError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Préfixe des variables d'environnement (`DMX__TOOLS__INDEX_DECODER__PROGRAM`)
pub const ENV_PREFIX: &str = "DMX";

/// Commande d'un outil externe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Programme à exécuter
    pub program: PathBuf,
    /// Arguments placés avant ceux du pipeline (ex: `-jar decoder.jar`)
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Emplacement des deux outils externes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Étape A: décodage des intensités / basecalls
    pub basecall_decoder: Option<ToolCommand>,
    /// Étape B: décodage des index
    pub index_decoder: Option<ToolCommand>,
}

impl ToolsConfig {
    /// Retourne les deux commandes, ou l'outil manquant
    pub fn require(&self) -> Result<(&ToolCommand, &ToolCommand)> {
        let basecall = self
            .basecall_decoder
            .as_ref()
            .ok_or(DemuxError::ToolNotConfigured("tools.basecall_decoder"))?;
        let index = self
            .index_decoder
            .as_ref()
            .ok_or(DemuxError::ToolNotConfigured("tools.index_decoder"))?;
        Ok((basecall, index))
    }
}

/// Mémoire allouée aux outils (format libre, ex: `8g`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub basecall_decoder: String,
    pub index_decoder: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            basecall_decoder: "4g".to_string(),
            index_decoder: "4g".to_string(),
        }
    }
}

/// Configuration du logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Configuration complète du pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Racine des répertoires projet (`<output_root>/<project>/<run_id>/`)
    pub output_root: PathBuf,
    /// Racine des fichiers temporaires
    pub temp_root: PathBuf,
    pub tools: ToolsConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./output"),
            temp_root: std::env::temp_dir().join("dmx"),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Charge la configuration: valeurs par défaut, fichier optionnel, puis
    /// variables d'environnement `DMX__*`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&PipelineConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize::<PipelineConfig>()?)
    }
}

/// Format de sortie de l'étape B
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Fastq,
    Bam,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Fastq => "fastq",
            OutputFormat::Bam => "bam",
        }
    }
}

/// Options fournies par l'utilisateur pour un run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Répertoire du run (contient `RunInfo.xml` et `Data/`)
    pub run_dir: PathBuf,
    /// Feuille d'échantillons, `<run_dir>/SampleSheet.txt` par défaut
    pub sample_sheet: Option<PathBuf>,
    /// Couloirs volontairement absents
    pub omit_lanes: BTreeSet<u8>,
    pub max_mismatches: u32,
    pub min_mismatch_delta: u32,
    /// Remplace la mémoire configurée pour les deux outils
    pub memory: Option<String>,
    pub output_format: OutputFormat,
    /// Désactive la vérification des librairies déjà présentes
    pub skip_library_check: bool,
}

impl RunOptions {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            sample_sheet: None,
            omit_lanes: BTreeSet::new(),
            max_mismatches: 1,
            min_mismatch_delta: 1,
            memory: None,
            output_format: OutputFormat::default(),
            skip_library_check: false,
        }
    }

    /// Chemin effectif de la feuille d'échantillons
    pub fn sample_sheet_path(&self) -> PathBuf {
        self.sample_sheet
            .clone()
            .unwrap_or_else(|| self.run_dir.join("SampleSheet.txt"))
    }
}
