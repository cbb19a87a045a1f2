//! Journaux de run et de couloir
//!
//! Chaque couloir écrit dans son propre fichier et recopie chaque ligne dans
//! le journal agrégé du run. Le journal agrégé est partagé entre les tâches de
//! couloir: chaque ligne est écrite entière sous verrou.

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn format_line(scope: &str, level: Level, message: &str) -> String {
    format!(
        "[{}] [{}] {:<5} {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        scope,
        level.as_str(),
        message
    )
}

/// Journal agrégé du run
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Ouvre (ou crée) le journal en mode ajout
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ajoute une ligne complète
    pub fn append_line(&self, line: &str) {
        let mut file = self.file.lock();
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            tracing::warn!("Écriture impossible dans {}: {}", self.path.display(), e);
        }
    }

    /// Écrit un message hors couloir
    pub fn record(&self, level: Level, message: &str) {
        self.append_line(&format_line("run", level, message));
    }
}

/// Journal lié à un couloir
pub trait LaneLogger: Send + Sync {
    fn lane(&self) -> u8;

    fn record(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.record(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.record(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.record(Level::ERROR, message);
    }
}

/// Journal de couloir écrit dans `lane_<N>.log` et recopié dans le journal du run
pub struct FileLaneLogger {
    lane: u8,
    path: PathBuf,
    file: Mutex<File>,
    run_log: Arc<RunLog>,
}

impl FileLaneLogger {
    pub fn open(lane: u8, path: impl Into<PathBuf>, run_log: Arc<RunLog>) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            lane,
            path,
            file: Mutex::new(file),
            run_log,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LaneLogger for FileLaneLogger {
    fn lane(&self) -> u8 {
        self.lane
    }

    fn record(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(lane = self.lane, "{}", message),
            Level::WARN => tracing::warn!(lane = self.lane, "{}", message),
            Level::INFO => tracing::info!(lane = self.lane, "{}", message),
            _ => tracing::debug!(lane = self.lane, "{}", message),
        }

        let line = format_line(&format!("lane {}", self.lane), level, message);
        {
            let mut file = self.file.lock();
            if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                tracing::warn!("Écriture impossible dans {}: {}", self.path.display(), e);
            }
        }
        self.run_log.append_line(&line);
    }
}
