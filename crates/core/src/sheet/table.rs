//! Lecture de la feuille d'échantillons tabulée

use super::header::HeaderIndex;
use crate::error::{DemuxError, Result};
use std::fs;
use std::path::Path;

/// Valeur substituée aux cellules vides après compilation
pub const EMPTY_VALUE: &str = "N/A";

/// Une ligne de la feuille
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// Ligne d'origine, sans fin de ligne
    pub raw: String,
    /// Cellules alignées sur les en-têtes
    pub values: Vec<String>,
}

impl SheetRow {
    /// Découpe une ligne tabulée et l'aligne sur `width` cellules
    ///
    /// Les lignes courtes sont complétées; les cellules au-delà de l'en-tête
    /// (tabulation finale d'un export tableur) sont retirées.
    pub fn parse(line: &str, width: usize) -> Self {
        let mut values: Vec<String> = line.split('\t').map(str::to_string).collect();
        if values.len() > width && values[width..].iter().any(|v| !v.trim().is_empty()) {
            tracing::debug!("Cellules hors en-tête ignorées: {:?}", &values[width..]);
        }
        values.resize(width, String::new());
        Self {
            raw: line.to_string(),
            values,
        }
    }

    /// Valeur d'une colonne par nom
    pub fn get<'a>(&'a self, headers: &HeaderIndex, name: &str) -> Option<&'a str> {
        headers
            .position(name)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Valeur présente et non vide
    pub fn has_value(&self, column: usize) -> bool {
        self.values
            .get(column)
            .map(|v| !v.trim().is_empty() && v != EMPTY_VALUE)
            .unwrap_or(false)
    }
}

/// Feuille d'échantillons lue mais non compilée
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSheet {
    /// Ligne d'en-tête d'origine, `#` initial retiré
    pub raw_header: String,
    pub headers: HeaderIndex,
    pub rows: Vec<SheetRow>,
}

impl SampleSheet {
    /// Lit une feuille depuis le disque
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| DemuxError::SampleSheetUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).ok_or_else(|| DemuxError::EmptySampleSheet(path.to_path_buf()))
    }

    /// Analyse le texte d'une feuille
    ///
    /// La première ligne non vide est l'en-tête. Les lignes suivantes vides ou
    /// commençant par `#` sont ignorées. Retourne `None` sans en-tête.
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .skip_while(|line| line.trim().is_empty());

        let raw_header = lines.next()?;
        let raw_header = raw_header.strip_prefix('#').unwrap_or(raw_header).to_string();
        let raw_headers: Vec<&str> = raw_header.split('\t').collect();
        let headers = HeaderIndex::from_raw(&raw_headers);

        let rows = lines
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .map(|line| SheetRow::parse(line, headers.len()))
            .collect();

        Some(Self {
            raw_header,
            headers,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
