//! Normalisation des en-têtes de la feuille d'échantillons
//!
//! Un en-tête est mis en minuscules et débarrassé de ses espaces. La forme
//! `Nom Long (code)` devient `code:nomlong`. Une petite table de renommage
//! ramène ensuite les variantes connues vers les noms canoniques.
//! La normalisation est idempotente.

use lazy_static::lazy_static;
use regex::Regex;

/// Marqueur d'un en-tête vide ou mal formé
pub const EMPTY_HEADER: &str = "empty_header";

/// Colonne ajoutée par la compilation des barcodes
pub const ORIGINAL_BARCODE_COLUMN: &str = "original_barcode_sequence";

/// Noms de colonnes recherchés par le pipeline (forme libre, normalisés à la recherche)
pub mod columns {
    pub const LANE: &str = "Lane";
    pub const PROJECT: &str = "Project";
    pub const SAMPLE_NAME: &str = "Sample Name";
    pub const LIBRARY_NAME: &str = "Library Name";
    pub const BARCODE: &str = "Index";
    pub const FCID: &str = "FCID";
    pub const READ_STRUCTURE: &str = "Read Structure";
}

const RENAMES: &[(&str, &str)] = &[
    ("index", "barcode_sequence"),
    ("barcode", "barcode_sequence"),
    ("barcodesequence", "barcode_sequence"),
    ("sample_project", "project"),
    ("sampleproject", "project"),
];

lazy_static! {
    static ref PARENTHETICAL: Regex = Regex::new(r"^([^():]*?)\s*\(([^()]*)\)$").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

fn strip_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value, "").into_owned()
}

/// Normalise un en-tête brut
pub fn normalize_header(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();

    let key = match PARENTHETICAL.captures(&lowered) {
        Some(caps) => {
            let name = strip_whitespace(&caps[1]);
            let code = strip_whitespace(&caps[2]);
            if name.is_empty() || code.is_empty() {
                String::new()
            } else {
                format!("{}:{}", code, name)
            }
        }
        None => strip_whitespace(&lowered),
    };

    let key = RENAMES
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| to.to_string())
        .unwrap_or(key);

    if key.is_empty() {
        EMPTY_HEADER.to_string()
    } else {
        key
    }
}

/// Normalise une ligne d'en-têtes, index par index
pub fn normalize_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter().map(|h| normalize_header(h.as_ref())).collect()
}

/// En-têtes normalisés, dans l'ordre des colonnes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderIndex {
    keys: Vec<String>,
}

impl HeaderIndex {
    /// Construit l'index à partir d'en-têtes bruts
    pub fn from_raw<S: AsRef<str>>(raw: &[S]) -> Self {
        Self {
            keys: normalize_headers(raw),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Ajoute une colonne en fin d'index et retourne sa position
    pub fn push(&mut self, raw: &str) -> usize {
        self.keys.push(normalize_header(raw));
        self.keys.len() - 1
    }

    /// Recherche insensible à la casse d'une colonne
    ///
    /// Le nom demandé est normalisé comme un en-tête. Une clé identique est
    /// prioritaire; sinon une clé `code:nom` correspond si son code ou son nom
    /// est égal au nom demandé. À égalité, la première colonne l'emporte.
    pub fn position(&self, name: &str) -> Option<usize> {
        let wanted = normalize_header(name);

        self.keys
            .iter()
            .position(|key| key.eq_ignore_ascii_case(&wanted))
            .or_else(|| {
                self.keys.iter().position(|key| match key.split_once(':') {
                    Some((code, long)) => {
                        code.eq_ignore_ascii_case(&wanted) || long.eq_ignore_ascii_case(&wanted)
                    }
                    None => false,
                })
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parenthetical_rewrite() {
        assert_eq!(normalize_header("Sample Name (SM)"), "sm:samplename");
        assert_eq!(normalize_header("Flowcell ID (FCID)"), "fcid:flowcellid");
        assert_eq!(normalize_header("Read Structure(RS)"), "rs:readstructure");
    }

    #[test]
    fn test_plain_headers() {
        assert_eq!(normalize_header("Lane"), "lane");
        assert_eq!(normalize_header("  Library   Name "), "libraryname");
    }

    #[test]
    fn test_rename_table() {
        assert_eq!(normalize_header("Index"), "barcode_sequence");
        assert_eq!(normalize_header("Barcode Sequence"), "barcode_sequence");
        assert_eq!(normalize_header("Sample_Project"), "project");
    }

    #[test]
    fn test_empty_and_malformed_headers() {
        assert_eq!(normalize_header(""), EMPTY_HEADER);
        assert_eq!(normalize_header("   "), EMPTY_HEADER);
        assert_eq!(normalize_header("(SM)"), EMPTY_HEADER);
        assert_eq!(normalize_header("Sample ()"), EMPTY_HEADER);
    }

    #[test]
    fn test_already_normalized_is_stable() {
        let raw = ["Lane", "Sample Name (SM)", "Index", "", "FCID", ORIGINAL_BARCODE_COLUMN];
        let once = normalize_headers(&raw);
        let twice = normalize_headers(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_position_lookup() {
        let index = HeaderIndex::from_raw(&[
            "Flowcell ID (FCID)",
            "Lane",
            "Sample Name (SM)",
            "Index",
            "Read Structure (RS)",
        ]);

        assert_eq!(index.position(columns::FCID), Some(0));
        assert_eq!(index.position("flowcell id"), Some(0));
        assert_eq!(index.position(columns::LANE), Some(1));
        assert_eq!(index.position("SAMPLE NAME"), Some(2));
        assert_eq!(index.position(columns::BARCODE), Some(3));
        assert_eq!(index.position("barcode_sequence"), Some(3));
        assert_eq!(index.position(columns::READ_STRUCTURE), Some(4));
        assert_eq!(index.position(columns::PROJECT), None);
    }

    #[test]
    fn test_exact_match_wins_over_code() {
        let index = HeaderIndex::from_raw(&["Something (lane)", "Lane"]);
        assert_eq!(index.position("lane"), Some(1));
    }
}
