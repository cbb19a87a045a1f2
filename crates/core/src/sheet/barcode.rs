//! Compilation des barcodes à partir de la structure de lecture
//!
//! La structure de lecture décrit les cycles d'index (`I`) et les bases
//! joker (`J`) dans l'ordre de lecture, par exemple `8I8J8I`. Le barcode
//! physique est reconstruit dans cet espace d'index: doublé si la feuille ne
//! donne qu'un seul index pour un run double index, puis masqué aux positions
//! joker.

use super::header::{columns, HeaderIndex, ORIGINAL_BARCODE_COLUMN};
use super::table::{SampleSheet, SheetRow, EMPTY_VALUE};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;

/// Caractère substitué aux positions joker
pub const JOKER_PLACEHOLDER: char = 'N';

/// Longueur d'index maximale acceptée, en cycles
pub const MAX_INDEX_LENGTH: usize = 4096;

lazy_static! {
    static ref INDEX_TOKEN: Regex = Regex::new(r"(?i)(\d+)([IJ])").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref NICKNAME: Regex = Regex::new(r"\([^()]*\)$").unwrap();
}

/// Espace d'index décrit par une structure de lecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStructure {
    /// Somme des longueurs des segments `I` et `J`
    pub index_length: usize,
    /// Positions couvertes par les segments `J`, dans l'ordre de lecture
    pub joker_offsets: Vec<usize>,
}

impl ReadStructure {
    /// Analyse les segments d'index
    ///
    /// `None` si aucun segment n'est reconnu, ou si la longueur d'index
    /// dépasse `MAX_INDEX_LENGTH`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut index_length = 0usize;
        let mut joker_offsets = Vec::new();
        let mut found = false;

        for caps in INDEX_TOKEN.captures_iter(value) {
            let count: usize = caps[1].parse().ok()?;
            let end = index_length
                .checked_add(count)
                .filter(|&end| end <= MAX_INDEX_LENGTH);
            let Some(end) = end else {
                tracing::debug!("Structure de lecture hors limites: {}", value);
                return None;
            };
            found = true;

            if caps[2].eq_ignore_ascii_case("j") {
                joker_offsets.extend(index_length..end);
            }
            index_length = end;
        }

        found.then_some(Self {
            index_length,
            joker_offsets,
        })
    }
}

/// Retire les espaces et le surnom final `(nom)` d'un barcode
pub fn strip_barcode(value: &str) -> String {
    let compact = WHITESPACE.replace_all(value, "");
    NICKNAME.replace(&compact, "").into_owned()
}

/// Reconstruit le barcode physique
///
/// Les positions joker au-delà de la longueur du barcode sont ignorées.
pub fn reconstruct_barcode(stripped: &str, structure: &ReadStructure) -> String {
    let mut barcode: Vec<char> = stripped.chars().collect();

    if structure.index_length == 2 * barcode.len() {
        barcode.extend_from_within(..);
    }

    for &offset in &structure.joker_offsets {
        match barcode.get_mut(offset) {
            Some(base) => *base = JOKER_PLACEHOLDER,
            None => {
                tracing::debug!(
                    "Position joker {} hors du barcode {:?} (longueur {})",
                    offset,
                    stripped,
                    barcode.len()
                );
            }
        }
    }

    barcode.into_iter().collect()
}

/// Feuille compilée: en-têtes normalisés plus la colonne du barcode d'origine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSheet {
    /// Ligne d'en-tête d'origine, pour les feuilles par projet
    pub raw_header: String,
    pub headers: HeaderIndex,
    pub rows: Vec<SheetRow>,
}

impl CompiledSheet {
    /// Écrit un fichier de barcodes tabulé pour les lignes données
    pub fn write_barcode_file<'a, I>(headers: &HeaderIndex, rows: I, path: &Path) -> io::Result<()>
    where
        I: IntoIterator<Item = &'a SheetRow>,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut text = headers.keys().join("\t");
        text.push('\n');
        for row in rows {
            text.push_str(&row.values.join("\t"));
            text.push('\n');
        }

        fs::write(path, text)
    }
}

/// Compilateur de barcodes
pub struct BarcodeCompiler;

impl BarcodeCompiler {
    /// Compile toutes les lignes d'une feuille
    ///
    /// Sans colonne de barcode ou de structure de lecture, les lignes passent
    /// telles quelles; la validation signalera l'en-tête manquant.
    pub fn compile(sheet: &SampleSheet) -> CompiledSheet {
        let mut headers = sheet.headers.clone();
        let barcode_column = headers.position(columns::BARCODE);
        let structure_column = headers.position(columns::READ_STRUCTURE);
        headers.push(ORIGINAL_BARCODE_COLUMN);

        let rows = sheet
            .rows
            .iter()
            .map(|row| Self::compile_row(row, barcode_column, structure_column))
            .collect();

        CompiledSheet {
            raw_header: sheet.raw_header.clone(),
            headers,
            rows,
        }
    }

    fn compile_row(
        row: &SheetRow,
        barcode_column: Option<usize>,
        structure_column: Option<usize>,
    ) -> SheetRow {
        let mut values = row.values.clone();
        let raw_barcode = barcode_column.and_then(|i| values.get(i)).cloned();

        values.push(raw_barcode.as_deref().map(strip_barcode).unwrap_or_default());

        if let (Some(barcode_column), Some(raw_barcode)) = (barcode_column, raw_barcode) {
            let stripped = strip_barcode(&raw_barcode);
            let structure = structure_column
                .and_then(|i| values.get(i))
                .and_then(|value| ReadStructure::parse(value));

            values[barcode_column] = match structure {
                Some(structure) => reconstruct_barcode(&stripped, &structure),
                None => stripped,
            };
        }

        for value in values.iter_mut() {
            if value.is_empty() {
                *value = EMPTY_VALUE.to_string();
            }
        }

        SheetRow {
            raw: row.raw.clone(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(value: &str) -> ReadStructure {
        ReadStructure::parse(value).unwrap()
    }

    #[test]
    fn test_parse_read_structure() {
        let rs = structure("76T8I8J8I76T");
        assert_eq!(rs.index_length, 24);
        assert_eq!(rs.joker_offsets, (8..16).collect::<Vec<_>>());

        let rs = structure("2j6i");
        assert_eq!(rs.index_length, 8);
        assert_eq!(rs.joker_offsets, vec![0, 1]);

        assert!(ReadStructure::parse("101T101T").is_none());
        assert!(ReadStructure::parse("").is_none());
    }

    #[test]
    fn test_oversized_read_structure_is_unrecognized() {
        assert!(ReadStructure::parse("18446744073709551615I1I").is_none());
        assert!(ReadStructure::parse("99999999999999999999I").is_none());
        assert!(ReadStructure::parse("99999999J").is_none());
        assert!(ReadStructure::parse("4096I1J").is_none());

        let rs = structure("4000I96J");
        assert_eq!(rs.index_length, MAX_INDEX_LENGTH);
        assert_eq!(rs.joker_offsets.len(), 96);
    }

    #[test]
    fn test_strip_barcode() {
        assert_eq!(strip_barcode(" ACGT ACGT (N701)"), "ACGTACGT");
        assert_eq!(strip_barcode("ACGT\t"), "ACGT");
        assert_eq!(strip_barcode("AC(x)GT"), "AC(x)GT");
    }

    #[test]
    fn test_dual_index_doubling() {
        let rs = structure("8I8I");
        assert_eq!(reconstruct_barcode("ACGTACGT", &rs), "ACGTACGTACGTACGT");
    }

    #[test]
    fn test_no_doubling_when_lengths_differ() {
        let rs = structure("8I");
        assert_eq!(reconstruct_barcode("ACGTACGT", &rs), "ACGTACGT");

        let rs = structure("8I7I");
        assert_eq!(reconstruct_barcode("ACGTACGT", &rs), "ACGTACGT");
    }

    #[test]
    fn test_joker_masking_after_doubling() {
        // 4I2J2I: index de 8, barcode de 4 doublé, positions 4 et 5 masquées
        let rs = structure("4I2J2I");
        assert_eq!(reconstruct_barcode("ACGT", &rs), "ACGTNNGT");
    }

    #[test]
    fn test_joker_offsets_out_of_range_are_skipped() {
        let rs = structure("76I8J76I");
        assert_eq!(rs.index_length, 160);
        assert_eq!(rs.joker_offsets, (76..84).collect::<Vec<_>>());
        assert_eq!(reconstruct_barcode("ACGTACGT", &rs), "ACGTACGT");
    }

    #[test]
    fn test_compile_appends_original_and_fills_empty() {
        let sheet = SampleSheet::parse(
            "Lane\tSample Name\tIndex\tRead Structure\tDescription\n\
             1\tS1\tACGTACGT (N701)\t8I8I\t\n",
        )
        .unwrap();

        let compiled = BarcodeCompiler::compile(&sheet);
        let row = &compiled.rows[0];

        assert_eq!(compiled.headers.keys().last().unwrap(), ORIGINAL_BARCODE_COLUMN);
        assert_eq!(row.get(&compiled.headers, columns::BARCODE), Some("ACGTACGTACGTACGT"));
        assert_eq!(row.get(&compiled.headers, ORIGINAL_BARCODE_COLUMN), Some("ACGTACGT"));
        assert_eq!(row.get(&compiled.headers, "Description"), Some(EMPTY_VALUE));
        assert_eq!(row.raw, sheet.rows[0].raw);
    }

    #[test]
    fn test_compile_without_read_structure_column() {
        let sheet = SampleSheet::parse("Lane\tIndex\n1\t ACGT (a)\n").unwrap();
        let compiled = BarcodeCompiler::compile(&sheet);

        assert_eq!(compiled.rows[0].values, vec!["1", "ACGT", "ACGT"]);
    }
}
