//! Feuille d'échantillons: lecture, normalisation des en-têtes, compilation
//! des barcodes et répartition par couloir

pub mod barcode;
pub mod header;
pub mod lanes;
pub mod table;

pub use barcode::{
    reconstruct_barcode, strip_barcode, BarcodeCompiler, CompiledSheet, ReadStructure,
    JOKER_PLACEHOLDER,
};
pub use header::{
    columns, normalize_header, normalize_headers, HeaderIndex, EMPTY_HEADER,
    ORIGINAL_BARCODE_COLUMN,
};
pub use lanes::{missing_lanes, partition, LaneBarcodeSet, LanePartition, EXPECTED_LANES};
pub use table::{SampleSheet, SheetRow, EMPTY_VALUE};
