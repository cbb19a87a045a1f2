//! Utilitaires partagés

pub mod format;
pub mod fs;

pub use format::{format_lane_list, parse_lane_list, run_timestamp, LaneListError};
pub use fs::{copy_to, CopyOutcome};
