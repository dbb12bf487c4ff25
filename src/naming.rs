//! Output naming conventions.
//!
//! - Each run writes into `output_YYYYMMDD_HHMMSS/` under the configured base.
//! - Each source `name.ext` becomes `name_insta.jpg` in that folder.
//!
//! Only the last extension is stripped: `trip.day1.jpg` → `trip.day1_insta.jpg`.

use chrono::NaiveDateTime;
use std::path::Path;

/// Suffix appended to every output file stem.
pub const OUTPUT_SUFFIX: &str = "_insta.jpg";

/// Prefix of every per-run output folder.
pub const OUTPUT_FOLDER_PREFIX: &str = "output_";

/// Derive the output file name for a source file.
pub fn output_file_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}{OUTPUT_SUFFIX}")
}

/// Folder name for a run started at `started`, at one-second granularity.
pub fn output_folder_name(started: NaiveDateTime) -> String {
    format!(
        "{OUTPUT_FOLDER_PREFIX}{}",
        started.format("%Y%m%d_%H%M%S")
    )
}
