//! CSV partition artifact encoding
//!
//! Layout: one header row, then one row per record in `RECORD_COLUMNS`
//! order, comma-delimited, double-quoted when a field contains a comma,
//! quote or line break. Reading an artifact back is the warehouse's job:
//! Redshift `COPY` or DuckDB `read_csv`.

use std::path::{Path, PathBuf};

use crate::models::{RECORD_COLUMNS, Record};

/// Errors raised while writing artifacts
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The artifact could not be written
    #[error("Artifact IO error for {path}: {error}")]
    Io { path: PathBuf, error: String },
}

/// Header line of every artifact
pub fn header() -> String {
    RECORD_COLUMNS.join(",")
}

/// Encode records into artifact text, header first
pub fn encode_records(records: &[Record]) -> String {
    let mut output = header();
    output.push('\n');

    for record in records {
        let values: Vec<String> = record
            .to_text_fields()
            .iter()
            .map(|s| escape_field(s))
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

pub(crate) fn escape_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Write records to `path` as an artifact
pub fn write_artifact(path: &Path, records: &[Record]) -> Result<(), ArtifactError> {
    std::fs::write(path, encode_records(records)).map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}
