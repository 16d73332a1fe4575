//! Staging-table merge of one partition artifact into the target table
//!
//! The controller owns the transaction; the engine, staging and diagnostics
//! modules each contribute the statements of one step.

pub mod controller;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod staging;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::LoadErrorDetail;
use crate::partition::ArtifactLocator;

pub use controller::{MergeController, MergeSettings, MergeState};
pub use diagnostics::DiagnosticsReporter;
pub use engine::MergeCounts;
pub use error::MergeError;
pub use staging::{StagingTable, ensure_table};

/// A committed merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Id of the run, also attached to its log span
    pub run_id: Uuid,
    /// Artifact URI
    pub artifact: String,
    /// Target table
    pub table: String,
    /// Rows bulk-loaded into staging
    pub rows_loaded: u64,
    pub counts: MergeCounts,
}

/// Printable summary of a merge run, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub artifact: String,
    pub partition: String,
    pub state: MergeState,
    /// Process exit status: 0 committed, otherwise `MergeError::exit_code`
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_loaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<MergeCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<LoadErrorDetail>,
}

impl MergeReport {
    /// Summarise the result of `MergeController::run_merge`
    pub fn from_result(artifact: &ArtifactLocator, result: &Result<MergeOutcome, MergeError>) -> Self {
        let base = Self {
            artifact: artifact.uri(),
            partition: artifact.partition().to_string(),
            state: MergeState::Committed,
            exit_code: 0,
            run_id: None,
            rows_loaded: None,
            counts: None,
            error_kind: None,
            error: None,
            diagnostics: Vec::new(),
        };

        match result {
            Ok(outcome) => Self {
                run_id: Some(outcome.run_id),
                rows_loaded: Some(outcome.rows_loaded),
                counts: Some(outcome.counts),
                ..base
            },
            Err(e) => Self {
                state: MergeState::Failed,
                exit_code: e.exit_code(),
                error_kind: Some(e.kind().to_string()),
                error: Some(e.to_string()),
                diagnostics: e.diagnostics().to_vec(),
                ..base
            },
        }
    }
}
