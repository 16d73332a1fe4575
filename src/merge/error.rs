//! Merge failure taxonomy

use crate::models::LoadErrorDetail;
use crate::warehouse::WarehouseError;

/// Why a merge did not commit
///
/// Every variant leaves the target untouched. `Connection` means no
/// transaction was ever opened; the others were rolled back, or for a failed
/// COMMIT, aborted by the server. The `diagnostics` field holds whatever the load-error catalog
/// reported for the session, possibly nothing.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The warehouse could not be reached or refused to begin a transaction
    #[error("Cannot connect to warehouse: {source}")]
    Connection { source: WarehouseError },

    /// Target or staging DDL failed
    #[error("Schema step '{step}' failed: {source}")]
    Schema {
        step: &'static str,
        source: WarehouseError,
        diagnostics: Vec<LoadErrorDetail>,
    },

    /// Bulk load into staging was rejected
    #[error("Load failed: {source}")]
    Load {
        source: WarehouseError,
        diagnostics: Vec<LoadErrorDetail>,
    },

    /// Delete or insert against the target failed
    #[error("Merge step '{step}' failed: {source}")]
    Merge {
        step: &'static str,
        source: WarehouseError,
        diagnostics: Vec<LoadErrorDetail>,
    },

    /// COMMIT failed
    #[error("Transaction step '{step}' failed: {source}")]
    Transaction {
        step: &'static str,
        source: WarehouseError,
        diagnostics: Vec<LoadErrorDetail>,
    },
}

impl MergeError {
    /// Load-error rows collected after the rollback
    pub fn diagnostics(&self) -> &[LoadErrorDetail] {
        match self {
            MergeError::Connection { .. } => &[],
            MergeError::Schema { diagnostics, .. }
            | MergeError::Load { diagnostics, .. }
            | MergeError::Merge { diagnostics, .. }
            | MergeError::Transaction { diagnostics, .. } => diagnostics,
        }
    }

    pub(crate) fn with_diagnostics(mut self, rows: Vec<LoadErrorDetail>) -> Self {
        match &mut self {
            MergeError::Connection { .. } => {}
            MergeError::Schema { diagnostics, .. }
            | MergeError::Load { diagnostics, .. }
            | MergeError::Merge { diagnostics, .. }
            | MergeError::Transaction { diagnostics, .. } => *diagnostics = rows,
        }
        self
    }

    /// Whether a transaction was open when the failure happened
    pub fn transaction_opened(&self) -> bool {
        !matches!(self, MergeError::Connection { .. })
    }

    /// Process exit status for this failure
    pub fn exit_code(&self) -> i32 {
        if self.transaction_opened() { 2 } else { 1 }
    }

    /// Short name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            MergeError::Connection { .. } => "connection",
            MergeError::Schema { .. } => "schema",
            MergeError::Load { .. } => "load",
            MergeError::Merge { .. } => "merge",
            MergeError::Transaction { .. } => "transaction",
        }
    }
}
