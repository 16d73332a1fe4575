//! Best-effort reader of the load-error catalog

use crate::models::{LoadErrorDetail, LoadErrorScope};
use crate::warehouse::Warehouse;

/// Default number of catalog rows fetched after a failure
pub const DEFAULT_DIAGNOSTICS_LIMIT: usize = 50;

/// Reads per-row load failures for the current session
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsReporter {
    limit: usize,
}

impl Default for DiagnosticsReporter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_DIAGNOSTICS_LIMIT,
        }
    }
}

impl DiagnosticsReporter {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Collect the session's load errors
    ///
    /// A failing catalog query is logged and yields an empty list.
    pub async fn report_errors<W: Warehouse>(&self, warehouse: &W) -> Vec<LoadErrorDetail> {
        match warehouse
            .load_errors(LoadErrorScope::CurrentSession, self.limit)
            .await
        {
            Ok(rows) => {
                for row in &rows {
                    tracing::error!("Load error: {}", row);
                }
                rows
            }
            Err(e) => {
                tracing::warn!("Could not read load-error catalog: {}", e);
                Vec::new()
            }
        }
    }
}
