//! Transaction controller
//!
//! Drives one merge through
//! `Connecting -> Preparing -> Loading -> Merging -> Committed`, or on any
//! failure after the transaction opened, `RollingBack -> Failed`. Opening
//! the session and beginning the transaction are both `Connecting`; a
//! failure there ends the run without rollback or diagnostics.
//!
//! Invariants:
//! - COMMIT is issued at most once, only after both merge statements succeed.
//! - ROLLBACK is issued at most once, only on failure, never after COMMIT.
//! - The session is closed on every path once it was opened.

use tracing::Instrument;
use uuid::Uuid;

use super::diagnostics::DiagnosticsReporter;
use super::engine::{self, MergeCounts};
use super::error::MergeError;
use super::staging::{StagingTable, ensure_table};
use super::MergeOutcome;
use crate::partition::ArtifactLocator;
use crate::warehouse::{TableSchema, Warehouse, WarehouseConnector};

/// Position of a merge in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    Connecting,
    Preparing,
    Loading,
    Merging,
    Committed,
    RollingBack,
    Failed,
}

impl std::fmt::Display for MergeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MergeState::Connecting => "connecting",
            MergeState::Preparing => "preparing",
            MergeState::Loading => "loading",
            MergeState::Merging => "merging",
            MergeState::Committed => "committed",
            MergeState::RollingBack => "rolling_back",
            MergeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a merge run needs besides the session
#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// Target table
    pub table: TableSchema,
    /// Role ARN the warehouse assumes to read the artifact
    pub access_role: String,
    pub diagnostics: DiagnosticsReporter,
}

impl MergeSettings {
    pub fn new(table: TableSchema, access_role: impl Into<String>) -> Self {
        Self {
            table,
            access_role: access_role.into(),
            diagnostics: DiagnosticsReporter::default(),
        }
    }

    /// Cap the number of load-error rows fetched on failure
    pub fn with_diagnostics_limit(mut self, limit: usize) -> Self {
        self.diagnostics = DiagnosticsReporter::new(limit);
        self
    }
}

/// Runs merges against one warehouse, one at a time
pub struct MergeController<C: WarehouseConnector> {
    connector: C,
    settings: MergeSettings,
}

fn enter(state: MergeState) {
    tracing::info!(%state, "merge state");
}

async fn close_session<W: Warehouse>(warehouse: W) {
    if let Err(e) = warehouse.close().await {
        tracing::warn!("Failed to close warehouse session: {}", e);
    }
}

impl<C: WarehouseConnector> MergeController<C> {
    pub fn new(connector: C, settings: MergeSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn into_connector(self) -> C {
        self.connector
    }

    /// Merge one partition artifact into the target table
    ///
    /// # Returns
    /// The committed row counts, or the error that caused the rollback
    /// together with any load-error diagnostics
    pub async fn run_merge(&self, artifact: &ArtifactLocator) -> Result<MergeOutcome, MergeError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "merge",
            %run_id,
            partition = %artifact.partition(),
            table = self.settings.table.name()
        );
        self.run(run_id, artifact).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, artifact: &ArtifactLocator) -> Result<MergeOutcome, MergeError> {
        enter(MergeState::Connecting);
        tracing::info!("Connecting to {}", self.connector.describe());
        let warehouse = match self.connector.connect().await {
            Ok(warehouse) => warehouse,
            Err(source) => {
                enter(MergeState::Failed);
                return Err(MergeError::Connection { source });
            }
        };

        if let Err(source) = warehouse.begin().await {
            enter(MergeState::Failed);
            close_session(warehouse).await;
            return Err(MergeError::Connection { source });
        }

        let result = match self.transact(&warehouse, artifact).await {
            Ok((rows_loaded, counts)) => Ok(MergeOutcome {
                run_id,
                artifact: artifact.uri(),
                table: self.settings.table.name().to_string(),
                rows_loaded,
                counts,
            }),
            Err(error) => Err(self.recover(&warehouse, error).await),
        };

        close_session(warehouse).await;
        result
    }

    /// Everything after BEGIN up to COMMIT, plus the staging drop
    async fn transact(
        &self,
        warehouse: &C::Warehouse,
        artifact: &ArtifactLocator,
    ) -> Result<(u64, MergeCounts), MergeError> {
        let table = &self.settings.table;

        enter(MergeState::Preparing);
        ensure_table(warehouse, table)
            .await
            .map_err(|source| MergeError::Schema {
                step: "ensure_table",
                source,
                diagnostics: Vec::new(),
            })?;
        let staging = StagingTable::create(warehouse, table)
            .await
            .map_err(|source| MergeError::Schema {
                step: "create_staging",
                source,
                diagnostics: Vec::new(),
            })?;

        enter(MergeState::Loading);
        let rows_loaded = warehouse
            .load_from_storage(staging.name(), artifact, &self.settings.access_role)
            .await
            .map_err(|source| MergeError::Load {
                source,
                diagnostics: Vec::new(),
            })?;
        tracing::info!(rows_loaded, "Loaded {} into {}", artifact, staging.name());

        enter(MergeState::Merging);
        let counts = engine::merge(warehouse, table, staging.name())
            .await
            .map_err(|e| MergeError::Merge {
                step: e.step,
                source: e.source,
                diagnostics: Vec::new(),
            })?;

        warehouse
            .commit()
            .await
            .map_err(|source| MergeError::Transaction {
                step: "commit",
                source,
                diagnostics: Vec::new(),
            })?;
        enter(MergeState::Committed);
        tracing::info!(
            deleted = counts.deleted,
            inserted = counts.inserted,
            "Merged into {}",
            table.name()
        );

        if let Err(e) = staging.drop_table(warehouse).await {
            tracing::warn!("Failed to drop staging table: {}", e);
        }

        Ok((rows_loaded, counts))
    }

    /// Roll back (unless COMMIT was already issued) and attach diagnostics
    async fn recover(&self, warehouse: &C::Warehouse, error: MergeError) -> MergeError {
        let commit_issued = matches!(error, MergeError::Transaction { step: "commit", .. });
        if !commit_issued {
            enter(MergeState::RollingBack);
            if let Err(e) = warehouse.rollback().await {
                tracing::warn!("Rollback failed: {}", e);
            }
        }
        tracing::warn!("Merge failed: {}", error);

        let diagnostics = self.settings.diagnostics.report_errors(warehouse).await;
        enter(MergeState::Failed);
        error.with_diagnostics(diagnostics)
    }
}
