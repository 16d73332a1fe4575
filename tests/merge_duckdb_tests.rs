//! Merge properties against the embedded DuckDB warehouse

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;

use post_loader::merge::{DiagnosticsReporter, MergeController, MergeError, MergeSettings};
use post_loader::models::{LoadErrorDetail, LoadErrorScope, Record};
use post_loader::partition::artifact::{header, write_artifact};
use post_loader::partition::{ArtifactLocator, PartitionDate};
use post_loader::warehouse::{
    Dialect, DuckDBConnector, DuckDBWarehouse, TableSchema, Warehouse, WarehouseConnector,
    WarehouseError, WarehouseResult,
};

const ROLE: &str = "arn:aws:iam::123456789012:role/RedShiftS3";

fn record(id: &str, score: i32) -> Record {
    Record {
        id: id.to_string(),
        title: format!("Post {}", id),
        score,
        edited: false,
        num_comments: score * 2,
        author: "someone".to_string(),
        created_utc: NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
        url: format!("https://example.com/{}", id),
        upvote_ratio: 0.5,
        over_18: false,
        stickied: id.starts_with('s'),
    }
}

fn partition(name: &str) -> ArtifactLocator {
    ArtifactLocator::new("bucket", PartitionDate::parse(name).unwrap()).unwrap()
}

fn write_partition(root: &Path, name: &str, records: &[Record]) -> ArtifactLocator {
    let locator = partition(name);
    write_artifact(&root.join(locator.key()), records).unwrap();
    locator
}

fn settings() -> MergeSettings {
    MergeSettings::new(TableSchema::records("reddit").unwrap(), ROLE)
}

async fn target_rows(connector: &impl WarehouseConnector) -> Vec<Record> {
    let warehouse = connector.connect().await.unwrap();
    let rows = warehouse
        .fetch_records(&TableSchema::records("reddit").unwrap(), None)
        .await
        .unwrap();
    warehouse.close().await.unwrap();
    rows
}

fn scores(rows: &[Record]) -> Vec<(String, i32)> {
    rows.iter().map(|r| (r.id.clone(), r.score)).collect()
}

fn pairs(items: &[(&str, i32)]) -> Vec<(String, i32)> {
    items.iter().map(|(id, s)| (id.to_string(), *s)).collect()
}

#[tokio::test]
async fn test_upsert_replaces_and_inserts() {
    let dir = TempDir::new().unwrap();
    let controller = MergeController::new(DuckDBConnector::in_memory(dir.path()).unwrap(), settings());

    let seed = write_partition(dir.path(), "20240130", &[record("a1", 5)]);
    controller.run_merge(&seed).await.unwrap();

    let next = write_partition(dir.path(), "20240131", &[record("a1", 9), record("b2", 1)]);
    let outcome = controller.run_merge(&next).await.unwrap();
    assert_eq!(outcome.rows_loaded, 2);
    assert_eq!(outcome.counts.deleted, 1);
    assert_eq!(outcome.counts.inserted, 2);

    let rows = target_rows(controller.connector()).await;
    assert_eq!(scores(&rows), pairs(&[("a1", 9), ("b2", 1)]));
    assert_eq!(rows[0], record("a1", 9));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let controller = MergeController::new(DuckDBConnector::in_memory(dir.path()).unwrap(), settings());
    let artifact = write_partition(
        dir.path(),
        "20240131",
        &[record("a1", 3), record("b2", 4), record("s3", 5)],
    );

    controller.run_merge(&artifact).await.unwrap();
    let once = target_rows(controller.connector()).await;

    let outcome = controller.run_merge(&artifact).await.unwrap();
    assert_eq!(outcome.counts.deleted, 3);
    let twice = target_rows(controller.connector()).await;

    assert_eq!(once, twice);
    assert_eq!(twice.len(), 3);
}

#[tokio::test]
async fn test_disjoint_partitions_accumulate() {
    let dir = TempDir::new().unwrap();
    let controller = MergeController::new(DuckDBConnector::in_memory(dir.path()).unwrap(), settings());

    let p1 = write_partition(dir.path(), "20240130", &[record("a", 1), record("b", 2)]);
    let p2 = write_partition(dir.path(), "20240131", &[record("c", 3), record("d", 4)]);
    controller.run_merge(&p1).await.unwrap();
    let outcome = controller.run_merge(&p2).await.unwrap();
    assert_eq!(outcome.counts.deleted, 0);

    let rows = target_rows(controller.connector()).await;
    assert_eq!(
        scores(&rows),
        pairs(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)])
    );
}

#[tokio::test]
async fn test_empty_partition_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let controller = MergeController::new(DuckDBConnector::in_memory(dir.path()).unwrap(), settings());

    let seed = write_partition(dir.path(), "20240130", &[record("a1", 5)]);
    controller.run_merge(&seed).await.unwrap();

    let empty = write_partition(dir.path(), "20240131", &[]);
    let outcome = controller.run_merge(&empty).await.unwrap();
    assert_eq!(outcome.rows_loaded, 0);
    assert_eq!(scores(&target_rows(controller.connector()).await), pairs(&[("a1", 5)]));
}

#[tokio::test]
async fn test_malformed_row_rejects_whole_partition() {
    let dir = TempDir::new().unwrap();
    let controller = MergeController::new(DuckDBConnector::in_memory(dir.path()).unwrap(), settings());

    let seed = write_partition(dir.path(), "20240130", &[record("x", 1)]);
    controller.run_merge(&seed).await.unwrap();

    let bad = partition("20240131");
    std::fs::write(
        dir.path().join(bad.key()),
        format!(
            "{}\n\
             a1,Fine,9,false,0,me,2024-01-31 09:30:00,https://a,0.5,false,false\n\
             b2,Broken,abc,false,0,me,2024-01-31 09:30:00,https://b,0.5,false,false\n",
            header()
        ),
    )
    .unwrap();

    let err = controller.run_merge(&bad).await.unwrap_err();
    assert!(matches!(err, MergeError::Load { .. }));
    assert_eq!(err.exit_code(), 2);

    // Nothing from the rejected partition, the valid a1 included
    assert_eq!(scores(&target_rows(controller.connector()).await), pairs(&[("x", 1)]));

    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].filename, "s3://bucket/20240131.csv");
    assert_eq!(diagnostics[0].line_number, 3);
    assert_eq!(diagnostics[0].column_name, "score");
    assert!(diagnostics[0].raw_value.contains("abc"));
}

#[tokio::test]
async fn test_duplicate_ids_reject_partition() {
    let dir = TempDir::new().unwrap();
    let controller = MergeController::new(DuckDBConnector::in_memory(dir.path()).unwrap(), settings());

    let seed = write_partition(dir.path(), "20240130", &[record("x", 1)]);
    controller.run_merge(&seed).await.unwrap();

    let doubled = write_partition(dir.path(), "20240131", &[record("a1", 1), record("a1", 2)]);
    let err = controller.run_merge(&doubled).await.unwrap_err();
    assert!(matches!(err, MergeError::Load { .. }));
    assert_eq!(err.exit_code(), 2);

    // Target still holds at most one row per id
    assert_eq!(scores(&target_rows(controller.connector()).await), pairs(&[("x", 1)]));

    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].column_name, "id");
    assert_eq!(diagnostics[0].raw_value, "a1");
}

#[tokio::test]
async fn test_diagnostics_available_after_failure() {
    let dir = TempDir::new().unwrap();
    let connector = DuckDBConnector::in_memory(dir.path()).unwrap();
    let bad = partition("20240131");
    std::fs::write(
        dir.path().join(bad.key()),
        format!(
            "{}\nb2,Broken,1,maybe,0,me,2024-01-31 09:30:00,https://b,0.5,false,false\n",
            header()
        ),
    )
    .unwrap();

    let session = connector.connect().await.unwrap();
    let schema = TableSchema::records("reddit").unwrap();
    session.begin().await.unwrap();
    session
        .execute(&schema.create_table_sql(Dialect::DuckDB))
        .await
        .unwrap();
    session
        .execute(&schema.create_staging_sql("reddit_staging", Dialect::DuckDB))
        .await
        .unwrap();
    assert!(
        session
            .load_from_storage("reddit_staging", &bad, ROLE)
            .await
            .is_err()
    );
    session.rollback().await.unwrap();

    let rows = DiagnosticsReporter::default().report_errors(&session).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].column_name, "edited");
    assert_eq!(rows[0].line_number, 2);
    assert_eq!(rows[0].table, "reddit_staging");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_artifact_fails_load() {
    let dir = TempDir::new().unwrap();
    let controller = MergeController::new(DuckDBConnector::in_memory(dir.path()).unwrap(), settings());

    let err = controller.run_merge(&partition("20240131")).await.unwrap_err();
    assert!(matches!(err, MergeError::Load { .. }));
    assert!(err.diagnostics().is_empty());
}

/// Fails every statement starting with `prefix`
struct FaultyConnector {
    inner: DuckDBConnector,
    prefix: &'static str,
}

struct FaultyWarehouse {
    inner: DuckDBWarehouse,
    prefix: &'static str,
}

#[async_trait(?Send)]
impl WarehouseConnector for FaultyConnector {
    type Warehouse = FaultyWarehouse;

    async fn connect(&self) -> WarehouseResult<FaultyWarehouse> {
        Ok(FaultyWarehouse {
            inner: self.inner.connect().await?,
            prefix: self.prefix,
        })
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[async_trait(?Send)]
impl Warehouse for FaultyWarehouse {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        if sql.starts_with(self.prefix) {
            return Err(WarehouseError::QueryFailed(format!("injected: {}", sql)));
        }
        self.inner.execute(sql).await
    }

    async fn begin(&self) -> WarehouseResult<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> WarehouseResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> WarehouseResult<()> {
        self.inner.rollback().await
    }

    async fn load_from_storage(
        &self,
        staging: &str,
        artifact: &ArtifactLocator,
        access_role: &str,
    ) -> WarehouseResult<u64> {
        self.inner
            .load_from_storage(staging, artifact, access_role)
            .await
    }

    async fn load_errors(
        &self,
        scope: LoadErrorScope,
        limit: usize,
    ) -> WarehouseResult<Vec<LoadErrorDetail>> {
        self.inner.load_errors(scope, limit).await
    }

    async fn fetch_records(
        &self,
        table: &TableSchema,
        limit: Option<usize>,
    ) -> WarehouseResult<Vec<Record>> {
        self.inner.fetch_records(table, limit).await
    }

    async fn close(self) -> WarehouseResult<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_insert_failure_preserves_deleted_rows() {
    let dir = TempDir::new().unwrap();
    let connector = DuckDBConnector::in_memory(dir.path()).unwrap();

    let seed = write_partition(dir.path(), "20240130", &[record("a1", 5), record("c3", 7)]);
    let healthy = MergeController::new(connector, settings());
    healthy.run_merge(&seed).await.unwrap();
    let before = target_rows(healthy.connector()).await;

    // Reuse the same database behind a connector whose INSERT fails
    let faulty = MergeController::new(
        FaultyConnector {
            inner: healthy.into_connector(),
            prefix: "INSERT INTO",
        },
        settings(),
    );
    let next = write_partition(dir.path(), "20240131", &[record("a1", 9), record("b2", 1)]);
    let err = faulty.run_merge(&next).await.unwrap_err();
    assert!(matches!(err, MergeError::Merge { step: "insert", .. }));

    let after = target_rows(&faulty.connector().inner).await;
    assert_eq!(after, before);
    assert_eq!(scores(&after), pairs(&[("a1", 5), ("c3", 7)]));
}
