//! State-machine tests for the merge controller against a scripted warehouse

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use post_loader::merge::{MergeController, MergeError, MergeSettings};
use post_loader::models::{LoadErrorDetail, LoadErrorScope, Record};
use post_loader::partition::{ArtifactLocator, PartitionDate};
use post_loader::warehouse::{
    Dialect, TableSchema, Warehouse, WarehouseConnector, WarehouseError, WarehouseResult,
};

/// Shared record of what the fake warehouse was asked to do
#[derive(Default)]
struct Script {
    log: Vec<String>,
    /// Statements starting with any of these prefixes fail
    fail_prefixes: Vec<&'static str>,
    fail_connect: bool,
    fail_diagnostics: bool,
}

type SharedScript = Rc<RefCell<Script>>;

struct FakeConnector {
    script: SharedScript,
}

struct FakeWarehouse {
    script: SharedScript,
}

impl FakeWarehouse {
    fn record(&self, entry: &str) -> WarehouseResult<()> {
        let mut script = self.script.borrow_mut();
        script.log.push(entry.to_string());
        if script.fail_prefixes.iter().any(|p| entry.starts_with(p)) {
            return Err(WarehouseError::QueryFailed(format!("injected: {}", entry)));
        }
        Ok(())
    }
}

fn load_error() -> LoadErrorDetail {
    LoadErrorDetail {
        start_time: None,
        session: 42,
        table: "reddit_staging".into(),
        query: 7,
        filename: "s3://bucket/20240131.csv".into(),
        line_number: 3,
        column_name: "score".into(),
        column_type: "int4".into(),
        raw_value: "abc".into(),
        error_code: 1207,
        reason: "Invalid digit".into(),
    }
}

#[async_trait(?Send)]
impl Warehouse for FakeWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        self.record(sql)?;
        Ok(1)
    }

    async fn load_from_storage(
        &self,
        staging: &str,
        artifact: &ArtifactLocator,
        access_role: &str,
    ) -> WarehouseResult<u64> {
        self.record(&format!("COPY {} FROM {} ROLE {}", staging, artifact, access_role))
            .map_err(|e| WarehouseError::LoadRejected {
                artifact: artifact.uri(),
                message: e.to_string(),
            })?;
        Ok(2)
    }

    async fn load_errors(
        &self,
        scope: LoadErrorScope,
        _limit: usize,
    ) -> WarehouseResult<Vec<LoadErrorDetail>> {
        assert_eq!(scope, LoadErrorScope::CurrentSession);
        let mut script = self.script.borrow_mut();
        script.log.push("LOAD_ERRORS".to_string());
        if script.fail_diagnostics {
            return Err(WarehouseError::QueryFailed("stl_load_errors unavailable".into()));
        }
        Ok(vec![load_error()])
    }

    async fn fetch_records(
        &self,
        _table: &TableSchema,
        _limit: Option<usize>,
    ) -> WarehouseResult<Vec<Record>> {
        Ok(Vec::new())
    }

    async fn close(self) -> WarehouseResult<()> {
        self.script.borrow_mut().log.push("CLOSE".to_string());
        Ok(())
    }
}

#[async_trait(?Send)]
impl WarehouseConnector for FakeConnector {
    type Warehouse = FakeWarehouse;

    async fn connect(&self) -> WarehouseResult<FakeWarehouse> {
        if self.script.borrow().fail_connect {
            return Err(WarehouseError::ConnectionFailed("connection refused".into()));
        }
        Ok(FakeWarehouse {
            script: Rc::clone(&self.script),
        })
    }

    fn describe(&self) -> String {
        "fake://".to_string()
    }
}

fn artifact() -> ArtifactLocator {
    ArtifactLocator::new("bucket", PartitionDate::parse("20240131").unwrap()).unwrap()
}

fn controller(script: Script) -> (MergeController<FakeConnector>, SharedScript) {
    let script = Rc::new(RefCell::new(script));
    let settings = MergeSettings::new(
        TableSchema::records("reddit").unwrap(),
        "arn:aws:iam::123456789012:role/RedShiftS3",
    );
    let connector = FakeConnector {
        script: Rc::clone(&script),
    };
    (MergeController::new(connector, settings), script)
}

fn failing(prefixes: &[&'static str]) -> Script {
    Script {
        fail_prefixes: prefixes.to_vec(),
        ..Default::default()
    }
}

/// First word of every logged statement
fn verbs(script: &SharedScript) -> Vec<String> {
    script
        .borrow()
        .log
        .iter()
        .map(|s| s.split_whitespace().next().unwrap_or_default().to_string())
        .collect()
}

fn count(script: &SharedScript, verb: &str) -> usize {
    verbs(script).iter().filter(|v| *v == verb).count()
}

#[tokio::test]
async fn test_successful_merge_statement_order() {
    let (controller, script) = controller(Script::default());

    let outcome = controller.run_merge(&artifact()).await.unwrap();
    assert_eq!(outcome.rows_loaded, 2);
    assert_eq!(outcome.counts.deleted, 1);
    assert_eq!(outcome.counts.inserted, 1);
    assert_eq!(outcome.artifact, "s3://bucket/20240131.csv");

    assert_eq!(
        verbs(&script),
        vec![
            "BEGIN", "CREATE", "CREATE", "COPY", "DELETE", "INSERT", "COMMIT", "DROP", "CLOSE"
        ]
    );

    let log = script.borrow().log.clone();
    assert!(log[1].starts_with("CREATE TABLE IF NOT EXISTS \"reddit\""));
    assert!(log[2].starts_with("CREATE TEMP TABLE \"reddit_staging\""));
    assert_eq!(
        log[3],
        "COPY reddit_staging FROM s3://bucket/20240131.csv ROLE arn:aws:iam::123456789012:role/RedShiftS3"
    );
}

#[tokio::test]
async fn test_load_failure_rolls_back_once_and_reports() {
    let (controller, script) = controller(failing(&["COPY"]));

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Load { .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(err.diagnostics(), &[load_error()]);

    assert_eq!(
        verbs(&script),
        vec!["BEGIN", "CREATE", "CREATE", "COPY", "ROLLBACK", "LOAD_ERRORS", "CLOSE"]
    );
    assert_eq!(count(&script, "COMMIT"), 0);
}

#[tokio::test]
async fn test_insert_failure_after_delete_rolls_back() {
    let (controller, script) = controller(failing(&["INSERT"]));

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Merge { step: "insert", .. }));

    assert_eq!(count(&script, "DELETE"), 1);
    assert_eq!(count(&script, "ROLLBACK"), 1);
    assert_eq!(count(&script, "COMMIT"), 0);
    assert_eq!(verbs(&script).last().map(String::as_str), Some("CLOSE"));
}

#[tokio::test]
async fn test_schema_failure() {
    let (controller, script) = controller(failing(&["CREATE TABLE"]));

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Schema { step: "ensure_table", .. }));
    assert_eq!(
        verbs(&script),
        vec!["BEGIN", "CREATE", "ROLLBACK", "LOAD_ERRORS", "CLOSE"]
    );
}

#[tokio::test]
async fn test_connection_failure_is_terminal() {
    let (controller, script) = controller(Script {
        fail_connect: true,
        ..Default::default()
    });

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Connection { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(err.diagnostics().is_empty());
    assert!(script.borrow().log.is_empty());
}

#[tokio::test]
async fn test_begin_failure_is_terminal() {
    let (controller, script) = controller(failing(&["BEGIN"]));

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Connection { .. }));
    assert_eq!(err.kind(), "connection");
    assert_eq!(err.exit_code(), 1);
    assert!(err.diagnostics().is_empty());
    assert_eq!(verbs(&script), vec!["BEGIN", "CLOSE"]);
}

#[tokio::test]
async fn test_diagnostics_failure_keeps_original_error() {
    let (controller, script) = controller(Script {
        fail_prefixes: vec!["DELETE"],
        fail_diagnostics: true,
        ..Default::default()
    });

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Merge { step: "delete", .. }));
    assert!(err.to_string().contains("injected"));
    assert!(err.diagnostics().is_empty());
    assert_eq!(count(&script, "ROLLBACK"), 1);
    assert_eq!(count(&script, "CLOSE"), 1);
}

#[tokio::test]
async fn test_commit_failure_never_rolls_back() {
    let (controller, script) = controller(failing(&["COMMIT"]));

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Transaction { step: "commit", .. }));
    assert_eq!(count(&script, "COMMIT"), 1);
    assert_eq!(count(&script, "ROLLBACK"), 0);
    assert_eq!(count(&script, "DROP"), 0);
    assert_eq!(count(&script, "CLOSE"), 1);
}

#[tokio::test]
async fn test_rollback_failure_keeps_original_error() {
    let (controller, script) = controller(failing(&["COPY", "ROLLBACK"]));

    let err = controller.run_merge(&artifact()).await.unwrap_err();
    assert!(matches!(err, MergeError::Load { .. }));
    assert_eq!(count(&script, "ROLLBACK"), 1);
    assert_eq!(count(&script, "CLOSE"), 1);
}

#[tokio::test]
async fn test_staging_drop_failure_after_commit_is_success() {
    let (controller, script) = controller(failing(&["DROP"]));

    assert!(controller.run_merge(&artifact()).await.is_ok());
    assert_eq!(count(&script, "COMMIT"), 1);
    assert_eq!(count(&script, "ROLLBACK"), 0);
    assert_eq!(count(&script, "CLOSE"), 1);
}
