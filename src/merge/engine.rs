//! Delete-then-insert upsert
//!
//! Two plain statements stand in for a native MERGE: rows whose key is in
//! staging are removed from the target, then every staging row is inserted.
//! The staging version of a record always wins.

use crate::warehouse::schema::quote_ident;
use crate::warehouse::{TableSchema, Warehouse, WarehouseError};

/// Rows touched by one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MergeCounts {
    /// Target rows replaced
    pub deleted: u64,
    /// Rows written from staging
    pub inserted: u64,
}

/// Semi-join delete of every target row whose key appears in staging
pub fn delete_matching_sql(target: &TableSchema, staging: &str) -> String {
    let key = quote_ident(target.key());
    let target_name = quote_ident(target.name());
    let staging_name = quote_ident(staging);
    format!(
        "DELETE FROM {target} USING {staging} WHERE {target}.{key} = {staging}.{key}",
        target = target_name,
        staging = staging_name,
        key = key
    )
}

/// Insert every staging row into the target
pub fn insert_all_sql(target: &TableSchema, staging: &str) -> String {
    let columns = target.column_list();
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        quote_ident(target.name()),
        columns,
        columns,
        quote_ident(staging)
    )
}

/// Statement that failed inside `merge`
#[derive(Debug)]
pub struct MergeStepError {
    pub step: &'static str,
    pub source: WarehouseError,
}

/// Run delete-by-key then insert-all inside the caller's transaction
pub async fn merge<W: Warehouse>(
    warehouse: &W,
    target: &TableSchema,
    staging: &str,
) -> Result<MergeCounts, MergeStepError> {
    let deleted = run(warehouse, "delete", &delete_matching_sql(target, staging)).await?;
    let inserted = run(warehouse, "insert", &insert_all_sql(target, staging)).await?;
    Ok(MergeCounts { deleted, inserted })
}

async fn run<W: Warehouse>(
    warehouse: &W,
    step: &'static str,
    sql: &str,
) -> Result<u64, MergeStepError> {
    tracing::debug!("{}", sql);
    warehouse
        .execute(sql)
        .await
        .map_err(|source| MergeStepError { step, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_sql() {
        let target = TableSchema::records("reddit").unwrap();
        assert_eq!(
            delete_matching_sql(&target, "reddit_staging"),
            "DELETE FROM \"reddit\" USING \"reddit_staging\" \
             WHERE \"reddit\".\"id\" = \"reddit_staging\".\"id\""
        );
    }

    #[test]
    fn test_insert_sql_lists_columns() {
        let target = TableSchema::records("reddit").unwrap();
        let sql = insert_all_sql(&target, "reddit_staging");
        assert!(sql.starts_with("INSERT INTO \"reddit\" (\"id\", \"title\""));
        assert!(sql.ends_with("\"stickied\" FROM \"reddit_staging\""));
    }
}
