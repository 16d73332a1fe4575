//! Target table provisioning and the session-scoped staging table

use crate::warehouse::{TableSchema, Warehouse, WarehouseResult, schema::quote_ident};

/// Create the target table if it is absent; never alters an existing one
pub async fn ensure_table<W: Warehouse>(warehouse: &W, table: &TableSchema) -> WarehouseResult<()> {
    let sql = table.create_table_sql(warehouse.dialect());
    tracing::debug!("{}", sql);
    warehouse.execute(&sql).await?;
    Ok(())
}

/// Handle on a staging table created in the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTable {
    name: String,
}

impl StagingTable {
    /// Create `target`'s staging mirror in the current session
    pub async fn create<W: Warehouse>(warehouse: &W, target: &TableSchema) -> WarehouseResult<Self> {
        let name = target.staging_name();
        let sql = target.create_staging_sql(&name, warehouse.dialect());
        tracing::debug!("{}", sql);
        warehouse.execute(&sql).await?;
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop the staging table
    ///
    /// Only needed on the success path; a rolled-back or closed session
    /// discards it anyway.
    pub async fn drop_table<W: Warehouse>(self, warehouse: &W) -> WarehouseResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(&self.name));
        tracing::debug!("{}", sql);
        warehouse.execute(&sql).await?;
        Ok(())
    }
}
