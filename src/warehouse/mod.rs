//! Warehouse loading: stage every table, then promote them in one step.
//!
//! Live tables are only touched by [`TableSink::commit`]. Anything that goes
//! wrong before that leaves the previous contents in place.
use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{LoadReport, Snapshot};

pub mod schema;
pub mod snowflake;
pub mod sqlite;

pub use schema::{rows_of, Cell, ColumnType, Dialect, Row, TableRow, TableSchema, PRODUCT_LEVEL, WAREHOUSE_LEVEL};
pub use snowflake::{SnowflakeClient, SnowflakeSink};
pub use sqlite::SqliteSink;

/// Tables written by every run, in staging/commit order.
pub static TABLES: [&TableSchema; 2] = [&PRODUCT_LEVEL, &WAREHOUSE_LEVEL];

#[async_trait]
pub trait TableSink: Send + Sync {
    /// Replace the staging twin of `table` with `rows`. Returns rows written.
    async fn stage(&self, table: &TableSchema, rows: &[Row]) -> Result<usize>;

    /// Promote staged tables over the live ones.
    async fn commit(&self, tables: &[&TableSchema]) -> Result<()>;

    /// Drop staging twins, if any.
    async fn discard(&self, tables: &[&TableSchema]) -> Result<()>;
}

async fn stage_records<S, T>(sink: &S, records: &[T]) -> Result<usize>
where
    S: TableSink + ?Sized,
    T: TableRow,
{
    let table = T::schema();
    let staged = sink.stage(table, &rows_of(records)).await?;
    info!(table = table.name, rows = staged, "staged");
    Ok(staged)
}

async fn stage_all<S>(sink: &S, snapshot: &Snapshot) -> Result<LoadReport>
where
    S: TableSink + ?Sized,
{
    Ok(LoadReport {
        product_rows: stage_records(sink, &snapshot.products).await?,
        warehouse_rows: stage_records(sink, &snapshot.inventory).await?,
    })
}

/// Full refresh of both destination tables from `snapshot`.
pub async fn load<S>(sink: &S, snapshot: &Snapshot) -> Result<LoadReport>
where
    S: TableSink + ?Sized,
{
    let outcome = match stage_all(sink, snapshot).await {
        Ok(report) => sink.commit(&TABLES).await.map(|_| report),
        Err(err) => Err(err),
    };
    match outcome {
        Ok(report) => {
            info!(
                product_rows = report.product_rows,
                warehouse_rows = report.warehouse_rows,
                "committed"
            );
            Ok(report)
        }
        Err(err) => {
            if let Err(cleanup) = sink.discard(&TABLES).await {
                warn!(error = %cleanup, "failed to drop staging tables");
            }
            Err(err)
        }
    }
}
