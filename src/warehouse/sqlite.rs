//! SQLite sink: local dry-run target and the in-process stand-in for tests.
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::query::Query;
use sqlx::{Sqlite, SqlitePool};
use tracing::instrument;

use super::schema::{Cell, Dialect, Row, TableSchema};
use super::TableSink;
use crate::error::Result;

/// SQLite caps bound parameters per statement; stay well below the limit.
const MAX_PARAMS: usize = 900;

#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Open (creating if needed) the database at `url`, which may be a bare
    /// path, a `sqlite:` URL or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let normalized = prepare_sqlite_url(url);
        // A single connection: one writer, and in-memory databases survive
        // only as long as their connection does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&normalized)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Accept bare paths, expand a leading `~/` and make sure the parent
/// directory exists. In-memory URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }
    let rest = url.strip_prefix("sqlite:").unwrap_or(url);
    let rest = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // mode=rwc lets sqlx create the file on first use.
    let query = query_part.unwrap_or("mode=rwc");
    format!("sqlite://{}?{}", expanded_path, query)
}

fn bind_cell<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    cell: &'q Cell,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match cell {
        Cell::Null => query.bind(None::<String>),
        Cell::Int(v) => query.bind(*v),
        Cell::Decimal(v) => query.bind(*v),
        Cell::Text(v) => query.bind(v.as_str()),
        Cell::Bool(v) => query.bind(*v),
        Cell::Timestamp(v) => query.bind(*v),
    }
}

#[async_trait]
impl TableSink for SqliteSink {
    #[instrument(skip_all, fields(table = table.name))]
    async fn stage(&self, table: &TableSchema, rows: &[Row]) -> Result<usize> {
        let staging = table.staging_name();
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {staging}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {staging} {}",
            table.definition(Dialect::Sqlite)
        ))
        .execute(&mut *tx)
        .await?;

        let rows_per_insert = (MAX_PARAMS / table.columns.len()).max(1);
        for chunk in rows.chunks(rows_per_insert) {
            let sql = table.insert_sql(&staging, chunk.len());
            let mut query = sqlx::query(&sql);
            for cell in chunk.iter().flatten() {
                query = bind_cell(query, cell);
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    #[instrument(skip_all)]
    async fn commit(&self, tables: &[&TableSchema]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in tables {
            let live = table.name;
            let staging = table.staging_name();
            sqlx::query(&format!("DROP TABLE IF EXISTS {live}"))
                .execute(&mut *tx)
                .await?;
            sqlx::query(&format!("ALTER TABLE {staging} RENAME TO {live}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn discard(&self, tables: &[&TableSchema]) -> Result<()> {
        for table in tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table.staging_name()))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
