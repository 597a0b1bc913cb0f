//! Loading the merged snapshot into the warehouse.
//!
//! Replaces the destination table contents in a single transaction: rows are
//! bulk-inserted into a staging sibling, then the staging table is swapped in
//! for the live one. A failed load rolls back and leaves the previous table
//! contents untouched.

use snafu::prelude::*;
use std::path::Path;
use tokio_postgres::types::ToSql;
use tracing::{info, warn};

use crate::config::WarehouseConfig;
use crate::emit;
use crate::error::{ConnectionSnafu, LoadError, MissingSnapshotSnafu, SnapshotError};
use crate::metrics::events::RowsLoaded;
use crate::snapshot;
use crate::warehouse::{self, TableIdent, quote_ident};

/// Result of one load into the warehouse.
#[derive(Debug)]
pub struct LoadReport {
    /// The replaced destination table.
    pub table: TableIdent,
    /// Rows the table now holds.
    pub rows: usize,
}

/// Replaces the destination table with the merged snapshot contents.
pub struct Loader {
    url: String,
    table: TableIdent,
}

impl Loader {
    /// Create a loader for the configured warehouse destination.
    pub fn new(config: &WarehouseConfig, table: TableIdent) -> Self {
        Self {
            url: config.url.clone(),
            table,
        }
    }

    /// Load the merged snapshot at `input` into the destination table.
    ///
    /// An empty snapshot still swaps in an empty table: the destination
    /// always reflects the run that produced it, never a stale previous run.
    pub async fn run(&self, input: &Path) -> Result<LoadReport, LoadError> {
        let (columns, rows) = match snapshot::read_rows(input).await {
            Ok(table) => table,
            Err(SnapshotError::Open { ref source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return MissingSnapshotSnafu { path: input }.fail();
            }
            Err(source) => return Err(LoadError::ReadSnapshot { source }),
        };
        if rows.is_empty() {
            warn!("Merged snapshot {} holds no rows", input.display());
        }

        let mut client = warehouse::connect(&self.url)
            .await
            .context(ConnectionSnafu)?;

        let create_schema = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(self.table.schema())
        );
        client
            .execute(&create_schema, &[])
            .await
            .map_err(classify)?;

        let staging = self.table.staging();
        let transaction = client.transaction().await.map_err(classify)?;
        transaction
            .execute(
                &format!("DROP TABLE IF EXISTS {}", staging.qualified()),
                &[],
            )
            .await
            .map_err(classify)?;
        transaction
            .execute(&create_table_sql(&staging, &columns), &[])
            .await
            .map_err(classify)?;

        let statement = transaction
            .prepare(&insert_sql(&staging, &columns))
            .await
            .map_err(classify)?;
        for row in &rows {
            let values: Vec<Option<&str>> = row
                .iter()
                .map(|v| (!v.is_empty()).then_some(v.as_str()))
                .collect();
            let params: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .map(|v| v as &(dyn ToSql + Sync))
                .collect();
            transaction
                .execute(&statement, &params)
                .await
                .map_err(classify)?;
        }

        transaction
            .execute(
                &format!("DROP TABLE IF EXISTS {}", self.table.qualified()),
                &[],
            )
            .await
            .map_err(classify)?;
        transaction
            .execute(
                &format!(
                    "ALTER TABLE {} RENAME TO {}",
                    staging.qualified(),
                    self.table.quoted_table()
                ),
                &[],
            )
            .await
            .map_err(classify)?;
        transaction.commit().await.map_err(classify)?;

        info!("Loaded {} rows into {}", rows.len(), self.table);
        emit!(RowsLoaded {
            count: rows.len() as u64,
        });

        Ok(LoadReport {
            table: self.table.clone(),
            rows: rows.len(),
        })
    }
}

/// All columns are TEXT. Empty snapshot values are inserted as NULL, so
/// typed reads go through casts like `NULLIF(col, '')::numeric`.
fn create_table_sql(table: &TableIdent, columns: &[String]) -> String {
    let column_defs = columns
        .iter()
        .map(|c| format!("{} TEXT", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", table.qualified(), column_defs)
}

fn insert_sql(table: &TableIdent, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        table.qualified()
    )
}

/// Split store failures into retry-favorable connection errors and
/// permanent load failures.
fn classify(err: tokio_postgres::Error) -> LoadError {
    if warehouse::is_transient(&err) {
        LoadError::ConnectionError { source: err }
    } else {
        LoadError::LoadFailure { source: err }
    }
}
