//! Durable store plumbing shared by the load and analyze stages.
//!
//! Wraps connection setup, schema-qualified identifier handling, and the
//! classification of store failures into transient vs. permanent.

use std::error::Error as StdError;
use std::fmt;
use tokio_postgres::{Client, NoTls};
use tracing::warn;

/// A validated `schema.table` identifier.
///
/// Both parts are restricted to `[A-Za-z_][A-Za-z0-9_]*` so they can be
/// safely embedded in generated SQL after quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdent {
    schema: String,
    table: String,
}

impl TableIdent {
    /// Parse a `schema.table` string, rejecting anything that is not two
    /// dot-separated plain identifiers.
    pub fn parse(raw: &str) -> Option<Self> {
        let (schema, table) = raw.split_once('.')?;
        if !is_plain_ident(schema) || !is_plain_ident(table) {
            return None;
        }
        Some(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// The schema part, unquoted.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The table part, unquoted.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The sibling staging table rows are bulk-inserted into before the swap.
    pub fn staging(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            table: format!("{}__staging", self.table),
        }
    }

    /// The fully qualified, quoted form for embedding in SQL.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// The quoted table name alone (rename targets must be unqualified).
    pub fn quoted_table(&self) -> String {
        quote_ident(&self.table)
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quote an identifier for SQL, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Connect to the warehouse and drive the connection in a background task.
pub async fn connect(url: &str) -> Result<Client, tokio_postgres::Error> {
    let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("Warehouse connection task ended with error: {e}");
        }
    });
    Ok(client)
}

/// Check whether a store failure is transient (worth retrying).
///
/// Transient means the connection dropped, an I/O-level failure, or a
/// SQLSTATE in the connection-exception, insufficient-resources, or
/// operator-intervention classes.
pub fn is_transient(err: &tokio_postgres::Error) -> bool {
    if err.is_closed() {
        return true;
    }
    match err.code() {
        Some(state) => {
            let code = state.code();
            code.starts_with("08") || code.starts_with("53") || code.starts_with("57")
        }
        None => has_io_source(err),
    }
}

fn has_io_source(err: &tokio_postgres::Error) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if e.downcast_ref::<std::io::Error>().is_some() {
            return true;
        }
        source = e.source();
    }
    false
}
