//! Catalog lookups: table existence and table discovery.

use serde::Serialize;
use tracing::debug;

use crate::error::Result;

use super::traits::Connection;

/// Outcome of a table-existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Existence {
    Present,
    Absent,
    /// The lookup itself failed.
    Unknown(String),
}

/// Look up `table` in the target catalog.
///
/// Query errors never propagate; they become [`Existence::Unknown`].
pub async fn table_exists(conn: &dyn Connection, table: &str) -> Existence {
    let dialect = conn.dialect();
    let outcome = match dialect.existence_query(table) {
        Some(lookup) => conn
            .query_scalar_i64(&lookup.sql, &lookup.params)
            .await
            .map(|count| {
                if count.unwrap_or(0) > 0 {
                    Existence::Present
                } else {
                    Existence::Absent
                }
            }),
        None => {
            let sql = format!("SELECT 1 FROM {} LIMIT 1", dialect.quote_ident(table));
            conn.query(&sql, &[]).await.map(|_| Existence::Present)
        }
    };

    match outcome {
        Ok(existence) => existence,
        Err(e) => {
            debug!("Existence check for {} failed: {}", table, e);
            Existence::Unknown(e.to_string())
        }
    }
}

/// Base tables visible to the connection, optionally within `schema`.
pub async fn list_tables(conn: &dyn Connection, schema: Option<&str>) -> Result<Vec<String>> {
    let schema = schema.map(str::trim).filter(|s| !s.is_empty());
    let query = conn.dialect().list_tables_query(schema);
    conn.query_strings(&query.sql, &query.params).await
}
