//! Core traits for dialect-agnostic table copying.
//!
//! - [`Dialect`]: SQL syntax strategy for one database family
//! - [`Connection`]: a pooled, health-checked handle to one store
//! - [`WriteSession`]: one open write transaction on a target
//!
//! Drivers implement these; the copy engine only talks to the traits, which
//! lets the engine run against an in-memory connection in tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::typemap::TypeFamily;

use super::schema::ColumnMeta;
use super::value::{Row, SqlValue};

/// Placeholder families used by the supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` at every position.
    Positional,
    /// `$1`, `$2`, ...
    Dollar,
    /// `:1`, `:2`, ...
    Colon,
    /// `@P1`, `@P2`, ...
    At,
}

impl PlaceholderStyle {
    /// Token for a 1-based parameter position.
    pub fn token(self, index: usize) -> String {
        match self {
            PlaceholderStyle::Positional => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${}", index),
            PlaceholderStyle::Colon => format!(":{}", index),
            PlaceholderStyle::At => format!("@P{}", index),
        }
    }
}

/// A catalog statement plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl CatalogQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// SQL dialect strategy.
///
/// One instance exists per distinct driver and is shared read-only by every
/// job that emits SQL for that driver.
pub trait Dialect: Send + Sync {
    /// Normalized driver tag (e.g., "postgres", "sqlserver").
    fn name(&self) -> &str;

    /// Quote an identifier. Input that is already quoted is returned unchanged.
    fn quote_ident(&self, name: &str) -> String;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Placeholder token for a 1-based parameter position.
    fn param_placeholder(&self, index: usize) -> String {
        self.placeholder_style().token(index)
    }

    /// DDL type for a classified source type.
    fn ddl_type(&self, family: &TypeFamily) -> String;

    /// The dialect's unbounded character type.
    fn unbounded_text_type(&self) -> &str;

    /// Maximum row width in bytes when bounded character columns count
    /// against it.
    fn row_size_limit(&self) -> Option<usize> {
        None
    }

    /// Catalog query for a table in the connection's current schema.
    ///
    /// `None` means the dialect has no catalog and the caller falls back to
    /// selecting a single row from the table.
    fn existence_query(&self, table: &str) -> Option<CatalogQuery>;

    /// Catalog query listing base tables, optionally scoped to a schema/owner.
    fn list_tables_query(&self, schema: Option<&str>) -> CatalogQuery;

    /// Alias clause for a derived table in a FROM list.
    fn derived_table_alias(&self, alias: &str) -> String {
        format!("AS {}", alias)
    }
}

/// Result rows streamed from a source query.
///
/// Column metadata is available before the first row is fetched. Rows arrive
/// in chunks through a bounded channel filled by the driver.
pub struct RowStream {
    pub columns: Vec<ColumnMeta>,
    rows: mpsc::Receiver<Result<Vec<Row>>>,
}

impl RowStream {
    pub fn new(columns: Vec<ColumnMeta>, rows: mpsc::Receiver<Result<Vec<Row>>>) -> Self {
        Self { columns, rows }
    }

    /// A stream over rows that are already in memory.
    pub fn from_rows(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        if !rows.is_empty() {
            let _ = tx.try_send(Ok(rows));
        }
        Self::new(columns, rx)
    }

    /// Next chunk of rows, or `None` once the cursor is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<Vec<Row>>> {
        self.rows.recv().await
    }

    /// Drain the stream into memory.
    pub async fn collect(mut self) -> Result<Vec<Row>> {
        let mut all = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            all.extend(chunk?);
        }
        Ok(all)
    }
}

/// A live, pooled connection to one store.
#[async_trait]
pub trait Connection: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// Liveness check.
    async fn ping(&self) -> Result<()>;

    /// Run a query and stream its rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream>;

    /// Run a statement outside any explicit transaction (autocommit).
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Open a write transaction.
    async fn begin(&self) -> Result<Box<dyn WriteSession>>;

    /// Release pooled resources.
    async fn close(&self);

    /// First column of the first row as an integer.
    async fn query_scalar_i64(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>> {
        let rows = self.query(sql, params).await?.collect().await?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::to_i64))
    }

    /// First column of every row as text.
    async fn query_strings(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<String>> {
        let rows = self.query(sql, params).await?.collect().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.to_text()))
            .collect())
    }
}

/// One open write transaction.
///
/// Dropping a session without calling [`WriteSession::commit`] rolls it back.
#[async_trait]
pub trait WriteSession: Send {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_tokens() {
        assert_eq!(PlaceholderStyle::Positional.token(3), "?");
        assert_eq!(PlaceholderStyle::Dollar.token(3), "$3");
        assert_eq!(PlaceholderStyle::Colon.token(1), ":1");
        assert_eq!(PlaceholderStyle::At.token(12), "@P12");
    }

    #[test]
    fn test_catalog_query_bind() {
        let q = CatalogQuery::new("SELECT 1 WHERE a = ?").bind("x").bind(2i64);
        assert_eq!(q.params, vec![SqlValue::Text("x".into()), SqlValue::I64(2)]);
    }

    #[tokio::test]
    async fn test_row_stream_from_rows() {
        let cols = vec![ColumnMeta::new("id", "INTEGER")];
        let stream = RowStream::from_rows(cols, vec![vec![SqlValue::I64(1)], vec![SqlValue::I64(2)]]);
        assert_eq!(stream.columns[0].name, "id");
        assert_eq!(stream.collect().await.unwrap().len(), 2);

        let empty = RowStream::from_rows(vec![], vec![]);
        assert!(empty.collect().await.unwrap().is_empty());
    }
}
