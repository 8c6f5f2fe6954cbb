//! In-memory connection for engine tests.
//!
//! Serves one fixed result set, answers catalog listings, existence checks
//! and `COUNT(*)` queries from its own bookkeeping, and records every
//! statement, commit and rollback so tests can assert on what the engine did
//! to the store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::identifier::split_qualified;
use crate::core::{ColumnMeta, Connection, Dialect, Row, RowStream, SqlValue, WriteSession};
use crate::drivers::DialectImpl;
use crate::error::{CopyError, Result};

const CATALOG_TABLES: [&str; 5] = [
    "information_schema.tables",
    "sqlite_master",
    "sys.tables",
    "user_tables",
    "all_tables",
];

/// Everything the mock observed.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub queries: Vec<String>,
    /// Autocommit statements (DDL).
    pub executed: Vec<String>,
    /// Statements of committed sessions, in commit order.
    pub committed: Vec<(String, Vec<SqlValue>)>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Statements executed inside sessions, committed or not.
    pub session_statements: usize,
    pub tables: HashSet<String>,
}

impl MockState {
    pub fn inserted_rows(&self) -> Vec<&Vec<SqlValue>> {
        self.committed
            .iter()
            .filter(|(sql, _)| sql.starts_with("INSERT"))
            .map(|(_, params)| params)
            .collect()
    }

    pub fn creates(&self) -> usize {
        self.executed
            .iter()
            .filter(|sql| sql.starts_with("CREATE TABLE"))
            .count()
    }
}

pub(crate) struct MockConnection {
    dialect: DialectImpl,
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
    base_count: Option<i64>,
    fail_query: Option<String>,
    fail_count: bool,
    fail_statement_at: Option<usize>,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new(driver: &str) -> Self {
        Self {
            dialect: DialectImpl::for_driver(driver),
            columns: Vec::new(),
            rows: Vec::new(),
            base_count: None,
            fail_query: None,
            fail_count: false,
            fail_statement_at: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Result set returned for every data query.
    pub fn with_rows(mut self, columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    /// Rows already present before the run; defaults to the served rows.
    pub fn with_count(mut self, count: i64) -> Self {
        self.base_count = Some(count);
        self
    }

    pub fn with_table(self, name: &str) -> Self {
        self.lock().tables.insert(bare_name(name));
        self
    }

    /// Data queries containing `pattern` fail.
    pub fn failing_query(mut self, pattern: &str) -> Self {
        self.fail_query = Some(pattern.to_string());
        self
    }

    pub fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    /// The `n`th statement executed inside a session (1-based) fails.
    pub fn failing_statement_at(mut self, n: usize) -> Self {
        self.fail_statement_at = Some(n);
        self
    }

    pub fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn count(&self) -> i64 {
        let base = self.base_count.unwrap_or(self.rows.len() as i64);
        base + self.lock().inserted_rows().len() as i64
    }
}

fn bare_name(name: &str) -> String {
    split_qualified(name).1.to_lowercase()
}

fn mock_failure(message: &str) -> CopyError {
    CopyError::Io(std::io::Error::other(message.to_string()))
}

#[async_trait]
impl Connection for MockConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream> {
        self.lock().queries.push(sql.to_string());
        let scalar = |value: i64| {
            RowStream::from_rows(
                vec![ColumnMeta::new("count", "BIGINT")],
                vec![vec![SqlValue::I64(value)]],
            )
        };

        if CATALOG_TABLES.iter().any(|t| sql.contains(t)) && !sql.contains("COUNT(*)") {
            let mut names: Vec<String> = self.lock().tables.iter().cloned().collect();
            names.sort();
            return Ok(RowStream::from_rows(
                vec![ColumnMeta::new("table_name", "TEXT")],
                names.into_iter().map(|n| vec![SqlValue::Text(n)]).collect(),
            ));
        }
        if CATALOG_TABLES.iter().any(|t| sql.contains(t)) {
            let name = params.last().and_then(SqlValue::to_text).unwrap_or_default();
            let present = self.lock().tables.contains(&bare_name(&name));
            return Ok(scalar(i64::from(present)));
        }
        if sql.contains("COUNT(*)") {
            if self.fail_count {
                return Err(mock_failure("count failed"));
            }
            return Ok(scalar(self.count()));
        }
        if let Some(pattern) = &self.fail_query {
            if sql.contains(pattern.as_str()) {
                return Err(mock_failure("query failed"));
            }
        }
        Ok(RowStream::from_rows(self.columns.clone(), self.rows.clone()))
    }

    async fn execute(&self, sql: &str, _params: &[SqlValue]) -> Result<u64> {
        let mut state = self.lock();
        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            let name = rest.split(" (").next().unwrap_or(rest);
            state.tables.insert(bare_name(name));
        }
        state.executed.push(sql.to_string());
        Ok(0)
    }

    async fn begin(&self) -> Result<Box<dyn WriteSession>> {
        self.lock().begins += 1;
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            fail_at: self.fail_statement_at,
        }))
    }

    async fn close(&self) {}
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
    pending: Vec<(String, Vec<SqlValue>)>,
    fail_at: Option<usize>,
}

#[async_trait]
impl WriteSession for MockSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let n = {
            let mut state = self.state.lock().unwrap();
            state.session_statements += 1;
            state.session_statements
        };
        if self.fail_at == Some(n) {
            return Err(mock_failure("insert failed"));
        }
        self.pending.push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let session = *self;
        let mut state = session.state.lock().unwrap();
        state.commits += 1;
        state.committed.extend(session.pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}
