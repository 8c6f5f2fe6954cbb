//! Database driver implementations.
//!
//! - [`generic`]: text-store dialect (SQLite and unrecognized drivers)
//! - [`sqlite`]: SQLite connections via sqlx
//! - [`mysql`]: MySQL/MariaDB via sqlx
//! - [`postgres`]: PostgreSQL via tokio-postgres + deadpool
//! - [`mssql`]: SQL Server via tiberius + bb8
//! - [`oracle`]: Oracle via ODBC
//! - [`common`]: shared utilities (TLS, pool sizing)
//!
//! # Architecture
//!
//! Each driver module provides a `Dialect` (SQL syntax strategy) and a
//! `Connection` (pooled store handle). [`DialectImpl`] selects the dialect
//! once per driver; [`connect`] opens and health-checks a connection.

pub mod common;
pub mod generic;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;

use std::fmt;

use tracing::info;

pub use generic::GenericDialect;
pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

use crate::core::traits::{CatalogQuery, Connection, Dialect, PlaceholderStyle};
use crate::error::{CopyError, Result};
use crate::typemap::TypeFamily;

/// Database families with a dedicated connection implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Sqlite,
    Mysql,
    Postgres,
    SqlServer,
    Oracle,
}

impl DriverKind {
    /// Parse a driver tag, accepting common aliases.
    pub fn parse(driver: &str) -> Option<Self> {
        match normalize_driver(driver).as_str() {
            "sqlite" => Some(DriverKind::Sqlite),
            "mysql" => Some(DriverKind::Mysql),
            "postgres" => Some(DriverKind::Postgres),
            "sqlserver" => Some(DriverKind::SqlServer),
            "oracle" => Some(DriverKind::Oracle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Mysql => "mysql",
            DriverKind::Postgres => "postgres",
            DriverKind::SqlServer => "sqlserver",
            DriverKind::Oracle => "oracle",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase and trim a driver tag and collapse aliases onto one name.
pub fn normalize_driver(driver: &str) -> String {
    let d = driver.trim().to_lowercase();
    match d.as_str() {
        "mssql" | "sql_server" | "sqlserver" => "sqlserver".to_string(),
        "postgresql" | "pg" | "pgx" | "postgres" => "postgres".to_string(),
        "sqlite3" | "sqlite" => "sqlite".to_string(),
        "mariadb" | "mysql" => "mysql".to_string(),
        "oci8" | "godror" | "oracle" => "oracle".to_string(),
        _ => d,
    }
}

/// Enum-based static dispatch for dialects.
///
/// We use a manual impl instead of a dispatch macro; the compiler generates
/// a match statement instead of a vtable call.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Generic(GenericDialect),
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
    Mssql(MssqlDialect),
    Oracle(OracleDialect),
}

macro_rules! dispatch {
    ($self:expr, $d:ident => $body:expr) => {
        match $self {
            DialectImpl::Generic($d) => $body,
            DialectImpl::Mysql($d) => $body,
            DialectImpl::Postgres($d) => $body,
            DialectImpl::Mssql($d) => $body,
            DialectImpl::Oracle($d) => $body,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        dispatch!(self, d => d.placeholder_style())
    }

    fn ddl_type(&self, family: &TypeFamily) -> String {
        dispatch!(self, d => d.ddl_type(family))
    }

    fn unbounded_text_type(&self) -> &str {
        dispatch!(self, d => d.unbounded_text_type())
    }

    fn row_size_limit(&self) -> Option<usize> {
        dispatch!(self, d => d.row_size_limit())
    }

    fn existence_query(&self, table: &str) -> Option<CatalogQuery> {
        dispatch!(self, d => d.existence_query(table))
    }

    fn list_tables_query(&self, schema: Option<&str>) -> CatalogQuery {
        dispatch!(self, d => d.list_tables_query(schema))
    }

    fn derived_table_alias(&self, alias: &str) -> String {
        dispatch!(self, d => d.derived_table_alias(alias))
    }
}

impl DialectImpl {
    /// Select the dialect for a driver tag.
    ///
    /// Unrecognized tags get the generic dialect rather than an error, so SQL
    /// for them can still be planned.
    pub fn for_driver(driver: &str) -> Self {
        match DriverKind::parse(driver) {
            Some(DriverKind::Sqlite) => DialectImpl::Generic(GenericDialect::sqlite()),
            Some(DriverKind::Mysql) => DialectImpl::Mysql(MysqlDialect::new()),
            Some(DriverKind::Postgres) => DialectImpl::Postgres(PostgresDialect::new()),
            Some(DriverKind::SqlServer) => DialectImpl::Mssql(MssqlDialect::new()),
            Some(DriverKind::Oracle) => DialectImpl::Oracle(OracleDialect::new()),
            None => DialectImpl::Generic(GenericDialect::fallback(normalize_driver(driver))),
        }
    }
}

/// Open a pooled connection and health-check it.
///
/// # Errors
///
/// Returns [`CopyError::Connection`] for unknown drivers, unreachable stores
/// and failed liveness checks.
pub async fn connect(driver: &str, dsn: &str) -> Result<Box<dyn Connection>> {
    let kind = DriverKind::parse(driver).ok_or_else(|| {
        CopyError::connection(
            driver,
            "unsupported driver (supported: sqlite, mysql, postgres, sqlserver, oracle)",
        )
    })?;

    let conn: Box<dyn Connection> = match kind {
        DriverKind::Sqlite => Box::new(sqlite::SqliteConnection::open(dsn).await?),
        DriverKind::Mysql => Box::new(mysql::MysqlConnection::open(dsn).await?),
        DriverKind::Postgres => Box::new(postgres::PostgresConnection::open(dsn).await?),
        DriverKind::SqlServer => Box::new(mssql::MssqlConnection::open(dsn).await?),
        DriverKind::Oracle => Box::new(oracle::OracleConnection::open(dsn).await?),
    };

    match tokio::time::timeout(common::HEALTH_CHECK_TIMEOUT, conn.ping()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            conn.close().await;
            return Err(CopyError::connection(kind.as_str(), e));
        }
        Err(_) => {
            conn.close().await;
            return Err(CopyError::connection(
                kind.as_str(),
                format!(
                    "health check timed out after {}s",
                    common::HEALTH_CHECK_TIMEOUT.as_secs()
                ),
            ));
        }
    }

    info!("Connected to {}", kind);
    Ok(conn)
}
