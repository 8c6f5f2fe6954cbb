//! Oracle driver.
//!
//! - [`OracleDialect`]: SQL syntax strategy for Oracle
//! - [`OracleConnection`]: ODBC connection served by a dedicated thread
//!
//! The DSN is an ODBC connection string, e.g.
//! `Driver={Oracle 21 ODBC driver};Dbq=//db:1521/ORCL;Uid=app;Pwd=secret`.

mod connection;
mod dialect;

pub use connection::OracleConnection;
pub use dialect::OracleDialect;
