//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for SQL Server
//! - [`MssqlConnection`]: bb8-managed tiberius connection
//!
//! ADO.NET strings, JDBC strings and `sqlserver://` URLs are accepted.

mod connection;
mod dialect;

pub use connection::{parse_config, MssqlConnection};
pub use dialect::MssqlDialect;
