//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresConnection`]: deadpool-managed tokio-postgres connection
//!
//! Both URL (`postgres://...`) and keyword (`host=... dbname=...`) DSNs are
//! accepted; `sslmode` selects the TLS behavior (see [`SslMode`]).
//!
//! [`SslMode`]: crate::drivers::common::SslMode

mod connection;
mod dialect;

pub use connection::PostgresConnection;
pub use dialect::PostgresDialect;
