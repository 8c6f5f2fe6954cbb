//! Core abstractions shared by the engine and the drivers.
//!
//! - [`value`]: owned SQL values moved between dialects
//! - [`schema`]: result column metadata
//! - [`traits`]: dialect, connection and write-session traits
//! - [`identifier`]: identifier validation and quoting
//! - [`catalog`]: table existence and discovery
//!
//! Driver modules (`drivers/postgres`, `drivers/mysql`, ...) implement the
//! traits; the copy engine depends only on this module.

pub mod catalog;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

#[cfg(test)]
pub(crate) mod mock;

pub use catalog::{list_tables, table_exists, Existence};
pub use schema::ColumnMeta;
pub use traits::{CatalogQuery, Connection, Dialect, PlaceholderStyle, RowStream, WriteSession};
pub use value::{Row, SqlValue};
