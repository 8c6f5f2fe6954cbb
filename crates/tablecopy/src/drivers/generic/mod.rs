//! Text-store dialect for SQLite and unrecognized drivers.

mod dialect;

pub use dialect::GenericDialect;
