//! SQLite driver.
//!
//! Uses the generic dialect; connections are pooled through sqlx.

mod connection;

pub use connection::SqliteConnection;
