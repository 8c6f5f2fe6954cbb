//! Common utilities shared across database drivers.
//!
//! - [`tls`]: TLS configuration for PostgreSQL connections
//! - pool sizing and row streaming constants used by every driver

use std::time::Duration;

pub mod tls;

pub use tls::{connector, SslMode};

/// Maximum open connections per pool.
pub const MAX_POOL_SIZE: u32 = 10;

/// Lifetime of a pooled connection.
pub const POOL_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Bound on the liveness check run when a pool is opened.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows per chunk sent from a driver cursor to the copy engine.
pub const ROW_CHUNK_SIZE: usize = 256;

/// Chunks buffered between a driver cursor and the copy engine.
pub const ROW_CHANNEL_DEPTH: usize = 4;
