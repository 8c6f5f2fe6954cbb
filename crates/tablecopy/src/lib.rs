//! # tablecopy
//!
//! Cross-dialect SQL table replication.
//!
//! Copies tables (or the rows of a custom SELECT) between SQLite, MySQL,
//! PostgreSQL, SQL Server and Oracle with:
//!
//! - **Auto-create** of missing target tables from source column metadata
//! - **Column mapping** with renames, type, nullability and default overrides
//! - **Incremental** extraction bounded by a watermark column
//! - **Batched commits** with rollback of the open batch on failure
//! - **Row-count reconciliation** per table and per run
//!
//! ## Example
//!
//! ```rust,no_run
//! use tablecopy::{Config, Orchestrator};
//!
//! # async fn run() -> tablecopy::Result<()> {
//! let plan = Config::load("config.json")?.resolve()?;
//! let orchestrator = Orchestrator::new(plan).await?;
//! let summary = orchestrator.run(None).await?;
//! println!("Copied {} rows", summary.total_migrated);
//! orchestrator.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod transfer;
pub mod typemap;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, Endpoint, RunPlan};
pub use core::{ColumnMeta, Connection, Dialect, Existence, SqlValue, WriteSession};
pub use drivers::{connect, normalize_driver, DialectImpl, DriverKind};
pub use error::{CopyError, Result};
pub use orchestrator::{CopyEvent, EventSink, Orchestrator, TableFilter};
pub use pipeline::{ColumnMapping, IncrementalFilter, JobSource, TableJob};
pub use transfer::TransferEngine;
pub use typemap::RowSizePolicy;
pub use verify::{CopyResult, Reconciliation, RowCount, RunSummary};
