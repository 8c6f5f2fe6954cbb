//! Error types for the replication library.

use thiserror::Error;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid JSON/YAML, missing fields, duplicate mappings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening or health-checking a connection failed
    #[error("Connection error ({driver}): {message}")]
    Connection { driver: String, message: String },

    /// A job could not be planned (empty names, empty column list, bad DDL input)
    #[error("Planning failed for table {table}: {message}")]
    Planning { table: String, message: String },

    /// Reading from the source failed
    #[error("Extraction failed for table {table}: {message}")]
    Extraction { table: String, message: String },

    /// Writing to the target failed (DDL, insert or commit)
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// MySQL / SQLite driver error
    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// ODBC driver error
    #[error("ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// A value could not be converted to the type a driver expects
    #[error("Value conversion error: {0}")]
    Value(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON configuration or output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid include/exclude pattern
    #[error("Invalid table filter: {0}")]
    Regex(#[from] regex::Error),

    /// Run was cancelled between tables (SIGINT, etc.)
    #[error("Run cancelled")]
    Cancelled,
}

impl CopyError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        CopyError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    pub fn connection(driver: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Connection {
            driver: driver.into(),
            message: message.to_string(),
        }
    }

    pub fn planning(table: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Planning {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn extraction(table: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Extraction {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn write(table: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Write {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::Yaml(_) | CopyError::Json(_) | CopyError::Regex(_) => 1,
            CopyError::Connection { .. } | CopyError::Pool { .. } => 2,
            CopyError::Planning { .. } => 3,
            CopyError::Extraction { .. } => 4,
            CopyError::Write { .. } => 5,
            CopyError::Cancelled => 6,
            CopyError::Io(_) => 7,
            _ => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;
