//! Structured progress events.
//!
//! The engine reports progress only through these events; rendering them is
//! left to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::SqlValue;
use crate::verify::{CopyResult, RunSummary};

/// One progress event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CopyEvent {
    RunStarted {
        tables: usize,
        dry_run: bool,
        started_at: DateTime<Utc>,
    },
    TableStarted {
        table: String,
        target: String,
    },
    DdlPlanned {
        table: String,
        ddl: String,
        executed: bool,
    },
    BatchCommitted {
        table: String,
        rows_in_batch: u64,
        total_rows: u64,
    },
    /// Dry-run only.
    SampleRow {
        table: String,
        index: usize,
        values: Vec<SqlValue>,
    },
    TableFinished {
        result: CopyResult,
    },
    TableFailed {
        table: String,
        error: String,
    },
    RunFinished {
        summary: RunSummary,
    },
}

/// Optional sending half of the event channel.
///
/// Sends never block and a closed receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<CopyEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<CopyEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create a sink together with its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CopyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: CopyEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
