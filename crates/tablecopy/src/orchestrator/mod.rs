//! Run orchestrator: connects both stores and runs the jobs in order.
//!
//! Jobs run one at a time. The first failing job ends the run; batches it
//! committed before failing remain in the target. Cancellation is checked
//! between tables only.

mod events;
mod filter;

pub use events::{CopyEvent, EventSink};
pub use filter::TableFilter;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RunPlan;
use crate::core::{list_tables, Connection};
use crate::drivers;
use crate::error::{CopyError, Result};
use crate::pipeline::{JobSource, TableJob};
use crate::transfer::TransferEngine;
use crate::verify::RunSummary;

/// Migration orchestrator.
pub struct Orchestrator {
    plan: RunPlan,
    source: Arc<dyn Connection>,
    target: Arc<dyn Connection>,
    events: EventSink,
}

impl Orchestrator {
    /// Connect and health-check both endpoints.
    ///
    /// # Errors
    ///
    /// [`CopyError::Connection`] when either side cannot be opened; nothing
    /// is copied in that case.
    pub async fn new(plan: RunPlan) -> Result<Self> {
        info!(
            "Connecting to source {} ({})",
            plan.source.driver,
            plan.source.redacted_dsn()
        );
        let source: Arc<dyn Connection> =
            Arc::from(drivers::connect(&plan.source.driver, &plan.source.dsn).await?);

        info!(
            "Connecting to target {} ({})",
            plan.target.driver,
            plan.target.redacted_dsn()
        );
        let target: Arc<dyn Connection> =
            match drivers::connect(&plan.target.driver, &plan.target.dsn).await {
                Ok(conn) => Arc::from(conn),
                Err(e) => {
                    source.close().await;
                    return Err(e);
                }
            };

        Ok(Self::with_connections(plan, source, target))
    }

    /// Use connections that are already open.
    pub fn with_connections(
        plan: RunPlan,
        source: Arc<dyn Connection>,
        target: Arc<dyn Connection>,
    ) -> Self {
        Self {
            plan,
            source,
            target,
            events: EventSink::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Ping both stores.
    pub async fn health_check(&self) -> Result<()> {
        self.source
            .ping()
            .await
            .map_err(|e| CopyError::connection(&self.plan.source.driver, e))?;
        self.target
            .ping()
            .await
            .map_err(|e| CopyError::connection(&self.plan.target.driver, e))?;
        info!("Source and target are reachable");
        Ok(())
    }

    /// Base tables on the source, optionally within `schema`.
    pub async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<String>> {
        list_tables(self.source.as_ref(), schema).await
    }

    /// Explicit jobs followed by discovered ones, with the plan's dry-run
    /// flag applied.
    pub async fn resolve_jobs(&self) -> Result<Vec<TableJob>> {
        let mut jobs = self.plan.jobs.clone();

        if let Some(discovery) = &self.plan.discovery {
            let filter = TableFilter::new(&discovery.include, &discovery.exclude)?;
            let names = self
                .list_tables(discovery.schema.as_deref())
                .await
                .map_err(|e| CopyError::extraction("table discovery", e))?;

            let listed: HashSet<&str> = self
                .plan
                .jobs
                .iter()
                .filter_map(|job| match &job.source {
                    JobSource::Table(table) => Some(table.as_str()),
                    JobSource::Query(_) => None,
                })
                .collect();

            let discovered: Vec<TableJob> = names
                .iter()
                .filter(|name| !listed.contains(name.as_str()))
                .filter(|name| filter.matches(name))
                .map(|name| discovery.job_for(name))
                .collect();
            info!(
                "Discovered {} tables on the source, {} selected",
                names.len(),
                discovered.len()
            );
            jobs.extend(discovered);
        }

        if self.plan.dry_run {
            for job in &mut jobs {
                job.dry_run = true;
            }
        }
        Ok(jobs)
    }

    /// Run every job in order.
    pub async fn run(&self, cancel: Option<CancellationToken>) -> Result<RunSummary> {
        let cancel = cancel.unwrap_or_default();
        let started_at = Utc::now();

        let jobs = self.resolve_jobs().await?;
        info!(
            "Starting run: {} tables{}",
            jobs.len(),
            if self.plan.dry_run { " (dry-run)" } else { "" }
        );
        self.events.emit(CopyEvent::RunStarted {
            tables: jobs.len(),
            dry_run: self.plan.dry_run,
            started_at,
        });

        let engine = TransferEngine::new(Arc::clone(&self.source), Arc::clone(&self.target))
            .with_row_policy(self.plan.row_policy)
            .with_events(self.events.clone());

        let mut results = Vec::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "Run cancelled after {} of {} tables",
                    results.len(),
                    jobs.len()
                );
                return Err(CopyError::Cancelled);
            }

            info!("[{}/{}] {}", i + 1, jobs.len(), job.label());
            match engine.execute(job).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("{}: {}", job.label(), e);
                    self.events.emit(CopyEvent::TableFailed {
                        table: job.label().to_string(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        let summary = RunSummary::new(results, started_at, Utc::now());
        if summary.incomplete {
            warn!("Some row counts were unavailable; totals exclude them");
        }
        info!(
            "Run finished: {} tables, {} rows in {:.1}s",
            summary.tables.len(),
            summary.total_migrated,
            summary.elapsed_secs()
        );
        self.events.emit(CopyEvent::RunFinished {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Release both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
