//! Batched transactional copy of one table.
//!
//! A job moves through `count source -> extract -> ensure DDL -> write ->
//! count target`. Rows are written with one parameterized INSERT each inside
//! a write session that is committed every `batch_size` rows. Any extraction
//! or write error rolls back the open session and fails the job; batches
//! committed before the failure stay in the target.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::{table_exists, ColumnMeta, Connection, Existence, RowStream, SqlValue, WriteSession};
use crate::error::{CopyError, Result};
use crate::orchestrator::{CopyEvent, EventSink};
use crate::pipeline::{synthesize_ddl, QueryPlan, TableJob};
use crate::typemap::RowSizePolicy;
use crate::verify::{count_rows, CopyResult};

/// Rows logged and emitted as samples in dry-run mode.
const DRY_RUN_SAMPLE_ROWS: usize = 5;

/// Transfer engine for executing table jobs against one source and one
/// target.
pub struct TransferEngine {
    source: Arc<dyn Connection>,
    target: Arc<dyn Connection>,
    row_policy: RowSizePolicy,
    events: EventSink,
}

/// The resolved INSERT for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InsertPlan {
    sql: String,
    /// For each target column, the result column that feeds it.
    positions: Vec<Option<usize>>,
}

/// Where a job stands while rows are being written.
#[derive(Default)]
struct WriteProgress {
    session: Option<Box<dyn WriteSession>>,
    in_batch: u64,
    migrated: u64,
}

impl TransferEngine {
    pub fn new(source: Arc<dyn Connection>, target: Arc<dyn Connection>) -> Self {
        Self {
            source,
            target,
            row_policy: RowSizePolicy::default(),
            events: EventSink::disabled(),
        }
    }

    pub fn with_row_policy(mut self, policy: RowSizePolicy) -> Self {
        self.row_policy = policy;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Execute one job.
    ///
    /// Count failures are recorded as unknown and never fail the job.
    pub async fn execute(&self, job: &TableJob) -> Result<CopyResult> {
        job.validate()?;
        let label = job.label().to_string();
        let started_at = Utc::now();
        let timer = Instant::now();

        info!(
            "{}: copying into {}{}",
            label,
            job.target_table,
            if job.dry_run { " (dry-run)" } else { "" }
        );
        self.events.emit(CopyEvent::TableStarted {
            table: label.clone(),
            target: job.target_table.clone(),
        });

        let plan = QueryPlan::build(job, self.source.dialect());
        debug!("{}: select: {}", label, plan.select_sql);

        let source_count = count_rows(self.source.as_ref(), &plan.count_sql, &label).await;

        let mut stream = self
            .source
            .query(&plan.select_sql, &[])
            .await
            .map_err(|e| CopyError::extraction(&label, e))?;
        if stream.columns.is_empty() {
            return Err(CopyError::planning(&label, "source query returned no columns"));
        }

        if job.auto_create {
            self.ensure_target(job, &stream.columns).await?;
        }

        let insert = self.plan_insert(job, &stream.columns);
        debug!("{}: insert: {}", label, insert.sql);

        let mut progress = WriteProgress::default();
        if let Err(e) = self.write_rows(job, &mut stream, &insert, &mut progress).await {
            if let Some(session) = progress.session.take() {
                if let Err(rollback_err) = session.rollback().await {
                    warn!("{}: rollback failed: {}", label, rollback_err);
                } else {
                    info!(
                        "{}: rolled back {} uncommitted rows",
                        label, progress.in_batch
                    );
                }
            }
            return Err(e);
        }

        let count_sql = format!(
            "SELECT COUNT(*) FROM {}",
            self.target.dialect().quote_ident(&job.target_table)
        );
        let target_count = count_rows(self.target.as_ref(), &count_sql, &job.target_table).await;

        let result = CopyResult {
            table: label.clone(),
            target_table: job.target_table.clone(),
            migrated: progress.migrated,
            source_count,
            target_count,
            started_at,
            finished_at: Utc::now(),
            elapsed: timer.elapsed(),
            dry_run: job.dry_run,
        };

        let reconciliation = result.reconciliation();
        if reconciliation.is_mismatch() {
            warn!(
                "{}: row count {} (source {}, target {}, diff {:+})",
                label,
                reconciliation.label(),
                result.source_count.as_sentinel(),
                result.target_count.as_sentinel(),
                reconciliation.diff().unwrap_or_default()
            );
        }
        info!(
            "{}: {} rows in {:.1}s ({:.0} rows/sec)",
            label,
            result.migrated,
            result.elapsed.as_secs_f64(),
            result.rows_per_second()
        );

        self.events.emit(CopyEvent::TableFinished {
            result: result.clone(),
        });
        Ok(result)
    }

    /// Create the target table when it does not exist.
    ///
    /// A failed existence check counts as absent.
    async fn ensure_target(&self, job: &TableJob, columns: &[ColumnMeta]) -> Result<()> {
        let label = job.label();
        match table_exists(self.target.as_ref(), &job.target_table).await {
            Existence::Present => {
                debug!("{}: target {} exists", label, job.target_table);
                return Ok(());
            }
            Existence::Unknown(reason) => {
                warn!(
                    "{}: could not check whether {} exists ({}), creating it",
                    label, job.target_table, reason
                );
            }
            Existence::Absent => {}
        }

        let ddl = synthesize_ddl(job, columns, self.target.dialect(), self.row_policy)?;
        if ddl.converted_columns > 0 {
            info!(
                "{}: {} character columns widened to {} to fit the row size limit",
                label,
                ddl.converted_columns,
                self.target.dialect().unbounded_text_type()
            );
        }

        if job.dry_run {
            info!("{}: [dry-run] would create table:\n{}", label, ddl.sql);
        } else {
            self.target
                .execute(&ddl.sql, &[])
                .await
                .map_err(|e| CopyError::write(label, format!("create table failed: {}", e)))?;
            info!("{}: created table {}", label, job.target_table);
        }

        self.events.emit(CopyEvent::DdlPlanned {
            table: label.to_string(),
            ddl: ddl.sql,
            executed: !job.dry_run,
        });
        Ok(())
    }

    fn plan_insert(&self, job: &TableJob, columns: &[ColumnMeta]) -> InsertPlan {
        let dialect = self.target.dialect();
        let targets: Vec<&str> = columns.iter().map(|c| job.target_for(&c.name)).collect();

        let quoted = targets
            .iter()
            .map(|t| dialect.quote_ident(t))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=targets.len())
            .map(|i| dialect.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

        InsertPlan {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                dialect.quote_ident(&job.target_table),
                quoted,
                placeholders
            ),
            positions: argument_positions(job, columns, &targets),
        }
    }

    async fn write_rows(
        &self,
        job: &TableJob,
        stream: &mut RowStream,
        insert: &InsertPlan,
        progress: &mut WriteProgress,
    ) -> Result<()> {
        let label = job.label();
        let batch_size = job.batch_size.max(1) as u64;

        while let Some(chunk) = stream.next_chunk().await {
            let rows = chunk.map_err(|e| CopyError::extraction(label, e))?;

            for row in rows {
                let args = build_args(&row, &insert.positions);

                if job.dry_run {
                    let index = progress.migrated as usize;
                    if index < DRY_RUN_SAMPLE_ROWS {
                        info!("{}: [dry-run] row {}: {:?}", label, index + 1, args);
                        self.events.emit(CopyEvent::SampleRow {
                            table: label.to_string(),
                            index,
                            values: args,
                        });
                    }
                    progress.migrated += 1;
                    continue;
                }

                let session = match progress.session.take() {
                    Some(session) => session,
                    None => self
                        .target
                        .begin()
                        .await
                        .map_err(|e| CopyError::write(label, e))?,
                };
                progress
                    .session
                    .insert(session)
                    .execute(&insert.sql, &args)
                    .await
                    .map_err(|e| CopyError::write(label, e))?;

                progress.in_batch += 1;
                progress.migrated += 1;
                if progress.in_batch >= batch_size {
                    self.commit_batch(label, progress).await?;
                }
            }
        }

        if progress.in_batch > 0 {
            self.commit_batch(label, progress).await?;
        }
        Ok(())
    }

    async fn commit_batch(&self, label: &str, progress: &mut WriteProgress) -> Result<()> {
        if let Some(session) = progress.session.take() {
            session
                .commit()
                .await
                .map_err(|e| CopyError::write(label, format!("commit failed: {}", e)))?;
        }
        debug!(
            "{}: committed {} rows ({} total)",
            label, progress.in_batch, progress.migrated
        );
        self.events.emit(CopyEvent::BatchCommitted {
            table: label.to_string(),
            rows_in_batch: progress.in_batch,
            total_rows: progress.migrated,
        });
        progress.in_batch = 0;
        Ok(())
    }
}

/// Resolve each target column to a result column: through the mapping whose
/// target it is, then by identical name. Unresolved columns are bound NULL.
fn argument_positions(job: &TableJob, columns: &[ColumnMeta], targets: &[&str]) -> Vec<Option<usize>> {
    let position_of = |name: &str| {
        columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| columns.iter().position(|c| c.name.eq_ignore_ascii_case(name)))
    };

    targets
        .iter()
        .map(|target| {
            let position = job
                .mappings()
                .iter()
                .find(|m| m.target == *target)
                .and_then(|m| position_of(&m.source))
                .or_else(|| position_of(target));
            if position.is_none() {
                debug!("{}: no source for target column {}, binding NULL", job.label(), target);
            }
            position
        })
        .collect()
}

fn build_args(row: &[SqlValue], positions: &[Option<usize>]) -> Vec<SqlValue> {
    positions
        .iter()
        .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or(SqlValue::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::MockConnection;
    use crate::pipeline::ColumnMapping;
    use crate::verify::{Reconciliation, RowCount};

    fn user_columns() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new("user_id", "INT8").with_nullable(false),
            ColumnMeta::new("email", "VARCHAR(100)"),
        ]
    }

    fn user_rows(n: usize) -> Vec<Vec<SqlValue>> {
        (0..n)
            .map(|i| {
                vec![
                    SqlValue::I64(i as i64),
                    SqlValue::Text(format!("user{}@example.com", i)),
                ]
            })
            .collect()
    }

    fn engine(source: &Arc<MockConnection>, target: &Arc<MockConnection>) -> TransferEngine {
        TransferEngine::new(source.clone(), target.clone())
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<CopyEvent>) -> Vec<CopyEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_batches_commit_every_batch_size_rows() {
        let source = Arc::new(MockConnection::new("postgres").with_rows(user_columns(), user_rows(2500)));
        let target = Arc::new(MockConnection::new("postgres"));
        let (sink, mut rx) = EventSink::channel();

        let job = TableJob::for_table("users").with_batch_size(1000);
        let result = engine(&source, &target).with_events(sink).execute(&job).await.unwrap();

        assert_eq!(result.migrated, 2500);
        assert_eq!(result.source_count, RowCount::Known(2500));
        assert_eq!(result.target_count, RowCount::Known(2500));
        assert_eq!(result.reconciliation(), Reconciliation::Match);

        let state = target.lock();
        assert_eq!(state.begins, 3);
        assert_eq!(state.commits, 3);
        assert_eq!(state.rollbacks, 0);
        assert_eq!(state.inserted_rows().len(), 2500);
        drop(state);

        let batches: Vec<u64> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                CopyEvent::BatchCommitted { rows_in_batch, .. } => Some(rows_in_batch),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![1000, 1000, 500]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_batch() {
        let source = Arc::new(MockConnection::new("sqlite").with_rows(user_columns(), user_rows(2000)));
        let target = Arc::new(MockConnection::new("sqlite"));
        let job = TableJob::for_table("users").with_batch_size(1000);
        engine(&source, &target).execute(&job).await.unwrap();
        assert_eq!(target.lock().commits, 2);
    }

    #[tokio::test]
    async fn test_insert_failure_rolls_back_open_batch() {
        let source = Arc::new(MockConnection::new("postgres").with_rows(user_columns(), user_rows(2500)));
        let target = Arc::new(MockConnection::new("postgres").failing_statement_at(1500));

        let job = TableJob::for_table("users").with_batch_size(1000);
        let err = engine(&source, &target).execute(&job).await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("users"));

        let state = target.lock();
        assert_eq!(state.commits, 1);
        assert_eq!(state.rollbacks, 1);
        assert_eq!(state.inserted_rows().len(), 1000);
    }

    #[tokio::test]
    async fn test_mapping_renames_target_columns() {
        let source = Arc::new(MockConnection::new("postgres").with_rows(
            user_columns(),
            vec![vec![SqlValue::I64(42), SqlValue::Text("a@example.com".into())]],
        ));
        let target = Arc::new(MockConnection::new("postgres"));

        let job = TableJob::for_table("users")
            .with_target("customers")
            .with_columns(vec![
                ColumnMapping::new("user_id").to("customer_id"),
                ColumnMapping::new("email"),
            ]);
        engine(&source, &target).execute(&job).await.unwrap();

        assert!(source
            .lock()
            .queries
            .iter()
            .any(|q| q == "SELECT user_id, email FROM users"));

        let state = target.lock();
        let (sql, params) = &state.committed[0];
        assert_eq!(
            sql,
            "INSERT INTO \"customers\" (\"customer_id\", \"email\") VALUES ($1, $2)"
        );
        assert_eq!(params[0], SqlValue::I64(42));
        assert_eq!(params[1], SqlValue::Text("a@example.com".into()));
    }

    #[tokio::test]
    async fn test_unmapped_job_keeps_source_column_order() {
        let columns = vec![
            ColumnMeta::new("b", "TEXT"),
            ColumnMeta::new("a", "TEXT"),
            ColumnMeta::new("c", "TEXT"),
        ];
        let source = Arc::new(MockConnection::new("mysql").with_rows(
            columns,
            vec![vec!["1".into(), "2".into(), "3".into()]],
        ));
        let target = Arc::new(MockConnection::new("mysql"));
        engine(&source, &target)
            .execute(&TableJob::for_table("t"))
            .await
            .unwrap();

        let state = target.lock();
        assert_eq!(state.committed[0].0, "INSERT INTO `t` (`b`, `a`, `c`) VALUES (?, ?, ?)");
    }

    #[test]
    fn test_unresolved_target_column_binds_null() {
        let job = TableJob::for_table("users")
            .with_columns(vec![ColumnMapping::new("user_id").to("customer_id")]);
        let positions = argument_positions(
            &job,
            &user_columns(),
            &["customer_id", "email", "loaded_at"],
        );
        assert_eq!(positions, vec![Some(0), Some(1), None]);

        let args = build_args(&[SqlValue::I64(1), SqlValue::Text("x".into())], &positions);
        assert_eq!(args[2], SqlValue::Null);
    }

    #[tokio::test]
    async fn test_dry_run_never_mutates_target() {
        let source = Arc::new(MockConnection::new("postgres").with_rows(user_columns(), user_rows(8)));
        let target = Arc::new(MockConnection::new("postgres"));
        let (sink, mut rx) = EventSink::channel();

        let job = TableJob::for_table("users")
            .with_auto_create(true)
            .with_dry_run(true);
        let result = engine(&source, &target).with_events(sink).execute(&job).await.unwrap();

        assert!(result.dry_run);
        assert_eq!(result.migrated, 8);
        assert_eq!(result.source_count, RowCount::Known(8));

        let state = target.lock();
        assert!(state.executed.is_empty());
        assert_eq!(state.begins, 0);
        assert_eq!(state.session_statements, 0);
        drop(state);

        let events = drain(&mut rx);
        let samples = events
            .iter()
            .filter(|e| matches!(e, CopyEvent::SampleRow { .. }))
            .count();
        assert_eq!(samples, 5);
        assert!(events
            .iter()
            .any(|e| matches!(e, CopyEvent::DdlPlanned { executed: false, .. })));
    }

    #[tokio::test]
    async fn test_auto_create_is_idempotent() {
        let source = Arc::new(MockConnection::new("sqlite").with_rows(user_columns(), user_rows(3)));
        let target = Arc::new(MockConnection::new("postgres"));
        let job = TableJob::for_table("users").with_auto_create(true);

        let engine = engine(&source, &target);
        engine.execute(&job).await.unwrap();
        engine.execute(&job).await.unwrap();

        let state = target.lock();
        assert_eq!(state.creates(), 1);
        assert_eq!(state.inserted_rows().len(), 6);
    }

    #[tokio::test]
    async fn test_existing_table_is_not_created() {
        let source = Arc::new(MockConnection::new("sqlite").with_rows(user_columns(), user_rows(1)));
        let target = Arc::new(MockConnection::new("sqlserver").with_table("users"));
        let job = TableJob::for_table("users").with_auto_create(true);
        engine(&source, &target).execute(&job).await.unwrap();
        assert_eq!(target.lock().creates(), 0);
    }

    #[tokio::test]
    async fn test_wide_varchar_table_on_mysql() {
        let columns: Vec<ColumnMeta> = (0..31)
            .map(|i| ColumnMeta::new(format!("c{}", i), "VARCHAR(100)"))
            .collect();
        let row: Vec<SqlValue> = (0..31).map(|i| SqlValue::Text(i.to_string())).collect();
        let source = Arc::new(MockConnection::new("postgres").with_rows(columns, vec![row]));
        let target = Arc::new(MockConnection::new("mysql"));

        let job = TableJob::for_table("wide").with_auto_create(true);
        engine(&source, &target).execute(&job).await.unwrap();

        let state = target.lock();
        assert_eq!(state.creates(), 1);
        let ddl = &state.executed[0];
        assert!(!ddl.contains("VARCHAR"));
        assert!(!ddl.contains("CHAR("));
        assert_eq!(ddl.matches(" TEXT").count(), 31);
    }

    #[tokio::test]
    async fn test_count_failure_is_not_fatal() {
        let source = Arc::new(
            MockConnection::new("postgres")
                .with_rows(user_columns(), user_rows(4))
                .failing_count(),
        );
        let target = Arc::new(MockConnection::new("postgres"));
        let result = engine(&source, &target)
            .execute(&TableJob::for_table("users"))
            .await
            .unwrap();
        assert!(matches!(result.source_count, RowCount::Unknown(_)));
        assert_eq!(result.target_count, RowCount::Known(4));
        assert_eq!(result.reconciliation(), Reconciliation::Unknown);
        assert_eq!(result.diff(), None);
    }

    #[tokio::test]
    async fn test_extraction_failure() {
        let source = Arc::new(
            MockConnection::new("postgres")
                .with_rows(user_columns(), user_rows(4))
                .failing_query("FROM users"),
        );
        let target = Arc::new(MockConnection::new("postgres"));
        let err = engine(&source, &target)
            .execute(&TableJob::for_table("users"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert_eq!(target.lock().begins, 0);
    }

    #[tokio::test]
    async fn test_no_columns_is_planning_error() {
        let source = Arc::new(MockConnection::new("postgres"));
        let target = Arc::new(MockConnection::new("postgres"));
        let err = engine(&source, &target)
            .execute(&TableJob::for_table("users"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_invalid_job_touches_nothing() {
        let source = Arc::new(MockConnection::new("postgres"));
        let target = Arc::new(MockConnection::new("postgres"));
        let job = TableJob::for_table("").with_target("t");
        assert!(engine(&source, &target).execute(&job).await.is_err());
        assert!(source.lock().queries.is_empty());
    }
}
