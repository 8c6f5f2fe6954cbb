//! Run-level aggregation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{CopyResult, Reconciliation, RowCount};

/// Aggregate over every table of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<CopyResult>,
    /// Sum of the known source counts.
    pub total_source: u64,
    /// Sum of the known target counts.
    pub total_target: u64,
    pub total_migrated: u64,
    /// Some table had an unknown count, so the totals exclude it on that side.
    pub incomplete: bool,
    pub reconciliation: Reconciliation,
}

impl RunSummary {
    pub fn new(
        tables: Vec<CopyResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let sum = |count: fn(&CopyResult) -> &RowCount| -> u64 {
            tables.iter().filter_map(|t| count(t).known()).sum()
        };
        let total_source = sum(|t| &t.source_count);
        let total_target = sum(|t| &t.target_count);
        let total_migrated = tables.iter().map(|t| t.migrated).sum();
        let incomplete = tables
            .iter()
            .any(|t| !t.source_count.is_known() || !t.target_count.is_known());

        let reconciliation = if tables.is_empty() {
            Reconciliation::Unknown
        } else {
            Reconciliation::from_diff(total_target as i64 - total_source as i64)
        };

        Self {
            started_at,
            finished_at,
            tables,
            total_source,
            total_target,
            total_migrated,
            incomplete,
            reconciliation,
        }
    }

    /// Tables whose counts disagree.
    pub fn mismatches(&self) -> impl Iterator<Item = &CopyResult> {
        self.tables
            .iter()
            .filter(|t| t.reconciliation().is_mismatch())
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(table: &str, source: RowCount, target: RowCount, migrated: u64) -> CopyResult {
        let now = Utc::now();
        CopyResult {
            table: table.into(),
            target_table: table.into(),
            migrated,
            source_count: source,
            target_count: target,
            started_at: now,
            finished_at: now,
            elapsed: Duration::from_secs(1),
            dry_run: false,
        }
    }

    #[test]
    fn test_totals_and_mismatches() {
        let now = Utc::now();
        let summary = RunSummary::new(
            vec![
                result("a", RowCount::Known(100), RowCount::Known(100), 100),
                result("b", RowCount::Known(50), RowCount::Known(45), 45),
            ],
            now,
            now,
        );
        assert_eq!(summary.total_source, 150);
        assert_eq!(summary.total_target, 145);
        assert_eq!(summary.total_migrated, 145);
        assert_eq!(summary.reconciliation, Reconciliation::Deficit(-5));
        assert!(!summary.incomplete);
        let names: Vec<_> = summary.mismatches().map(|t| t.table.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_unknown_counts_are_excluded_and_flagged() {
        let now = Utc::now();
        let summary = RunSummary::new(
            vec![
                result("a", RowCount::Known(10), RowCount::Known(10), 10),
                result("b", RowCount::Unknown("denied".into()), RowCount::Known(7), 7),
            ],
            now,
            now,
        );
        assert_eq!(summary.total_source, 10);
        assert_eq!(summary.total_target, 17);
        assert!(summary.incomplete);
        assert_eq!(summary.mismatches().count(), 0);
    }

    #[test]
    fn test_empty_run() {
        let now = Utc::now();
        let summary = RunSummary::new(Vec::new(), now, now);
        assert_eq!(summary.reconciliation, Reconciliation::Unknown);
        assert!(!summary.incomplete);
    }
}
