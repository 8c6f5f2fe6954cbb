//! Per-table result types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A row count that may not be known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RowCount {
    Known(u64),
    /// The count query failed; holds the reason.
    Unknown(String),
}

impl RowCount {
    pub fn known(&self) -> Option<u64> {
        match self {
            RowCount::Known(n) => Some(*n),
            RowCount::Unknown(_) => None,
        }
    }

    /// `-1` for unknown counts.
    pub fn as_sentinel(&self) -> i64 {
        self.known()
            .map(|n| i64::try_from(n).unwrap_or(i64::MAX))
            .unwrap_or(-1)
    }

    pub fn is_known(&self) -> bool {
        self.known().is_some()
    }
}

/// Outcome of comparing source and target counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "diff", rename_all = "snake_case")]
pub enum Reconciliation {
    Match,
    /// The target has more rows (duplicates, or source deletes during the copy).
    Surplus(i64),
    /// The target has fewer rows.
    Deficit(i64),
    /// At least one side could not be counted.
    Unknown,
}

impl Reconciliation {
    pub fn classify(source: &RowCount, target: &RowCount) -> Self {
        match (source.known(), target.known()) {
            (Some(s), Some(t)) => Self::from_diff(t as i64 - s as i64),
            _ => Reconciliation::Unknown,
        }
    }

    pub fn from_diff(diff: i64) -> Self {
        match diff {
            0 => Reconciliation::Match,
            d if d > 0 => Reconciliation::Surplus(d),
            d => Reconciliation::Deficit(d),
        }
    }

    pub fn diff(&self) -> Option<i64> {
        match self {
            Reconciliation::Match => Some(0),
            Reconciliation::Surplus(d) | Reconciliation::Deficit(d) => Some(*d),
            Reconciliation::Unknown => None,
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Reconciliation::Surplus(_) | Reconciliation::Deficit(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Reconciliation::Match => "match",
            Reconciliation::Surplus(_) => "surplus",
            Reconciliation::Deficit(_) => "deficit",
            Reconciliation::Unknown => "unknown",
        }
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Result of one table copy.
#[derive(Debug, Clone, Serialize)]
pub struct CopyResult {
    pub table: String,
    pub target_table: String,
    /// Rows inserted (or, in dry-run, rows that would have been).
    pub migrated: u64,
    pub source_count: RowCount,
    pub target_count: RowCount,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub dry_run: bool,
}

impl CopyResult {
    pub fn reconciliation(&self) -> Reconciliation {
        Reconciliation::classify(&self.source_count, &self.target_count)
    }

    /// `target - source` when both sides were counted.
    pub fn diff(&self) -> Option<i64> {
        self.reconciliation().diff()
    }

    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.migrated as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let src = RowCount::Known(10_000);
        assert_eq!(
            Reconciliation::classify(&src, &RowCount::Known(10_020)),
            Reconciliation::Surplus(20)
        );
        assert_eq!(
            Reconciliation::classify(&src, &RowCount::Known(9_990)),
            Reconciliation::Deficit(-10)
        );
        assert_eq!(
            Reconciliation::classify(&src, &RowCount::Known(10_000)),
            Reconciliation::Match
        );
        assert_eq!(
            Reconciliation::classify(&src, &RowCount::Unknown("timeout".into())),
            Reconciliation::Unknown
        );
    }

    #[test]
    fn test_diff_and_labels() {
        assert_eq!(Reconciliation::Surplus(20).diff(), Some(20));
        assert_eq!(Reconciliation::Deficit(-10).label(), "deficit");
        assert_eq!(Reconciliation::Unknown.diff(), None);
        assert!(!Reconciliation::Unknown.is_mismatch());
        assert!(!Reconciliation::Match.is_mismatch());
    }

    #[test]
    fn test_row_count_sentinel() {
        assert_eq!(RowCount::Known(5).as_sentinel(), 5);
        assert_eq!(RowCount::Unknown("x".into()).as_sentinel(), -1);
    }

    #[test]
    fn test_copy_result_serializes_elapsed_secs() {
        let now = Utc::now();
        let result = CopyResult {
            table: "a".into(),
            target_table: "b".into(),
            migrated: 3,
            source_count: RowCount::Known(3),
            target_count: RowCount::Unknown("denied".into()),
            started_at: now,
            finished_at: now,
            elapsed: Duration::from_millis(1500),
            dry_run: false,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["elapsed_secs"], 1.5);
        assert_eq!(json["source_count"], 3);
        assert_eq!(json["target_count"], "denied");
        assert_eq!(result.diff(), None);
    }
}
