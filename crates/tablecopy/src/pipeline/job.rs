//! Table job (Command pattern) for encapsulating one table copy.
//!
//! A job is built from configuration before the run starts and is never
//! mutated afterwards; the engine only reads it.

use std::collections::HashSet;

use serde::Serialize;

use crate::core::identifier::validate_identifier;
use crate::error::{CopyError, Result};

/// Rows per committed batch when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Where a job's rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum JobSource {
    Table(String),
    /// A custom SELECT, used verbatim. Disables WHERE, incremental and
    /// column projection.
    Query(String),
}

/// Watermark bounds: `key > since` and/or `key <= until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncrementalFilter {
    pub key: String,
    pub since: Option<String>,
    pub until: Option<String>,
}

/// Per-column mapping from a source column to a target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub source: String,
    pub target: String,
    /// DDL type used verbatim instead of the translated one.
    pub target_type: Option<String>,
    pub nullable: Option<bool>,
    /// Default expression appended verbatim to the column definition.
    pub default_value: Option<String>,
}

impl ColumnMapping {
    /// Identity mapping for `source`.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            target: source.clone(),
            source,
            target_type: None,
            nullable: None,
            default_value: None,
        }
    }

    /// Rename the target column. An empty name keeps the source name.
    pub fn to(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        if !target.trim().is_empty() {
            self.target = target;
        }
        self
    }

    pub fn with_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default_value = Some(expr.into());
        self
    }
}

/// One replication task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableJob {
    pub source: JobSource,
    pub target_table: String,
    pub where_clause: Option<String>,
    pub incremental: Option<IncrementalFilter>,
    pub batch_size: usize,
    pub auto_create: bool,
    pub dry_run: bool,
    pub columns: Vec<ColumnMapping>,
}

impl TableJob {
    /// Copy `table` into a target table of the same name.
    pub fn for_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::with_source(JobSource::Table(table.clone()), table)
    }

    /// Copy the rows of a custom SELECT into `target`.
    pub fn for_query(sql: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_source(JobSource::Query(sql.into()), target.into())
    }

    fn with_source(source: JobSource, target_table: String) -> Self {
        Self {
            source,
            target_table,
            where_clause: None,
            incremental: None,
            batch_size: DEFAULT_BATCH_SIZE,
            auto_create: false,
            dry_run: false,
            columns: Vec::new(),
        }
    }

    /// Set the target table. An empty name keeps the current one.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        if !target.trim().is_empty() {
            self.target_table = target;
        }
        self
    }

    pub fn with_where(mut self, predicate: impl Into<String>) -> Self {
        let predicate = predicate.into();
        self.where_clause = (!predicate.trim().is_empty()).then_some(predicate);
        self
    }

    pub fn with_incremental(mut self, filter: IncrementalFilter) -> Self {
        self.incremental = Some(filter);
        self
    }

    /// Set the batch size. Zero falls back to [`DEFAULT_BATCH_SIZE`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        self
    }

    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnMapping>) -> Self {
        self.columns = columns;
        self
    }

    /// Name used in logs, events and errors.
    pub fn label(&self) -> &str {
        match &self.source {
            JobSource::Table(table) if !table.trim().is_empty() => table,
            _ => &self.target_table,
        }
    }

    /// Target column for a source column: the mapping's target, or the same
    /// name.
    pub fn target_for<'a>(&'a self, source: &'a str) -> &'a str {
        self.mapping_for_source(source)
            .map(|m| m.target.as_str())
            .unwrap_or(source)
    }

    /// Mappings in effect. A custom select ignores them.
    pub fn mappings(&self) -> &[ColumnMapping] {
        match self.source {
            JobSource::Table(_) => &self.columns,
            JobSource::Query(_) => &[],
        }
    }

    /// Mapping for a result column. Drivers may fold the case of unquoted
    /// names, so an exact match is preferred over a case-insensitive one.
    pub fn mapping_for_source(&self, source: &str) -> Option<&ColumnMapping> {
        let mappings = self.mappings();
        mappings
            .iter()
            .find(|m| m.source == source)
            .or_else(|| mappings.iter().find(|m| m.source.eq_ignore_ascii_case(source)))
    }

    /// Check the job before anything runs against a store.
    ///
    /// # Errors
    ///
    /// [`CopyError::Planning`] for an empty source or target and invalid
    /// identifiers; [`CopyError::Config`] for duplicate mapping sources.
    pub fn validate(&self) -> Result<()> {
        match &self.source {
            JobSource::Table(table) => {
                if table.trim().is_empty() {
                    return Err(CopyError::planning(
                        &self.target_table,
                        "source table name is empty",
                    ));
                }
                validate_identifier(table)?;
            }
            JobSource::Query(sql) => {
                if sql.trim().is_empty() {
                    return Err(CopyError::planning(
                        &self.target_table,
                        "custom select statement is empty",
                    ));
                }
            }
        }

        if self.target_table.trim().is_empty() {
            return Err(CopyError::planning(self.label(), "target table name is empty"));
        }
        validate_identifier(&self.target_table)?;

        let mut seen = HashSet::new();
        for mapping in &self.columns {
            if mapping.source.trim().is_empty() {
                return Err(CopyError::planning(self.label(), "column mapping has an empty source"));
            }
            validate_identifier(&mapping.target)?;
            if !seen.insert(mapping.source.as_str()) {
                return Err(CopyError::Config(format!(
                    "table {}: column {} is mapped more than once",
                    self.label(),
                    mapping.source
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_table_defaults() {
        let job = TableJob::for_table("orders");
        assert_eq!(job.target_table, "orders");
        assert_eq!(job.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!job.auto_create);
        assert!(!job.dry_run);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_builder_fallbacks() {
        let job = TableJob::for_table("orders")
            .with_target("")
            .with_batch_size(0)
            .with_where("  ");
        assert_eq!(job.target_table, "orders");
        assert_eq!(job.batch_size, DEFAULT_BATCH_SIZE);
        assert!(job.where_clause.is_none());
    }

    #[test]
    fn test_mapping_lookup() {
        let job = TableJob::for_table("users")
            .with_columns(vec![ColumnMapping::new("user_id").to("customer_id")]);
        assert_eq!(job.target_for("user_id"), "customer_id");
        assert_eq!(job.target_for("email"), "email");
        assert_eq!(ColumnMapping::new("a").to("").target, "a");
        assert_eq!(job.target_for("USER_ID"), "customer_id");
    }

    #[test]
    fn test_custom_select_ignores_mappings() {
        let job = TableJob::for_query("SELECT user_id FROM users", "t")
            .with_columns(vec![ColumnMapping::new("user_id").to("customer_id")]);
        assert!(job.mappings().is_empty());
        assert_eq!(job.target_for("user_id"), "user_id");
    }

    #[test]
    fn test_validate_rejects_empty_source() {
        let err = TableJob::for_table("").with_target("t").validate().unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let err = TableJob::for_query(" ", "t").validate().unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let err = TableJob::for_query("SELECT 1", "").validate().unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_validate_rejects_duplicate_mappings() {
        let job = TableJob::for_table("users").with_columns(vec![
            ColumnMapping::new("id"),
            ColumnMapping::new("id").to("other_id"),
        ]);
        let err = job.validate().unwrap_err();
        assert!(matches!(err, CopyError::Config(_)));
    }

    #[test]
    fn test_label_prefers_source_table() {
        assert_eq!(TableJob::for_table("a").with_target("b").label(), "a");
        assert_eq!(TableJob::for_query("SELECT 1", "b").label(), "b");
    }
}
