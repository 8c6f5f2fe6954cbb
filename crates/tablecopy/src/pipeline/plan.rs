//! Source query planning.

use serde::Serialize;

use crate::core::identifier::quote_literal;
use crate::core::Dialect;

use super::job::{JobSource, TableJob};

/// Prefix marking an incremental bound as a SQL expression.
pub const EXPR_PREFIX: &str = "expr:";

/// Alias of the derived table wrapping a custom select for counting.
const COUNT_ALIAS: &str = "_t";

/// The statements run against the source for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub select_sql: String,
    pub count_sql: String,
}

impl QueryPlan {
    /// Build the extraction and count statements for `job`.
    ///
    /// A custom select is used verbatim and counted as a derived table.
    /// Otherwise the projection is `*` or the mapped source columns, and the
    /// count applies the same WHERE and incremental predicates.
    ///
    /// Table and column names are used as written: callers quote them in
    /// configuration when the source needs it. The incremental key is quoted
    /// with the source dialect.
    pub fn build(job: &TableJob, source: &dyn Dialect) -> Self {
        match &job.source {
            JobSource::Query(sql) => {
                let select_sql = sql.trim().trim_end_matches(';').trim_end().to_string();
                let count_sql = format!(
                    "SELECT COUNT(*) FROM ({}) {}",
                    select_sql,
                    source.derived_table_alias(COUNT_ALIAS)
                );
                Self {
                    select_sql,
                    count_sql,
                }
            }
            JobSource::Table(table) => {
                let table = table.trim();
                let projection = if job.columns.is_empty() {
                    "*".to_string()
                } else {
                    job.columns
                        .iter()
                        .map(|m| m.source.trim())
                        .collect::<Vec<_>>()
                        .join(", ")
                };

                let filter = where_clause(job, source)
                    .map(|w| format!(" WHERE {}", w))
                    .unwrap_or_default();

                Self {
                    select_sql: format!("SELECT {} FROM {}{}", projection, table, filter),
                    count_sql: format!("SELECT COUNT(*) FROM {}{}", table, filter),
                }
            }
        }
    }
}

/// Conjunction of the user predicate and the incremental bounds.
fn where_clause(job: &TableJob, source: &dyn Dialect) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(predicate) = job.where_clause.as_deref().map(str::trim) {
        if !predicate.is_empty() {
            parts.push(format!("({})", predicate));
        }
    }

    if let Some(inc) = &job.incremental {
        if !inc.key.trim().is_empty() {
            let key = source.quote_ident(&inc.key);
            if let Some(since) = inc.since.as_deref().filter(|s| !s.trim().is_empty()) {
                parts.push(format!("{} > {}", key, render_bound(since)));
            }
            if let Some(until) = inc.until.as_deref().filter(|s| !s.trim().is_empty()) {
                parts.push(format!("{} <= {}", key, render_bound(until)));
            }
        }
    }

    (!parts.is_empty()).then(|| parts.join(" AND "))
}

/// Render a watermark bound as SQL.
///
/// `expr:NOW() - INTERVAL 1 DAY` passes the expression through; anything
/// else becomes a single-quoted literal.
pub fn render_bound(bound: &str) -> String {
    match bound.trim().strip_prefix(EXPR_PREFIX) {
        Some(expr) => expr.trim().to_string(),
        None => quote_literal(bound.trim()),
    }
}
