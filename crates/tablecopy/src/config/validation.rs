//! Configuration validation.

use std::collections::HashSet;

use regex::Regex;

use super::{ColumnConfig, Endpoint, TableConfig};
use crate::error::{CopyError, Result};

/// An endpoint needs a driver and a DSN.
pub fn validate_endpoint(role: &str, endpoint: &Endpoint) -> Result<()> {
    if endpoint.driver.trim().is_empty() {
        return Err(CopyError::Config(format!("{}.driver is required", role)));
    }
    if endpoint.dsn.trim().is_empty() {
        return Err(CopyError::Config(format!("{}.dsn is required", role)));
    }
    Ok(())
}

/// A table entry needs a source table or a custom select.
pub fn validate_table(index: usize, table: &TableConfig) -> Result<()> {
    let has_select = table
        .select_sql
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    let source = table.source_table.trim();

    if source.is_empty() && !has_select {
        return Err(CopyError::Config(format!(
            "table #{}: source_table or select_sql is required",
            index + 1
        )));
    }

    let has_target = table
        .target_table
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if source.is_empty() && !has_target {
        return Err(CopyError::Config(format!(
            "table #{}: target_table is required with select_sql",
            index + 1
        )));
    }

    let label = if source.is_empty() {
        format!("table #{}", index + 1)
    } else {
        source.to_string()
    };
    validate_columns(&label, &table.columns)
}

/// Column mappings need a source, unique within the table.
pub fn validate_columns(label: &str, columns: &[ColumnConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for column in columns {
        let source = column.source.trim();
        if source.is_empty() {
            return Err(CopyError::Config(format!(
                "{}: column mapping without a source",
                label
            )));
        }
        if !seen.insert(source) {
            return Err(CopyError::Config(format!(
                "{}: column {} is mapped more than once",
                label, source
            )));
        }
    }
    Ok(())
}

/// Include/exclude patterns must compile.
pub fn validate_filters(include: &[String], exclude: &[String]) -> Result<()> {
    for pattern in include.iter().chain(exclude) {
        Regex::new(pattern)?;
    }
    Ok(())
}
