//! Configuration file shapes.
//!
//! Two layouts are accepted: the legacy `source`/`target`/`tables` form and
//! the named-sources form with `sources`, `sync` and `table_list`. Both are
//! resolved into a [`RunPlan`](super::RunPlan) before anything connects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::typemap::RowSizePolicy;

/// Driver tag plus connection string for one store.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub driver: String,

    #[serde(default)]
    pub dsn: String,
}

impl Endpoint {
    pub fn new(driver: impl Into<String>, dsn: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            dsn: dsn.into(),
        }
    }

    /// The DSN with any password replaced by `[REDACTED]`.
    pub fn redacted_dsn(&self) -> String {
        redact_dsn(&self.dsn)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("driver", &self.driver)
            .field("dsn", &self.redacted_dsn())
            .finish()
    }
}

/// Hide passwords in URL (`scheme://user:pw@host`), Go-style
/// (`user:pw@tcp(...)`) and key/value (`Password=...;`) DSNs.
pub fn redact_dsn(dsn: &str) -> String {
    let mut out = dsn.to_string();

    // key=value pairs, separated by ';' (ADO) or whitespace (libpq)
    for key in ["password", "pwd"] {
        let lower = out.to_ascii_lowercase();
        let mut search_from = 0;
        while let Some(found) = lower[search_from..].find(&format!("{}=", key)) {
            let start = search_from + found;
            let at_boundary = start == 0
                || matches!(lower.as_bytes()[start - 1], b';' | b' ' | b'?' | b'&');
            let value_start = start + key.len() + 1;
            if !at_boundary {
                search_from = value_start;
                continue;
            }
            let value_end = lower[value_start..]
                .find([';', ' ', '&'])
                .map(|i| value_start + i)
                .unwrap_or(lower.len());
            out.replace_range(value_start..value_end, "[REDACTED]");
            return redact_userinfo(&out);
        }
    }
    redact_userinfo(&out)
}

fn redact_userinfo(dsn: &str) -> String {
    let authority_start = dsn.find("://").map(|i| i + 3).unwrap_or(0);
    let rest = &dsn[authority_start..];
    let Some(at) = rest.rfind('@') else {
        return dsn.to_string();
    };
    let userinfo = &rest[..at];
    match userinfo.find(':') {
        Some(colon) if !userinfo[..colon].contains('/') => format!(
            "{}{}:[REDACTED]{}",
            &dsn[..authority_start],
            &userinfo[..colon],
            &rest[at..]
        ),
        _ => dsn.to_string(),
    }
}

/// Per-column mapping as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub source: String,

    /// Empty means same as `source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// One table entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub source_table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,

    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    /// Zero, negative or missing falls back to 1000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,

    #[serde(default)]
    pub auto_create: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnConfig>,

    /// Custom SELECT; takes precedence over every other row selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_sql: Option<String>,
}

/// `sync` block of the named-sources layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub target: String,
}

/// `table_list` block of the named-sources layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableListConfig {
    /// Discover tables from the source catalog.
    #[serde(default)]
    pub from_source: bool,

    /// Schema or owner to discover in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Regular expressions; empty means every table.
    #[serde(default)]
    pub include: Vec<String>,

    /// Regular expressions; an excluded table is never copied.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Settings applied to discovered tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<TableConfig>,

    /// Explicit entries; in discovery mode they run before discovered tables.
    #[serde(default)]
    pub list: Vec<TableConfig>,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // Legacy layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Endpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Endpoint>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableConfig>,

    // Named-sources layout.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, Endpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_list: Option<TableListConfig>,

    /// How auto-create fits wide tables under a row-size limit.
    #[serde(default)]
    pub row_size_policy: RowSizePolicy,
}
