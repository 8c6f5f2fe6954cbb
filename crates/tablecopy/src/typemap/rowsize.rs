//! Large-row mitigation for dialects with a fixed row-size ceiling.
//!
//! MySQL counts bounded character columns toward a 65,535 byte row limit
//! while unbounded TEXT columns only contribute a small pointer. Tables with
//! many VARCHAR columns therefore fail to create unless some of them are
//! turned into TEXT.

use serde::{Deserialize, Serialize};

use crate::core::Dialect;

use super::is_bounded_char;

/// Column count above which every bounded character column becomes TEXT.
pub const COLUMN_COUNT_THRESHOLD: usize = 30;

/// How bounded character columns are converted when a row might not fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSizePolicy {
    /// More than 30 columns converts every VARCHAR/CHAR column to TEXT.
    #[default]
    ColumnCount,
    /// Estimate the worst-case row width and convert the widest bounded
    /// character columns until the row fits the dialect's limit.
    ByteBudget,
}

/// Worst-case byte width of one DDL type.
pub fn estimate_type_bytes(ddl_type: &str) -> usize {
    let t = ddl_type.trim().to_uppercase();
    let base = t.split(['(', ' ']).next().unwrap_or(&t);

    match base {
        "TINYINT" | "BIT" | "YEAR" | "BOOL" | "BOOLEAN" => 1,
        "SMALLINT" => 2,
        "MEDIUMINT" | "INT" | "INTEGER" => 4,
        "BIGINT" => 8,
        "FLOAT" => 4,
        "DOUBLE" | "REAL" => 8,
        "DECIMAL" | "NUMERIC" => 20,
        "DATE" | "TIME" => 3,
        "DATETIME" | "TIMESTAMP" => 5,
        "CHAR" | "VARCHAR" | "BINARY" | "VARBINARY" => {
            let n = length_arg(&t).unwrap_or(255);
            if base.ends_with("BINARY") {
                n
            } else {
                3 * n
            }
        }
        "TINYTEXT" | "TINYBLOB" => 9,
        "TEXT" | "BLOB" => 10,
        "MEDIUMTEXT" | "MEDIUMBLOB" => 11,
        "LONGTEXT" | "LONGBLOB" | "JSON" => 12,
        _ => 8,
    }
}

/// Worst-case byte width of a row of DDL types.
pub fn estimate_row_bytes<S: AsRef<str>>(types: &[S]) -> usize {
    types.iter().map(|t| estimate_type_bytes(t.as_ref())).sum()
}

/// Rewrite bounded character types per `policy` when `dialect` has a row
/// size limit. Returns the number of columns converted.
pub fn apply_row_size_policy(
    types: &mut [String],
    policy: RowSizePolicy,
    dialect: &dyn Dialect,
) -> usize {
    let Some(limit) = dialect.row_size_limit() else {
        return 0;
    };
    let text = dialect.unbounded_text_type().to_string();

    match policy {
        RowSizePolicy::ColumnCount => {
            if types.len() <= COLUMN_COUNT_THRESHOLD {
                return 0;
            }
            let mut converted = 0;
            for ty in types.iter_mut().filter(|t| is_bounded_char(t)) {
                *ty = text.clone();
                converted += 1;
            }
            converted
        }
        RowSizePolicy::ByteBudget => {
            let mut converted = 0;
            while estimate_row_bytes(types) > limit {
                let widest = types
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| is_bounded_char(t))
                    .max_by_key(|(_, t)| estimate_type_bytes(t))
                    .map(|(i, _)| i);
                match widest {
                    Some(i) => {
                        types[i] = text.clone();
                        converted += 1;
                    }
                    None => break,
                }
            }
            converted
        }
    }
}

fn length_arg(t: &str) -> Option<usize> {
    let open = t.find('(')?;
    let close = t[open..].find(')')? + open;
    t[open + 1..close].trim().parse().ok()
}
