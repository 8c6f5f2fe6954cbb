//! CREATE TABLE synthesis for auto-create.

use serde::Serialize;

use crate::core::{ColumnMeta, Dialect};
use crate::error::{CopyError, Result};
use crate::typemap::{apply_row_size_policy, translate, RowSizePolicy};

use super::job::TableJob;

/// A synthesized CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdlPlan {
    pub sql: String,
    /// Bounded character columns turned into unbounded text by the
    /// row-size policy.
    pub converted_columns: usize,
}

/// Build the CREATE TABLE for `job` from the source result columns.
///
/// Per column, in metadata order:
/// - name: the mapping's target, or the source name
/// - type: the mapping's `target_type`, else the translated native type;
///   the row-size policy then runs over the whole column list
/// - nullability: the mapping's override, else what the driver reported,
///   else nullable
/// - default: the mapping's expression, verbatim
pub fn synthesize_ddl(
    job: &TableJob,
    columns: &[ColumnMeta],
    target: &dyn Dialect,
    policy: RowSizePolicy,
) -> Result<DdlPlan> {
    if columns.is_empty() {
        return Err(CopyError::planning(
            job.label(),
            "source returned no columns to create a table from",
        ));
    }

    let mut types: Vec<String> = columns
        .iter()
        .map(|col| {
            job.mapping_for_source(&col.name)
                .and_then(|m| m.target_type.as_deref())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| translate(&col.native_type, target))
        })
        .collect();
    let converted_columns = apply_row_size_policy(&mut types, policy, target);

    let definitions = columns
        .iter()
        .zip(&types)
        .map(|(col, ty)| {
            let mapping = job.mapping_for_source(&col.name);
            let name = job.target_for(&col.name);
            if name.trim().is_empty() {
                return Err(CopyError::planning(job.label(), "column with an empty name"));
            }

            let nullable = mapping
                .and_then(|m| m.nullable)
                .or(col.nullable)
                .unwrap_or(true);

            let mut def = format!("  {} {}", target.quote_ident(name), ty);
            if !nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = mapping
                .and_then(|m| m.default_value.as_deref())
                .filter(|d| !d.trim().is_empty())
            {
                def.push_str(" DEFAULT ");
                def.push_str(default.trim());
            }
            Ok(def)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DdlPlan {
        sql: format!(
            "CREATE TABLE {} (\n{}\n)",
            target.quote_ident(&job.target_table),
            definitions.join(",\n")
        ),
        converted_columns,
    })
}
