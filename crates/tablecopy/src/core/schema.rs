//! Column metadata reported by source drivers.

use serde::Serialize;

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    /// Column name as reported by the driver.
    pub name: String,

    /// Native type name, uppercased (e.g., "VARCHAR(255)", "INT8").
    pub native_type: String,

    /// Driver-reported nullability, when the driver knows it.
    pub nullable: Option<bool>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, native_type: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.as_ref().trim().to_uppercase(),
            nullable: None,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}
