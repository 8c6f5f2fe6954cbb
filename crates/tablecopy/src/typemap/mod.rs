//! Type translation between dialects.
//!
//! A native type name is first classified into a [`TypeFamily`] by ordered
//! substring checks; the target [`Dialect`] then picks its DDL type for that
//! family. Anything unrecognized falls back to the dialect's most permissive
//! string type so auto-create never fails on an unknown type.

mod rowsize;

pub use rowsize::{apply_row_size_policy, estimate_row_bytes, estimate_type_bytes, RowSizePolicy};

use crate::core::Dialect;

/// Default (precision, scale) for decimals without an explicit precision.
pub const DEFAULT_DECIMAL: (u32, u32) = (18, 6);

/// Broad class of a native column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Boolean,
    /// `wide` is false only when the source type is known to fit in 32 bits.
    Integer { wide: bool },
    Float,
    /// Explicit (precision, scale) carried by the source type, if any.
    Decimal { precision: Option<(u32, u32)> },
    /// Dates, times and timestamps collapse into one timestamp-like type.
    Temporal,
    Binary,
    /// Unbounded character data.
    Text,
    /// Bounded character data.
    Char,
    Unknown,
}

impl TypeFamily {
    /// Precision and scale to emit for a decimal family.
    pub fn decimal_precision(&self) -> (u32, u32) {
        match self {
            TypeFamily::Decimal {
                precision: Some(ps),
            } => *ps,
            _ => DEFAULT_DECIMAL,
        }
    }
}

/// Classify an uppercased native type name.
pub fn classify(native: &str) -> TypeFamily {
    let t = native.trim().to_uppercase();

    if t.contains("BOOL") || base_name(&t) == "BIT" {
        return TypeFamily::Boolean;
    }
    if (t.contains("INT") || t.contains("SERIAL")) && !t.contains("INTERVAL") && !t.contains("POINT")
    {
        return TypeFamily::Integer {
            wide: !is_narrow_int(&t),
        };
    }
    if ["DOUBLE", "FLOAT", "REAL"].iter().any(|k| t.contains(k)) {
        return TypeFamily::Float;
    }
    if ["DECIMAL", "NUMERIC", "NUMBER", "MONEY"]
        .iter()
        .any(|k| t.contains(k))
    {
        let precision = parse_precision(&t);
        // NUMBER(p) / NUMBER(p,0) is an integer column
        if let (true, Some((p, 0))) = (base_name(&t) == "NUMBER", precision) {
            return TypeFamily::Integer { wide: p > 9 };
        }
        return TypeFamily::Decimal { precision };
    }
    if t.contains("DATE") || t.contains("TIME") {
        return TypeFamily::Temporal;
    }
    if ["BLOB", "BYTEA", "BINARY", "IMAGE", "RAW"]
        .iter()
        .any(|k| t.contains(k))
    {
        return TypeFamily::Binary;
    }
    if t.contains("TEXT") || t.contains("CLOB") {
        return TypeFamily::Text;
    }
    if t.contains("CHAR") {
        return TypeFamily::Char;
    }
    TypeFamily::Unknown
}

/// Translate a native source type to a DDL type for `target`.
pub fn translate(native: &str, target: &dyn Dialect) -> String {
    target.ddl_type(&classify(native))
}

/// Whether a target DDL type is a bounded character type (`VARCHAR`/`CHAR` prefix).
pub fn is_bounded_char(ddl_type: &str) -> bool {
    let t = ddl_type.trim().to_uppercase();
    t.starts_with("VARCHAR") || t.starts_with("CHAR")
}

/// Type name without length/precision arguments or modifiers.
fn base_name(t: &str) -> &str {
    t.split(['(', ' ']).next().unwrap_or(t)
}

fn is_narrow_int(t: &str) -> bool {
    if t.contains("UNSIGNED") {
        return false;
    }
    matches!(
        base_name(t),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INT2" | "INT4" | "SMALLSERIAL" | "SERIAL"
    )
}

/// Parse `(p)` or `(p,s)` from a type name.
fn parse_precision(t: &str) -> Option<(u32, u32)> {
    let open = t.find('(')?;
    let close = t[open..].find(')')? + open;
    let mut parts = t[open + 1..close].split(',').map(str::trim);
    let precision = parts.next()?.parse().ok()?;
    let scale = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    Some((precision, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_family() {
        assert_eq!(classify("BIGINT"), TypeFamily::Integer { wide: true });
        assert_eq!(classify("INT8"), TypeFamily::Integer { wide: true });
        assert_eq!(classify("INTEGER"), TypeFamily::Integer { wide: true });
        assert_eq!(classify("INT"), TypeFamily::Integer { wide: false });
        assert_eq!(classify("int4"), TypeFamily::Integer { wide: false });
        assert_eq!(classify("INT UNSIGNED"), TypeFamily::Integer { wide: true });
        assert_eq!(classify("SMALLINT"), TypeFamily::Integer { wide: false });
        assert_eq!(classify("BIGSERIAL"), TypeFamily::Integer { wide: true });
    }

    #[test]
    fn test_integer_lookalikes_are_excluded() {
        assert_eq!(classify("INTERVAL"), TypeFamily::Unknown);
        assert_eq!(classify("POINT"), TypeFamily::Unknown);
    }

    #[test]
    fn test_other_families() {
        assert_eq!(classify("BOOLEAN"), TypeFamily::Boolean);
        assert_eq!(classify("BIT"), TypeFamily::Boolean);
        assert_eq!(classify("DOUBLE PRECISION"), TypeFamily::Float);
        assert_eq!(classify("BINARY_DOUBLE"), TypeFamily::Float);
        assert_eq!(classify("TIMESTAMPTZ"), TypeFamily::Temporal);
        assert_eq!(classify("DATETIME2"), TypeFamily::Temporal);
        assert_eq!(classify("VARBINARY"), TypeFamily::Binary);
        assert_eq!(classify("BYTEA"), TypeFamily::Binary);
        assert_eq!(classify("LONGTEXT"), TypeFamily::Text);
        assert_eq!(classify("CLOB"), TypeFamily::Text);
        assert_eq!(classify("VARCHAR(255)"), TypeFamily::Char);
        assert_eq!(classify("CHARACTER VARYING"), TypeFamily::Char);
        assert_eq!(classify("JSONB"), TypeFamily::Unknown);
    }

    #[test]
    fn test_decimal_precision() {
        assert_eq!(
            classify("DECIMAL(10,2)"),
            TypeFamily::Decimal {
                precision: Some((10, 2))
            }
        );
        assert_eq!(classify("NUMERIC").decimal_precision(), DEFAULT_DECIMAL);
        assert_eq!(classify("MONEY").decimal_precision(), (18, 6));
        assert_eq!(classify("NUMBER(5)"), TypeFamily::Integer { wide: false });
    }

    #[test]
    fn test_number_without_scale_is_decimal() {
        assert_eq!(classify("NUMBER"), TypeFamily::Decimal { precision: None });
    }

    #[test]
    fn test_is_bounded_char() {
        assert!(is_bounded_char("VARCHAR(255)"));
        assert!(is_bounded_char("char(10)"));
        assert!(!is_bounded_char("TEXT"));
        assert!(!is_bounded_char("NVARCHAR(MAX)"));
    }
}
