//! Oracle SQL dialect (Strategy pattern).
//!
//! Oracle folds unquoted identifiers to upper case, so names are uppercased
//! before being wrapped in double quotes. Parameters are `:1`, `:2`, ...

use crate::core::identifier::{quote_with, split_qualified};
use crate::core::traits::{CatalogQuery, Dialect, PlaceholderStyle};
use crate::typemap::TypeFamily;

/// Oracle dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct OracleDialect;

impl OracleDialect {
    /// Create a new Oracle dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for OracleDialect {
    fn name(&self) -> &str {
        "oracle"
    }

    fn quote_ident(&self, name: &str) -> String {
        let trimmed = name.trim();
        if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
            return trimmed.to_string();
        }
        quote_with(&trimmed.to_uppercase(), '"', '"')
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Colon
    }

    fn ddl_type(&self, family: &TypeFamily) -> String {
        match family {
            TypeFamily::Boolean => "NUMBER(1)".to_string(),
            TypeFamily::Integer { wide: true } => "NUMBER(19)".to_string(),
            TypeFamily::Integer { wide: false } => "NUMBER(10)".to_string(),
            TypeFamily::Float => "BINARY_DOUBLE".to_string(),
            TypeFamily::Decimal { .. } => {
                let (p, s) = family.decimal_precision();
                format!("NUMBER({},{})", p.min(38), s)
            }
            TypeFamily::Temporal => "TIMESTAMP".to_string(),
            TypeFamily::Binary => "BLOB".to_string(),
            TypeFamily::Text => "CLOB".to_string(),
            TypeFamily::Char | TypeFamily::Unknown => "VARCHAR2(4000)".to_string(),
        }
    }

    fn unbounded_text_type(&self) -> &str {
        "CLOB"
    }

    fn existence_query(&self, table: &str) -> Option<CatalogQuery> {
        let (owner, name) = split_qualified(table);
        let query = match owner {
            Some(owner) => CatalogQuery::new(
                "SELECT COUNT(*) FROM all_tables WHERE owner = :1 AND table_name = :2",
            )
            .bind(owner.to_uppercase()),
            None => CatalogQuery::new("SELECT COUNT(*) FROM user_tables WHERE table_name = :1"),
        };
        Some(query.bind(name.to_uppercase()))
    }

    fn list_tables_query(&self, schema: Option<&str>) -> CatalogQuery {
        match schema {
            Some(owner) => CatalogQuery::new(
                "SELECT table_name FROM all_tables WHERE owner = :1 ORDER BY table_name",
            )
            .bind(owner.to_uppercase()),
            None => CatalogQuery::new("SELECT table_name FROM user_tables ORDER BY table_name"),
        }
    }

    // Oracle rejects AS before a derived-table alias and identifiers that
    // start with an underscore.
    fn derived_table_alias(&self, alias: &str) -> String {
        alias.trim_start_matches('_').to_string()
    }
}
