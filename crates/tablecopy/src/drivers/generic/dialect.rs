//! Generic text-store dialect (Strategy pattern).
//!
//! Used for SQLite and as the fallback for unrecognized drivers: backtick
//! quoting, positional `?` parameters and a small set of storage classes.

use crate::core::identifier::{quote_with, split_qualified};
use crate::core::traits::{CatalogQuery, Dialect, PlaceholderStyle};
use crate::typemap::TypeFamily;

/// Generic / SQLite dialect implementation.
#[derive(Debug, Clone)]
pub struct GenericDialect {
    name: String,
    /// Whether the store exposes `sqlite_master`.
    sqlite_catalog: bool,
}

impl GenericDialect {
    /// Dialect for SQLite databases.
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".to_string(),
            sqlite_catalog: true,
        }
    }

    /// Fallback dialect for a driver tag with no dedicated strategy.
    pub fn fallback(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sqlite_catalog: false,
        }
    }
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self::sqlite()
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &str {
        &self.name
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, '`', '`')
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Positional
    }

    fn ddl_type(&self, family: &TypeFamily) -> String {
        match family {
            TypeFamily::Boolean | TypeFamily::Integer { .. } => "INTEGER",
            TypeFamily::Float => "REAL",
            TypeFamily::Decimal { .. } => "NUMERIC",
            TypeFamily::Binary => "BLOB",
            TypeFamily::Temporal | TypeFamily::Text | TypeFamily::Char | TypeFamily::Unknown => {
                "TEXT"
            }
        }
        .to_string()
    }

    fn unbounded_text_type(&self) -> &str {
        "TEXT"
    }

    fn existence_query(&self, table: &str) -> Option<CatalogQuery> {
        if !self.sqlite_catalog {
            return None;
        }
        let (_, name) = split_qualified(table);
        Some(
            CatalogQuery::new(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(name),
        )
    }

    fn list_tables_query(&self, schema: Option<&str>) -> CatalogQuery {
        if self.sqlite_catalog {
            return CatalogQuery::new(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            );
        }
        match schema {
            Some(schema) => CatalogQuery::new(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ? AND table_type = 'BASE TABLE' ORDER BY table_name",
            )
            .bind(schema),
            None => CatalogQuery::new(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' ORDER BY table_name",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::translate;

    #[test]
    fn test_quote_and_placeholders() {
        let d = GenericDialect::sqlite();
        assert_eq!(d.name(), "sqlite");
        assert_eq!(d.quote_ident("users"), "`users`");
        assert_eq!(d.quote_ident("`users`"), "`users`");
        assert_eq!(d.param_placeholder(4), "?");
    }

    #[test]
    fn test_type_translation() {
        let d = GenericDialect::sqlite();
        assert_eq!(translate("BIGINT", &d), "INTEGER");
        assert_eq!(translate("FLOAT", &d), "REAL");
        assert_eq!(translate("DECIMAL(10,2)", &d), "NUMERIC");
        assert_eq!(translate("TIMESTAMP", &d), "TEXT");
        assert_eq!(translate("BYTEA", &d), "BLOB");
        assert_eq!(translate("ENUM", &d), "TEXT");
    }

    #[test]
    fn test_catalog_existence_query() {
        let d = GenericDialect::sqlite();
        let q = d.existence_query("main.orders").unwrap();
        assert!(q.sql.contains("sqlite_master"));
        assert!(d.list_tables_query(None).sql.contains("NOT LIKE 'sqlite_%'"));

        let fallback = GenericDialect::fallback("duckdb");
        assert_eq!(fallback.name(), "duckdb");
        assert!(fallback.existence_query("orders").is_none());
    }
}
