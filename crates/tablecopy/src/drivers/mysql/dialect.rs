//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Backtick quoting, positional `?` parameters and a 65,535 byte row-size
//! ceiling for bounded character columns.

use crate::core::identifier::{quote_with, split_qualified};
use crate::core::traits::{CatalogQuery, Dialect, PlaceholderStyle};
use crate::typemap::TypeFamily;

/// InnoDB maximum row size in bytes.
const MAX_ROW_BYTES: usize = 65_535;

/// MySQL/MariaDB dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, '`', '`')
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Positional
    }

    fn ddl_type(&self, family: &TypeFamily) -> String {
        match family {
            TypeFamily::Boolean => "TINYINT(1)".to_string(),
            TypeFamily::Integer { wide: true } => "BIGINT".to_string(),
            TypeFamily::Integer { wide: false } => "INT".to_string(),
            TypeFamily::Float => "DOUBLE".to_string(),
            TypeFamily::Decimal { .. } => {
                let (p, s) = family.decimal_precision();
                format!("DECIMAL({},{})", p.min(65), s.min(30))
            }
            TypeFamily::Temporal => "DATETIME".to_string(),
            TypeFamily::Binary => "LONGBLOB".to_string(),
            TypeFamily::Char => "VARCHAR(255)".to_string(),
            TypeFamily::Text | TypeFamily::Unknown => "TEXT".to_string(),
        }
    }

    fn unbounded_text_type(&self) -> &str {
        "TEXT"
    }

    fn row_size_limit(&self) -> Option<usize> {
        Some(MAX_ROW_BYTES)
    }

    fn existence_query(&self, table: &str) -> Option<CatalogQuery> {
        let (schema, name) = split_qualified(table);
        let query = match schema {
            Some(schema) => CatalogQuery::new(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
            )
            .bind(schema),
            None => CatalogQuery::new(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?",
            ),
        };
        Some(query.bind(name))
    }

    fn list_tables_query(&self, schema: Option<&str>) -> CatalogQuery {
        match schema {
            Some(schema) => CatalogQuery::new(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ? AND table_type = 'BASE TABLE' ORDER BY table_name",
            )
            .bind(schema),
            None => CatalogQuery::new(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::translate;

    #[test]
    fn test_quote_ident() {
        let d = MysqlDialect::new();
        assert_eq!(d.quote_ident("users"), "`users`");
        assert_eq!(d.quote_ident("my`table"), "`my``table`");
        assert_eq!(d.quote_ident("`users`"), "`users`");
        assert_eq!(d.quote_ident("shop.users"), "`shop`.`users`");
    }

    #[test]
    fn test_placeholders() {
        let d = MysqlDialect::new();
        assert_eq!(d.param_placeholder(1), "?");
        assert_eq!(d.param_placeholder(7), "?");
    }

    #[test]
    fn test_type_translation() {
        let d = MysqlDialect::new();
        assert_eq!(translate("BIGINT", &d), "BIGINT");
        assert_eq!(translate("INT", &d), "INT");
        assert_eq!(translate("INTEGER", &d), "BIGINT");
        assert_eq!(translate("FLOAT8", &d), "DOUBLE");
        assert_eq!(translate("NUMERIC", &d), "DECIMAL(18,6)");
        assert_eq!(translate("DECIMAL(10,2)", &d), "DECIMAL(10,2)");
        assert_eq!(translate("BOOLEAN", &d), "TINYINT(1)");
        assert_eq!(translate("TIMESTAMPTZ", &d), "DATETIME");
        assert_eq!(translate("NVARCHAR", &d), "VARCHAR(255)");
        assert_eq!(translate("CLOB", &d), "TEXT");
        assert_eq!(translate("BYTEA", &d), "LONGBLOB");
        assert_eq!(translate("GEOGRAPHY", &d), "TEXT");
    }

    #[test]
    fn test_catalog_queries() {
        let d = MysqlDialect::new();
        let q = d.existence_query("orders").unwrap();
        assert!(q.sql.contains("DATABASE()"));
        assert_eq!(q.params.len(), 1);

        let q = d.existence_query("shop.orders").unwrap();
        assert_eq!(q.params.len(), 2);

        assert!(d.list_tables_query(None).sql.contains("BASE TABLE"));
        assert_eq!(d.row_size_limit(), Some(65_535));
    }
}
