//! SQL Server SQL dialect (Strategy pattern).
//!
//! Bracket quoting and `@P<n>` parameters, which is how TDS binds values.

use crate::core::identifier::{quote_with, split_qualified};
use crate::core::traits::{CatalogQuery, Dialect, PlaceholderStyle};
use crate::typemap::TypeFamily;

/// SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new SQL Server dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "sqlserver"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, '[', ']')
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::At
    }

    fn ddl_type(&self, family: &TypeFamily) -> String {
        match family {
            TypeFamily::Boolean => "BIT".to_string(),
            TypeFamily::Integer { wide: true } => "BIGINT".to_string(),
            TypeFamily::Integer { wide: false } => "INT".to_string(),
            TypeFamily::Float => "FLOAT(53)".to_string(),
            TypeFamily::Decimal { .. } => {
                let (p, s) = family.decimal_precision();
                format!("DECIMAL({},{})", p.min(38), s.min(p.min(38)))
            }
            TypeFamily::Temporal => "DATETIME2".to_string(),
            TypeFamily::Binary => "VARBINARY(MAX)".to_string(),
            TypeFamily::Text | TypeFamily::Char | TypeFamily::Unknown => {
                "NVARCHAR(MAX)".to_string()
            }
        }
    }

    fn unbounded_text_type(&self) -> &str {
        "NVARCHAR(MAX)"
    }

    fn existence_query(&self, table: &str) -> Option<CatalogQuery> {
        let (schema, name) = split_qualified(table);
        let query = match schema {
            Some(schema) => CatalogQuery::new(
                "SELECT COUNT(*) FROM sys.tables t JOIN sys.schemas s ON t.schema_id = s.schema_id \
                 WHERE s.name = @P1 AND t.name = @P2",
            )
            .bind(schema),
            None => CatalogQuery::new(
                "SELECT COUNT(*) FROM sys.tables t JOIN sys.schemas s ON t.schema_id = s.schema_id \
                 WHERE s.name = SCHEMA_NAME() AND t.name = @P1",
            ),
        };
        Some(query.bind(name))
    }

    fn list_tables_query(&self, schema: Option<&str>) -> CatalogQuery {
        CatalogQuery::new(
            "SELECT t.name FROM sys.tables t JOIN sys.schemas s ON t.schema_id = s.schema_id \
             WHERE s.name = @P1 ORDER BY t.name",
        )
        .bind(schema.unwrap_or("dbo"))
    }
}
