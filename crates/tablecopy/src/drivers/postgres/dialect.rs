//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::identifier::{quote_with, split_qualified};
use crate::core::traits::{CatalogQuery, Dialect, PlaceholderStyle};
use crate::typemap::TypeFamily;

/// Largest precision PostgreSQL accepts in a `NUMERIC(p,s)` declaration.
const MAX_NUMERIC_PRECISION: u32 = 1000;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, '"', '"')
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn ddl_type(&self, family: &TypeFamily) -> String {
        match family {
            TypeFamily::Boolean => "BOOLEAN".to_string(),
            // Every integer widens; INTEGER sources may carry 64-bit values.
            TypeFamily::Integer { .. } => "BIGINT".to_string(),
            TypeFamily::Float => "DOUBLE PRECISION".to_string(),
            TypeFamily::Decimal { .. } => {
                let (p, s) = family.decimal_precision();
                let p = p.min(MAX_NUMERIC_PRECISION);
                format!("NUMERIC({},{})", p, s.min(p))
            }
            TypeFamily::Temporal => "TIMESTAMP".to_string(),
            TypeFamily::Binary => "BYTEA".to_string(),
            TypeFamily::Text | TypeFamily::Char | TypeFamily::Unknown => "TEXT".to_string(),
        }
    }

    fn unbounded_text_type(&self) -> &str {
        "TEXT"
    }

    fn existence_query(&self, table: &str) -> Option<CatalogQuery> {
        let (schema, name) = split_qualified(table);
        let query = match schema {
            Some(schema) => CatalogQuery::new(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
            )
            .bind(schema),
            None => CatalogQuery::new(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1",
            ),
        };
        Some(query.bind(name))
    }

    fn list_tables_query(&self, schema: Option<&str>) -> CatalogQuery {
        CatalogQuery::new(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .bind(schema.unwrap_or("public"))
    }
}
