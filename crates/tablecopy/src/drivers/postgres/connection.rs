//! PostgreSQL connection via tokio-postgres and deadpool.
//!
//! Parameters are encoded against the types the server reports when the
//! statement is prepared, so a source value of any dialect can be written to
//! a PostgreSQL column as long as it converts losslessly.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use tracing::{debug, warn};
use uuid::Uuid;

use super::PostgresDialect;
use crate::core::{ColumnMeta, Connection, Dialect, Row, RowStream, SqlValue, WriteSession};
use crate::drivers::common::{
    connector, SslMode, MAX_POOL_SIZE, ROW_CHANNEL_DEPTH, ROW_CHUNK_SIZE,
};
use crate::error::{CopyError, Result};

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Pooled PostgreSQL connection.
pub struct PostgresConnection {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PostgresConnection {
    pub async fn open(dsn: &str) -> Result<Self> {
        let (dsn, ssl_mode) = SslMode::split_from_dsn(dsn)?;
        let mut pg_config: tokio_postgres::Config = dsn
            .parse()
            .map_err(|e| CopyError::connection("postgres", e))?;
        pg_config.ssl_mode(ssl_mode.driver_mode());

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match connector(ssl_mode)? {
            None => {
                warn!("sslmode=disable: credentials are sent in plaintext");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr).max_size(MAX_POOL_SIZE as usize).build()
            }
            Some(tls_connector) => {
                let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
                Pool::builder(mgr).max_size(MAX_POOL_SIZE as usize).build()
            }
        }
        .map_err(|e| CopyError::pool(e, "creating PostgreSQL pool"))?;

        debug!("Created PostgreSQL pool (sslmode={:?})", ssl_mode);
        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CopyError::pool(e, "acquiring PostgreSQL connection"))
    }
}

/// Text of text-like and `::text` cast columns, bytes decoded lossily.
struct LossyText(String);

impl<'a> FromSql<'a> for LossyText {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(LossyText(String::from_utf8_lossy(raw).into_owned()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn mismatch(ty: &Type, value: &SqlValue) -> CopyError {
    CopyError::Value(format!("cannot write {:?} to a {} parameter", value, ty.name()))
}

fn convert<T>(ty: &Type, value: &SqlValue, f: impl Fn(&SqlValue) -> Option<T>) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    f(value).map(Some).ok_or_else(|| mismatch(ty, value))
}

fn narrow<T: TryFrom<i64>>(ty: &Type, value: &SqlValue) -> Result<Option<T>> {
    convert(ty, value, |v| v.to_i64().and_then(|n| T::try_from(n).ok()))
}

/// Encode one value for a parameter of type `ty`.
fn encode_param(ty: &Type, value: &SqlValue) -> Result<BoxedParam> {
    let param: BoxedParam = match ty.name() {
        "bool" => Box::new(convert(ty, value, SqlValue::to_bool)?),
        "int2" => Box::new(narrow::<i16>(ty, value)?),
        "int4" => Box::new(narrow::<i32>(ty, value)?),
        "int8" => Box::new(convert(ty, value, SqlValue::to_i64)?),
        "oid" => Box::new(narrow::<u32>(ty, value)?),
        "float4" => Box::new(convert(ty, value, |v| v.to_f64().map(|f| f as f32))?),
        "float8" => Box::new(convert(ty, value, SqlValue::to_f64)?),
        "numeric" => Box::new(convert(ty, value, SqlValue::to_decimal)?),
        "bytea" => Box::new(convert(ty, value, SqlValue::to_bytes)?),
        "date" => Box::new(convert(ty, value, SqlValue::to_date)?),
        "time" => Box::new(convert(ty, value, SqlValue::to_time)?),
        "timestamp" => Box::new(convert(ty, value, SqlValue::to_naive_datetime)?),
        "timestamptz" => Box::new(convert(ty, value, SqlValue::to_utc)?),
        "uuid" => Box::new(convert(ty, value, SqlValue::to_uuid)?),
        "json" | "jsonb" => Box::new(convert(ty, value, |v| {
            v.to_text().map(|s| {
                serde_json::from_str::<serde_json::Value>(&s)
                    .unwrap_or(serde_json::Value::String(s))
            })
        })?),
        _ => Box::new(convert(ty, value, SqlValue::to_text)?),
    };
    Ok(param)
}

fn encode_params(types: &[Type], params: &[SqlValue]) -> Result<Vec<BoxedParam>> {
    if types.len() != params.len() {
        return Err(CopyError::Value(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            params.len()
        )));
    }
    types
        .iter()
        .zip(params)
        .map(|(ty, value)| encode_param(ty, value))
        .collect()
}

fn param_refs(params: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

fn decode_value(
    row: &tokio_postgres::Row,
    i: usize,
    ty: &Type,
) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    let value = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(i)?.map(SqlValue::Bool),
        "int2" => row.try_get::<_, Option<i16>>(i)?.map(|v| SqlValue::I64(v.into())),
        "int4" => row.try_get::<_, Option<i32>>(i)?.map(|v| SqlValue::I64(v.into())),
        "int8" => row.try_get::<_, Option<i64>>(i)?.map(SqlValue::I64),
        "oid" => row.try_get::<_, Option<u32>>(i)?.map(|v| SqlValue::I64(v.into())),
        "float4" => row.try_get::<_, Option<f32>>(i)?.map(|v| SqlValue::F64(v.into())),
        "float8" => row.try_get::<_, Option<f64>>(i)?.map(SqlValue::F64),
        "numeric" => row.try_get::<_, Option<Decimal>>(i)?.map(SqlValue::Decimal),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(i)?.map(SqlValue::Bytes),
        "date" => row.try_get::<_, Option<NaiveDate>>(i)?.map(SqlValue::Date),
        "time" => row.try_get::<_, Option<NaiveTime>>(i)?.map(SqlValue::Time),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(i)?
            .map(SqlValue::DateTime),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(i)?
            .map(SqlValue::DateTimeTz),
        "uuid" => row.try_get::<_, Option<Uuid>>(i)?.map(SqlValue::Uuid),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(i)?
            .map(|v| SqlValue::Text(v.to_string())),
        _ => row
            .try_get::<_, Option<LossyText>>(i)?
            .map(|t| SqlValue::Text(t.0)),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Types read in binary and decoded natively, or whose binary form is text.
fn decodes_natively(ty: &Type) -> bool {
    matches!(
        ty.name(),
        "bool"
            | "int2"
            | "int4"
            | "int8"
            | "oid"
            | "float4"
            | "float8"
            | "numeric"
            | "bytea"
            | "date"
            | "time"
            | "timestamp"
            | "timestamptz"
            | "uuid"
            | "json"
            | "jsonb"
            | "text"
            | "varchar"
            | "bpchar"
            | "name"
            | "xml"
            | "citext"
            | "unknown"
    ) || matches!(ty.kind(), Kind::Enum(_))
}

/// Wrap `sql` so columns without a native decoder (inet, interval, arrays,
/// ranges, ...) come back as their text rendering. `None` when every column
/// decodes natively, or when duplicate column names make the wrapper
/// ambiguous.
fn text_cast_select(sql: &str, columns: &[(&str, &Type)]) -> Option<String> {
    if columns.iter().all(|(_, ty)| decodes_natively(ty)) {
        return None;
    }

    let mut seen = HashSet::new();
    if !columns.iter().all(|(name, _)| seen.insert(*name)) {
        for (name, ty) in columns.iter().filter(|(_, ty)| !decodes_natively(ty)) {
            warn!(
                "Column {} has type {} and duplicate column names prevent a text cast; \
                 values are copied from the binary encoding",
                name,
                ty.name()
            );
        }
        return None;
    }

    let projection: Vec<String> = columns
        .iter()
        .map(|(name, ty)| {
            let quoted = format!("\"{}\"", name.replace('"', "\"\""));
            if decodes_natively(ty) {
                quoted
            } else {
                format!("{q}::text AS {q}", q = quoted)
            }
        })
        .collect();
    Some(format!(
        "SELECT {} FROM ({}) AS _src",
        projection.join(", "),
        sql.trim().trim_end_matches(';')
    ))
}

/// `NOT NULL` flags for columns that come straight from a table. Expression
/// columns, and any lookup failure, give `None`.
async fn column_nullability(
    client: &Object,
    columns: &[tokio_postgres::Column],
) -> Vec<Option<bool>> {
    let tables: Vec<u32> = columns
        .iter()
        .filter_map(|c| c.table_oid())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if tables.is_empty() {
        return vec![None; columns.len()];
    }

    let rows = match client
        .query(
            "SELECT attrelid, attnum, attnotnull FROM pg_catalog.pg_attribute \
             WHERE attrelid = ANY($1) AND attnum > 0",
            &[&tables],
        )
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            debug!("Column nullability lookup failed: {}", e);
            return vec![None; columns.len()];
        }
    };

    let mut not_null = HashMap::new();
    for row in &rows {
        if let (Ok(table), Ok(attnum), Ok(flag)) = (
            row.try_get::<_, u32>(0),
            row.try_get::<_, i16>(1),
            row.try_get::<_, bool>(2),
        ) {
            not_null.insert((table, attnum), flag);
        }
    }

    columns
        .iter()
        .map(|c| match (c.table_oid(), c.column_id()) {
            (Some(table), Some(attnum)) => not_null.get(&(table, attnum)).map(|flag| !flag),
            _ => None,
        })
        .collect()
}

fn decode_row(row: &tokio_postgres::Row) -> std::result::Result<Row, tokio_postgres::Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| decode_value(row, i, col.type_()))
        .collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream> {
        let client = self.client().await?;
        let mut statement = client.prepare_cached(sql).await?;

        let nullability = column_nullability(&client, statement.columns()).await;
        let columns = statement
            .columns()
            .iter()
            .zip(nullability)
            .map(|(c, nullable)| {
                let meta = ColumnMeta::new(c.name(), c.type_().name());
                match nullable {
                    Some(nullable) => meta.with_nullable(nullable),
                    None => meta,
                }
            })
            .collect();

        let cast_sql = {
            let described: Vec<(&str, &Type)> = statement
                .columns()
                .iter()
                .map(|c| (c.name(), c.type_()))
                .collect();
            text_cast_select(sql, &described)
        };
        if let Some(cast_sql) = cast_sql {
            debug!("Reading non-native column types as text: {}", cast_sql);
            statement = client.prepare(&cast_sql).await?;
        }
        let bound = encode_params(statement.params(), params)?;

        let (tx, rx) = mpsc::channel(ROW_CHANNEL_DEPTH);
        tokio::spawn(async move {
            let refs = param_refs(&bound);
            let rows = match client.query_raw(&statement, refs).await {
                Ok(rows) => rows,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };
            futures::pin_mut!(rows);

            let mut chunk = Vec::with_capacity(ROW_CHUNK_SIZE);
            loop {
                let row = match rows.try_next().await {
                    Ok(Some(row)) => row,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                };
                match decode_row(&row) {
                    Ok(values) => chunk.push(values),
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
                if chunk.len() >= ROW_CHUNK_SIZE
                    && tx.send(Ok(std::mem::take(&mut chunk))).await.is_err()
                {
                    return;
                }
            }
            if !chunk.is_empty() {
                let _ = tx.send(Ok(chunk)).await;
            }
        });

        Ok(RowStream::new(columns, rx))
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let client = self.client().await?;
        execute_on(&client, sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn WriteSession>> {
        let client = self.client().await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PostgresSession {
            client: Some(client),
        }))
    }

    async fn close(&self) {
        self.pool.close();
        debug!("Closed PostgreSQL pool");
    }
}

async fn execute_on(client: &Object, sql: &str, params: &[SqlValue]) -> Result<u64> {
    if params.is_empty() {
        // DDL cannot always be prepared; the simple protocol accepts anything.
        client.batch_execute(sql).await?;
        return Ok(0);
    }
    let statement = client.prepare_cached(sql).await?;
    let bound = encode_params(statement.params(), params)?;
    Ok(client.execute(&statement, &param_refs(&bound)).await?)
}

/// An open transaction on one pooled client.
///
/// The client is taken on commit or rollback; a session dropped while still
/// holding it rolls back in the background before the client returns to the
/// pool.
struct PostgresSession {
    client: Option<Object>,
}

impl PostgresSession {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| CopyError::pool("transaction already finished", "PostgreSQL session"))
    }

    async fn finish(self: Box<Self>, statement: &str) -> Result<()> {
        let mut session = self;
        match session.client.take() {
            Some(client) => {
                client.batch_execute(statement).await?;
                Ok(())
            }
            None => Err(CopyError::pool(
                "transaction already finished",
                "PostgreSQL session",
            )),
        }
    }
}

#[async_trait]
impl WriteSession for PostgresSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        execute_on(self.client()?, sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = client.batch_execute("ROLLBACK").await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_params_checks_arity() {
        let err = encode_params(&[Type::INT4], &[]).err().unwrap();
        assert!(err.to_string().contains("expects 1 parameters"));
    }

    #[test]
    fn test_encode_param_conversions() {
        assert!(encode_param(&Type::INT4, &SqlValue::I64(42)).is_ok());
        assert!(encode_param(&Type::INT2, &SqlValue::I64(100_000)).is_err());
        assert!(encode_param(&Type::NUMERIC, &SqlValue::from("12.50")).is_ok());
        assert!(encode_param(&Type::TIMESTAMP, &SqlValue::from("2024-01-01 10:00:00")).is_ok());
        assert!(encode_param(&Type::UUID, &SqlValue::from("not-a-uuid")).is_err());
        assert!(encode_param(&Type::BOOL, &SqlValue::Null).is_ok());
        assert!(encode_param(&Type::TEXT, &SqlValue::I64(7)).is_ok());
    }

    #[test]
    fn test_lossy_text_accepts_any_type() {
        assert!(<LossyText as FromSql>::accepts(&Type::INET));
    }

    #[test]
    fn test_native_columns_need_no_cast() {
        let columns = [("id", &Type::INT8), ("name", &Type::VARCHAR)];
        assert!(text_cast_select("SELECT id, name FROM users", &columns).is_none());
    }

    #[test]
    fn test_non_native_columns_read_as_text() {
        let columns = [
            ("id", &Type::INT8),
            ("addr", &Type::INET),
            ("tags", &Type::TEXT_ARRAY),
            ("ttl", &Type::INTERVAL),
        ];
        assert_eq!(
            text_cast_select("SELECT * FROM hosts WHERE id > $1;", &columns).unwrap(),
            "SELECT \"id\", \"addr\"::text AS \"addr\", \"tags\"::text AS \"tags\", \
             \"ttl\"::text AS \"ttl\" FROM (SELECT * FROM hosts WHERE id > $1) AS _src"
        );
    }

    #[test]
    fn test_duplicate_names_skip_the_cast() {
        let columns = [("id", &Type::INT8), ("id", &Type::INET)];
        assert!(text_cast_select("SELECT a.id, b.id FROM a, b", &columns).is_none());
    }
}
