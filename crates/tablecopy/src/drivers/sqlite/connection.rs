//! SQLite connection via sqlx.

use std::str::FromStr;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Executor, Row as _, Sqlite, Transaction, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{ColumnMeta, Connection, Dialect, Row, RowStream, SqlValue, WriteSession};
use crate::drivers::common::{MAX_POOL_SIZE, POOL_MAX_LIFETIME, ROW_CHANNEL_DEPTH, ROW_CHUNK_SIZE};
use crate::drivers::generic::GenericDialect;
use crate::error::{CopyError, Result};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Pooled SQLite connection.
pub struct SqliteConnection {
    pool: SqlitePool,
    dialect: GenericDialect,
}

impl SqliteConnection {
    /// Open a pool over a database file (created when missing).
    ///
    /// Accepts a bare path, a `file:` path or a `sqlite:` URL.
    pub async fn open(dsn: &str) -> Result<Self> {
        let (options, max_connections) = connect_options(dsn)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .max_lifetime(POOL_MAX_LIFETIME)
            .connect_with(options)
            .await
            .map_err(|e| CopyError::connection("sqlite", e))?;

        debug!("Opened SQLite pool ({} connections max)", max_connections);
        Ok(Self {
            pool,
            dialect: GenericDialect::sqlite(),
        })
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| CopyError::pool(e, "acquiring SQLite connection"))
    }
}

fn connect_options(dsn: &str) -> Result<(SqliteConnectOptions, u32)> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(CopyError::connection("sqlite", "empty database path"));
    }

    // Every connection to an in-memory database sees its own database.
    let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");
    let options = if dsn.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(dsn).map_err(|e| CopyError::connection("sqlite", e))?
    } else {
        let path = dsn.strip_prefix("file:").unwrap_or(dsn);
        let path = path.split('?').next().unwrap_or(path);
        SqliteConnectOptions::new().filename(path)
    };

    let max_connections = if in_memory { 1 } else { MAX_POOL_SIZE };
    Ok((options.create_if_missing(true), max_connections))
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        other => query.bind(other.to_string()),
    }
}

fn build_query<'q>(sql: &'q str, params: &[SqlValue]) -> SqliteQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

/// Decode by the storage class of each value; SQLite columns are not typed.
fn decode_row(row: &SqliteRow) -> std::result::Result<Row, sqlx::Error> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn decode_value(row: &SqliteRow, i: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let kind = {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        raw.type_info().name().to_uppercase()
    };

    match kind.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(i).map(SqlValue::I64),
        "REAL" => row.try_get::<f64, _>(i).map(SqlValue::F64),
        "BLOB" => row.try_get::<Vec<u8>, _>(i).map(SqlValue::Bytes),
        _ => match row.try_get::<String, _>(i) {
            Ok(s) => Ok(SqlValue::Text(s)),
            Err(_) => row
                .try_get_unchecked::<Vec<u8>, _>(i)
                .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).into_owned())),
        },
    }
}

/// Column names, declared types and inferred nullability of a statement.
async fn describe(conn: &mut PoolConnection<Sqlite>, sql: &str) -> Result<Vec<ColumnMeta>> {
    let described = (&mut **conn).describe(sql).await?;
    Ok(described
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let meta = ColumnMeta::new(c.name(), c.type_info().name());
            match described.nullable(i) {
                Some(nullable) => meta.with_nullable(nullable),
                None => meta,
            }
        })
        .collect())
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream> {
        let mut conn = self.acquire().await?;
        let columns = describe(&mut conn, sql).await?;

        let (tx, rx) = mpsc::channel(ROW_CHANNEL_DEPTH);
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::spawn(async move {
            let mut rows = build_query(&sql, &params).fetch(&mut *conn);
            let mut chunk = Vec::with_capacity(ROW_CHUNK_SIZE);
            loop {
                match rows.try_next().await {
                    Ok(Some(row)) => match decode_row(&row) {
                        Ok(values) => chunk.push(values),
                        Err(e) => {
                            let _ = tx.send(Err(e.into())).await;
                            return;
                        }
                    },
                    Ok(None) => break,
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
        let result = build_query(sql, params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn WriteSession>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteSession { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Closed SQLite pool");
    }
}

/// Write transaction on one pooled connection. sqlx rolls back on drop.
struct SqliteSession {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl WriteSession for SqliteSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = build_query(sql, params).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
