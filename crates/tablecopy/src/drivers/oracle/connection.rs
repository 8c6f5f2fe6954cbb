//! Oracle connection over ODBC.
//!
//! ODBC calls block, so the connection lives on its own thread and serves
//! commands sent from async code. Result sets are fetched through a text row
//! set and typed from the column metadata the driver reports.

use std::thread;

use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::parameter::{InputParameter, VarBinaryBox, VarCharBox};
use odbc_api::{ColumnDescription, ConnectionOptions, Cursor, DataType, Environment, Nullability, ResultSetMetadata};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::OracleDialect;
use crate::core::value::parse_datetime;
use crate::core::{ColumnMeta, Connection, Dialect, Row, RowStream, SqlValue, WriteSession};
use crate::drivers::common::{ROW_CHANNEL_DEPTH, ROW_CHUNK_SIZE};
use crate::error::{CopyError, Result};

/// Longest text value fetched per cell.
const MAX_TEXT_BYTES: usize = 32_768;

/// Session formats matching how temporal values are bound as text.
const SESSION_SETUP: &str = "ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD HH24:MI:SS' \
                             NLS_TIMESTAMP_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF'";

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Ping(Reply<()>),
    Query {
        sql: String,
        params: Vec<SqlValue>,
        prelude: Reply<Vec<ColumnMeta>>,
        rows: mpsc::Sender<Result<Vec<Row>>>,
    },
    Execute {
        sql: String,
        params: Vec<SqlValue>,
        reply: Reply<u64>,
    },
    Begin(Reply<()>),
    Commit(Reply<()>),
    Rollback(Option<Reply<()>>),
    Shutdown,
}

/// Oracle connection served by a dedicated ODBC thread.
///
/// Commands are executed one at a time, in the order they are sent.
pub struct OracleConnection {
    commands: mpsc::UnboundedSender<Command>,
    dialect: OracleDialect,
}

impl OracleConnection {
    pub async fn open(dsn: &str) -> Result<Self> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let dsn = dsn.trim().to_string();

        thread::Builder::new()
            .name("odbc-oracle".to_string())
            .spawn(move || run_worker(dsn, ready_tx, receiver))?;

        ready_rx
            .await
            .map_err(|_| CopyError::connection("oracle", "ODBC worker exited during connect"))?
            .map_err(|e| CopyError::connection("oracle", e))?;

        Ok(Self {
            commands,
            dialect: OracleDialect::new(),
        })
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| CopyError::pool("ODBC worker is gone", "Oracle connection"))?;
        rx.await
            .map_err(|_| CopyError::pool("ODBC worker dropped the request", "Oracle connection"))?
    }
}

/// Rewrite `:1`, `:2`, ... as `?` markers, leaving string literals alone.
pub(crate) fn positional_markers(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
        } else if c == ':' && !in_literal && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                chars.next();
            }
            out.push('?');
        } else {
            out.push(c);
        }
    }
    out
}

fn to_parameter(value: &SqlValue) -> Box<dyn InputParameter> {
    match value {
        SqlValue::Null => Box::new(VarCharBox::null()),
        SqlValue::I64(v) => Box::new(*v),
        SqlValue::F64(v) => Box::new(*v),
        SqlValue::Bool(b) => Box::new(i64::from(*b)),
        SqlValue::Bytes(b) => Box::new(VarBinaryBox::from_vec(b.clone())),
        SqlValue::DateTimeTz(dt) => Box::new(VarCharBox::from_string(
            dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        )),
        other => Box::new(VarCharBox::from_string(other.to_string())),
    }
}

/// Native type name as Oracle would declare it.
fn native_type_name(data_type: &DataType) -> String {
    match data_type {
        DataType::TinyInt | DataType::SmallInt => "NUMBER(5)".to_string(),
        DataType::Integer => "NUMBER(10)".to_string(),
        DataType::BigInt => "NUMBER(19)".to_string(),
        DataType::Bit => "NUMBER(1)".to_string(),
        DataType::Numeric { precision, scale, .. } | DataType::Decimal { precision, scale, .. } => {
            format!("NUMBER({},{})", precision, scale)
        }
        DataType::Real | DataType::Float { .. } | DataType::Double => "BINARY_DOUBLE".to_string(),
        DataType::Date => "DATE".to_string(),
        DataType::Time { .. } => "TIME".to_string(),
        DataType::Timestamp { .. } => "TIMESTAMP".to_string(),
        DataType::Binary { .. } | DataType::Varbinary { .. } => "RAW".to_string(),
        DataType::LongVarbinary { .. } => "BLOB".to_string(),
        DataType::LongVarchar { .. } => "CLOB".to_string(),
        DataType::Char { .. } | DataType::WChar { .. } => "CHAR".to_string(),
        DataType::Varchar { .. } | DataType::WVarchar { .. } => "VARCHAR2".to_string(),
        _ => "VARCHAR2".to_string(),
    }
}

/// Type a text cell using the column's declared type.
fn typed_value(native: &str, text: Option<&str>) -> SqlValue {
    let Some(text) = text else {
        return SqlValue::Null;
    };
    let family = native.split('(').next().unwrap_or(native);
    let parsed = match family {
        "NUMBER" if native.ends_with(",0)") || !native.contains(',') => {
            text.trim().parse().ok().map(SqlValue::I64)
        }
        "NUMBER" => text.trim().parse().ok().map(SqlValue::Decimal),
        "BINARY_DOUBLE" => text.trim().parse().ok().map(SqlValue::F64),
        "DATE" | "TIMESTAMP" => parse_datetime(text).map(SqlValue::DateTime),
        _ => None,
    };
    parsed.unwrap_or_else(|| SqlValue::Text(text.to_string()))
}

fn run_worker(
    dsn: String,
    ready: oneshot::Sender<Result<()>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let env = match Environment::new() {
        Ok(env) => env,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    let conn = match env.connect_with_connection_string(&dsn, ConnectionOptions::default()) {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    if let Err(e) = conn.execute(SESSION_SETUP, ()) {
        warn!("Could not set Oracle session date formats: {}", e);
    }
    if ready.send(Ok(())).is_err() {
        return;
    }
    debug!("ODBC worker connected");

    let mut in_transaction = false;
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Ping(reply) => {
                let result = conn.execute("SELECT 1 FROM DUAL", ()).map(|_| ());
                let _ = reply.send(result.map_err(Into::into));
            }
            Command::Query {
                sql,
                params,
                prelude,
                rows,
            } => run_query(&conn, &sql, &params, prelude, rows),
            Command::Execute { sql, params, reply } => {
                let sql = positional_markers(&sql);
                let bound: Vec<Box<dyn InputParameter>> = params.iter().map(to_parameter).collect();
                let result = conn.execute(&sql, bound.as_slice()).map(|_| 0u64);
                let _ = reply.send(result.map_err(Into::into));
            }
            Command::Begin(reply) => {
                let result = if in_transaction {
                    Err(CopyError::pool("a transaction is already open", "Oracle session"))
                } else {
                    conn.set_autocommit(false).map_err(Into::into)
                };
                in_transaction = result.is_ok();
                let _ = reply.send(result);
            }
            Command::Commit(reply) => {
                let result = conn.commit().and_then(|_| conn.set_autocommit(true));
                in_transaction = false;
                let _ = reply.send(result.map_err(Into::into));
            }
            Command::Rollback(reply) => {
                if !in_transaction && reply.is_none() {
                    continue;
                }
                let result = conn.rollback().and_then(|_| conn.set_autocommit(true));
                in_transaction = false;
                if let Some(reply) = reply {
                    let _ = reply.send(result.map_err(Into::into));
                }
            }
            Command::Shutdown => break,
        }
    }
    debug!("ODBC worker stopped");
}

fn run_query(
    conn: &odbc_api::Connection<'_>,
    sql: &str,
    params: &[SqlValue],
    prelude: Reply<Vec<ColumnMeta>>,
    rows: mpsc::Sender<Result<Vec<Row>>>,
) {
    let sql = positional_markers(sql);
    let bound: Vec<Box<dyn InputParameter>> = params.iter().map(to_parameter).collect();
    let mut cursor = match conn.execute(&sql, bound.as_slice()) {
        Ok(Some(cursor)) => cursor,
        Ok(None) => {
            let _ = prelude.send(Ok(Vec::new()));
            return;
        }
        Err(e) => {
            let _ = prelude.send(Err(e.into()));
            return;
        }
    };

    let columns = match describe(&mut cursor) {
        Ok(columns) => columns,
        Err(e) => {
            let _ = prelude.send(Err(e));
            return;
        }
    };
    let natives: Vec<String> = columns.iter().map(|c| c.native_type.clone()).collect();
    if prelude.send(Ok(columns)).is_err() {
        return;
    }

    let mut buffers = match TextRowSet::for_cursor(ROW_CHUNK_SIZE, &mut cursor, Some(MAX_TEXT_BYTES)) {
        Ok(buffers) => buffers,
        Err(e) => {
            let _ = rows.blocking_send(Err(e.into()));
            return;
        }
    };
    let mut row_cursor = match cursor.bind_buffer(&mut buffers) {
        Ok(row_cursor) => row_cursor,
        Err(e) => {
            let _ = rows.blocking_send(Err(e.into()));
            return;
        }
    };

    loop {
        let batch = match row_cursor.fetch() {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(e) => {
                let _ = rows.blocking_send(Err(e.into()));
                return;
            }
        };
        let chunk: Vec<Row> = (0..batch.num_rows())
            .map(|row| {
                natives
                    .iter()
                    .enumerate()
                    .map(|(col, native)| {
                        let text = batch.at_as_str(col, row).ok().flatten();
                        typed_value(native, text)
                    })
                    .collect()
            })
            .collect();
        if rows.blocking_send(Ok(chunk)).is_err() {
            return;
        }
    }
}

fn describe(cursor: &mut impl ResultSetMetadata) -> Result<Vec<ColumnMeta>> {
    let count = cursor.num_result_cols()?;
    let mut columns = Vec::with_capacity(count.max(0) as usize);
    for i in 1..=count.max(0) as u16 {
        let name = cursor.col_name(i)?;
        let data_type = cursor.col_data_type(i)?;
        let mut description = ColumnDescription::default();
        cursor.describe_col(i, &mut description)?;
        let nullable = match description.nullability {
            Nullability::Nullable => Some(true),
            Nullability::NoNulls => Some(false),
            Nullability::Unknown => None,
        };
        let mut meta = ColumnMeta::new(name, native_type_name(&data_type));
        if let Some(nullable) = nullable {
            meta = meta.with_nullable(nullable);
        }
        columns.push(meta);
    }
    Ok(columns)
}

#[async_trait]
impl Connection for OracleConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<()> {
        self.request(Command::Ping).await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream> {
        let (rows_tx, rows_rx) = mpsc::channel(ROW_CHANNEL_DEPTH);
        let columns = self
            .request(|prelude| Command::Query {
                sql: sql.to_string(),
                params: params.to_vec(),
                prelude,
                rows: rows_tx,
            })
            .await?;
        Ok(RowStream::new(columns, rows_rx))
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.request(|reply| Command::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
            reply,
        })
        .await
    }

    async fn begin(&self) -> Result<Box<dyn WriteSession>> {
        self.request(Command::Begin).await?;
        Ok(Box::new(OracleSession {
            commands: self.commands.clone(),
            open: true,
        }))
    }

    async fn close(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct OracleSession {
    commands: mpsc::UnboundedSender<Command>,
    open: bool,
}

impl OracleSession {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| CopyError::pool("ODBC worker is gone", "Oracle session"))?;
        rx.await
            .map_err(|_| CopyError::pool("ODBC worker dropped the request", "Oracle session"))?
    }
}

#[async_trait]
impl WriteSession for OracleSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.request(|reply| Command::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
            reply,
        })
        .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut session = self;
        session.open = false;
        session.request(Command::Commit).await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut session = self;
        session.open = false;
        session.request(|reply| Command::Rollback(Some(reply))).await
    }
}

impl Drop for OracleSession {
    fn drop(&mut self) {
        if self.open {
            let _ = self.commands.send(Command::Rollback(None));
        }
    }
}
