//! MariaDB / MySQL driver using sqlx.
//!
//! One `MySqlConnection` per session, no pool. Statements without bound
//! values go through the text protocol so `USE`, `SHOW ...` and DDL work
//! as they would in a console; everything else is prepared and bound.

use super::{Connection, Connector, Row, RowSet, Statement};
use crate::error::PlanetaeError;
use crate::types::{Credentials, Value};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow,
};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection as _, Executor, Row as _, TypeInfo, ValueRef};
use std::str::FromStr;

// Server error numbers folded into the crate taxonomy.
const ER_DB_CREATE_EXISTS: u16 = 1007;
const ER_DB_DROP_EXISTS: u16 = 1008;
const ER_BAD_DB_ERROR: u16 = 1049;
const ER_TABLE_EXISTS_ERROR: u16 = 1050;
const ER_BAD_TABLE_ERROR: u16 = 1051;
const ER_BAD_FIELD_ERROR: u16 = 1054;
const ER_DUP_KEYNAME: u16 = 1061;
const ER_CANT_DROP_FIELD_OR_KEY: u16 = 1091;
const ER_NO_SUCH_TABLE: u16 = 1146;

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    async fn open(
        &self,
        credentials: &Credentials,
        database: Option<&str>,
    ) -> Result<Box<dyn Connection>, PlanetaeError> {
        let mut options = match credentials.connection_string.as_deref() {
            Some(url) => MySqlConnectOptions::from_str(url).map_err(classify_connect)?,
            None => MySqlConnectOptions::new()
                .host(&credentials.host)
                .port(credentials.port),
        };
        if let Some(username) = credentials.username.as_deref() {
            options = options.username(username);
        }
        if let Some(password) = credentials.password.as_deref() {
            options = options.password(password);
        }
        if let Some(database) = database {
            options = options.database(database);
        }

        let conn = options.connect().await.map_err(classify_connect)?;
        Ok(Box::new(MySqlSession { conn }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
}

#[async_trait]
impl Connection for MySqlSession {
    async fn fetch(&mut self, statement: &Statement) -> Result<RowSet, PlanetaeError> {
        let rows = if statement.params.is_empty() {
            Executor::fetch_all(&mut self.conn, sqlx::raw_sql(&statement.sql)).await
        } else {
            bind_all(sqlx::query(&statement.sql), &statement.params)
                .fetch_all(&mut self.conn)
                .await
        }
        .map_err(classify)?;

        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, PlanetaeError> {
        let result = if statement.params.is_empty() {
            Executor::execute(&mut self.conn, sqlx::raw_sql(&statement.sql)).await
        } else {
            bind_all(sqlx::query(&statement.sql), &statement.params)
                .execute(&mut self.conn)
                .await
        }
        .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn close(self: Box<Self>) -> Result<(), PlanetaeError> {
        self.conn.close().await.map_err(classify)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::UInt(u) => query.bind(*u),
            Value::Float(x) => query.bind(*x),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> Result<Row, PlanetaeError> {
    (0..row.len()).map(|i| decode_cell(row, i)).collect()
}

fn decode_cell(row: &MySqlRow, index: usize) -> Result<Value, PlanetaeError> {
    if row.try_get_raw(index).map_err(classify)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match CellKind::of(row.column(index).type_info().name()) {
        CellKind::Bool => Value::Bool(row.try_get_unchecked(index).map_err(classify)?),
        CellKind::Int => Value::Int(row.try_get_unchecked(index).map_err(classify)?),
        CellKind::UInt => Value::UInt(row.try_get_unchecked(index).map_err(classify)?),
        CellKind::Float => {
            let x: f32 = row.try_get_unchecked(index).map_err(classify)?;
            Value::Float(x.into())
        }
        CellKind::Double => Value::Float(row.try_get_unchecked(index).map_err(classify)?),
        CellKind::Date => {
            let d: NaiveDate = row.try_get_unchecked(index).map_err(classify)?;
            Value::Text(d.to_string())
        }
        CellKind::DateTime => {
            let dt: NaiveDateTime = row.try_get_unchecked(index).map_err(classify)?;
            Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        CellKind::Time => {
            let t: NaiveTime = row.try_get_unchecked(index).map_err(classify)?;
            Value::Text(t.to_string())
        }
        CellKind::Bytes => Value::Bytes(row.try_get_unchecked(index).map_err(classify)?),
        CellKind::Text => Value::Text(row.try_get_unchecked(index).map_err(classify)?),
    };
    Ok(value)
}

/// How a column's server type name is decoded into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Date,
    DateTime,
    Time,
    Bytes,
    Text,
}

impl CellKind {
    fn of(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" => Self::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => Self::Int,
            name if name.ends_with("UNSIGNED") => Self::UInt,
            "FLOAT" => Self::Float,
            "DOUBLE" => Self::Double,
            "DATE" => Self::Date,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            "TIME" => Self::Time,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => Self::Bytes,
            _ => Self::Text,
        }
    }
}

/// Fold a statement-time sqlx error into the crate taxonomy.
pub(crate) fn classify(err: sqlx::Error) -> PlanetaeError {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number)
            {
                Some(number) => from_error_number(number, message),
                None => PlanetaeError::Execution(message),
            }
        }
        e @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => PlanetaeError::Connection(e.to_string()),
        other => PlanetaeError::Execution(other.to_string()),
    }
}

fn from_error_number(number: u16, message: String) -> PlanetaeError {
    match number {
        ER_DB_CREATE_EXISTS | ER_TABLE_EXISTS_ERROR | ER_DUP_KEYNAME => {
            PlanetaeError::AlreadyExists(message)
        }
        ER_DB_DROP_EXISTS
        | ER_BAD_DB_ERROR
        | ER_BAD_TABLE_ERROR
        | ER_BAD_FIELD_ERROR
        | ER_CANT_DROP_FIELD_OR_KEY
        | ER_NO_SUCH_TABLE => PlanetaeError::NotFound(message),
        _ => PlanetaeError::Execution(message),
    }
}

/// Connect-time errors are connection errors, except a missing schema.
fn classify_connect(err: sqlx::Error) -> PlanetaeError {
    match classify(err) {
        PlanetaeError::NotFound(message) => PlanetaeError::NotFound(message),
        PlanetaeError::Connection(message) | PlanetaeError::Execution(message) => {
            PlanetaeError::Connection(message)
        }
        other => other,
    }
}
