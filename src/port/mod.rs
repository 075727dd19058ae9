//! Connection Port: the boundary to each backend's wire driver.
//!
//! Layout:
//! - `mod.rs`: `Connector`/`Connection` traits and the `Statement` pair
//! - `mysql.rs`: sqlx-backed driver for MariaDB and MySQL
//!
//! A `Connection` is used by exactly one session actor at a time, so
//! implementations never see two statements in flight.

pub mod mysql;

use crate::error::PlanetaeError;
use crate::types::{Credentials, Value};
use async_trait::async_trait;

pub use mysql::MySqlConnector;

pub type Row = Vec<Value>;
pub type RowSet = Vec<Row>;

/// Statement text and its positional bound values.
///
/// The i-th placeholder in `sql` binds `params[i]`; builders produce both
/// halves together and nothing reorders them afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement without bound values.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open one physical connection, optionally selecting `database`.
    async fn open(
        &self,
        credentials: &Credentials,
        database: Option<&str>,
    ) -> Result<Box<dyn Connection>, PlanetaeError>;
}

#[async_trait]
pub trait Connection: Send {
    /// Run a row-returning statement and collect every row.
    async fn fetch(&mut self, statement: &Statement) -> Result<RowSet, PlanetaeError>;

    /// Run a statement for its effect; returns rows affected.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, PlanetaeError>;

    async fn close(self: Box<Self>) -> Result<(), PlanetaeError>;
}
