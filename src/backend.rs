//! Static registry pairing each backend variant with its dialect and connector.

use crate::dialect::{Dialect, MySqlDialect};
use crate::error::PlanetaeError;
use crate::port::{Connector, MySqlConnector};
use crate::schema::SchemaBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    MariaDb,
    MySql,
    Postgres,
    Mssql,
    Sqlite,
    MongoDb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Sql,
    Document,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::MariaDb => "mariadb",
            Backend::MySql => "mysql",
            Backend::Postgres => "postgres",
            Backend::Mssql => "mssql",
            Backend::Sqlite => "sqlite",
            Backend::MongoDb => "mongodb",
        }
    }

    pub fn family(self) -> Family {
        match self {
            Backend::MongoDb => Family::Document,
            _ => Family::Sql,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dialect and a connector that belong together.
///
/// Cheap to clone; a client hands a copy to every database it produces.
#[derive(Clone)]
pub struct Driver {
    name: &'static str,
    dialect: Arc<dyn Dialect>,
    connector: Arc<dyn Connector>,
}

impl Driver {
    pub fn new(
        name: &'static str,
        dialect: Arc<dyn Dialect>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            name,
            dialect,
            connector,
        }
    }

    /// Look up the driver registered for `backend`.
    pub fn resolve(backend: Backend) -> Result<Self, PlanetaeError> {
        match backend {
            Backend::MariaDb | Backend::MySql => Ok(Self::new(
                backend.name(),
                Arc::new(MySqlDialect),
                Arc::new(MySqlConnector),
            )),
            Backend::Postgres | Backend::Mssql | Backend::Sqlite | Backend::MongoDb => {
                Err(PlanetaeError::NotImplemented {
                    backend: backend.name(),
                    operation: "driver",
                })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn schema_builder(&self) -> SchemaBuilder {
        SchemaBuilder::new(Arc::clone(&self.dialect))
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.name)
            .field("dialect", &self.dialect.name())
            .finish_non_exhaustive()
    }
}
