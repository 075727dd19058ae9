//! One server endpoint: database enumeration, creation, lookup and removal.

use crate::backend::{Backend, Driver};
use crate::database::Database;
use crate::error::PlanetaeError;
use crate::logging::LogSink;
use crate::port::Statement;
use crate::service::session_actor::{self, Link, SessionHandle};
use crate::types::Credentials;
use futures::Stream;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of [`Client::create_database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The database was already there and `exist_ok` was set.
    AlreadyExisted,
}

pub struct Client {
    driver: Driver,
    credentials: Arc<Credentials>,
    automatically_create_database: bool,
    log: LogSink,
    link: Link,
    /// Names left in the current iteration pass; `None` until the pass starts.
    known_databases: Option<HashSet<String>>,
}

pub struct ClientBuilder {
    driver: Driver,
    credentials: Credentials,
    automatically_create_database: bool,
    log: LogSink,
}

impl ClientBuilder {
    /// Create missing databases on lookup instead of failing with `NotFound`.
    pub fn automatically_create_database(mut self, enabled: bool) -> Self {
        self.automatically_create_database = enabled;
        self
    }

    pub fn log(mut self, log: impl Into<LogSink>) -> Self {
        self.log = log.into();
        self
    }

    pub fn build(self) -> Client {
        Client {
            driver: self.driver,
            credentials: Arc::new(self.credentials),
            automatically_create_database: self.automatically_create_database,
            log: self.log,
            link: Link::Idle,
            known_databases: None,
        }
    }
}

impl Client {
    pub fn builder(driver: Driver, credentials: Credentials) -> ClientBuilder {
        ClientBuilder {
            driver,
            credentials,
            automatically_create_database: false,
            log: LogSink::none(),
        }
    }

    pub fn for_backend(backend: Backend, credentials: Credentials) -> Result<ClientBuilder, PlanetaeError> {
        Ok(Self::builder(Driver::resolve(backend)?, credentials))
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn automatically_create_database(&self) -> bool {
        self.automatically_create_database
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    /// Open the server connection. A no-op while connected; fails once the
    /// client has been closed.
    pub async fn connect(&mut self) -> Result<(), PlanetaeError> {
        if let Link::Idle = self.link {
            let conn = self
                .driver
                .connector()
                .open(&self.credentials, None)
                .await
                .inspect_err(|e| {
                    self.log
                        .scope(|| error!(backend = self.driver.name(), error = %e, "failed to connect"))
                })?;
            self.link = Link::Open(session_actor::spawn(conn, self.log.clone()).await?);
            self.log
                .scope(|| info!(backend = self.driver.name(), "client connected"));
        }
        self.link.handle().map(|_| ())
    }

    fn session(&self) -> Result<SessionHandle, PlanetaeError> {
        self.link.handle()
    }

    async fn execute(&self, sql: String) -> Result<u64, PlanetaeError> {
        let session = self.session()?;
        session
            .execute(Statement::raw(sql.as_str()))
            .await
            .inspect_err(|e| {
                self.log
                    .scope(|| error!(sql = %sql, error = %e, "statement failed"))
            })
    }

    /// Names of the user databases on the server. Requires [`Client::connect`]
    /// first; never connects on its own.
    pub async fn get_database_names(&self) -> Result<HashSet<String>, PlanetaeError> {
        let dialect = self.driver.dialect();
        let rows = self
            .session()?
            .fetch(Statement::raw(dialect.list_databases()))
            .await
            .inspect_err(|e| self.log.scope(|| error!(error = %e, "listing databases failed")))?;
        let names: HashSet<String> = rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.as_text()))
            .filter(|name| !dialect.is_system_database(name))
            .collect();
        self.log
            .scope(|| debug!(count = names.len(), "listed databases"));
        Ok(names)
    }

    /// Bind a [`Database`] to `name`, connecting first if needed.
    ///
    /// A missing database is created when the client was built with
    /// `automatically_create_database`; the lookup is retried once after that.
    /// The returned database opens its own connection on first use.
    pub async fn get_database(&mut self, name: &str) -> Result<Database, PlanetaeError> {
        self.driver.dialect().quote_ident(name)?;
        self.connect().await?;
        if !self.get_database_names().await?.contains(name) {
            if !self.automatically_create_database {
                return Err(PlanetaeError::NotFound(format!("database {name}")));
            }
            self.create_database(name, true).await?;
            if !self.get_database_names().await?.contains(name) {
                return Err(PlanetaeError::NotFound(format!("database {name}")));
            }
        }
        self.bind(name)
    }

    fn bind(&self, name: &str) -> Result<Database, PlanetaeError> {
        Database::new(
            name,
            self.driver.clone(),
            Arc::clone(&self.credentials),
            self.log.clone(),
        )
    }

    /// Create `name`. With `exist_ok` an existing database is reported as
    /// [`CreateOutcome::AlreadyExisted`]; without it the backend error surfaces.
    pub async fn create_database(
        &self,
        name: &str,
        exist_ok: bool,
    ) -> Result<CreateOutcome, PlanetaeError> {
        let dialect = self.driver.dialect();
        let sql = dialect.create_database(&dialect.quote_ident(name)?);
        match self.execute(sql).await {
            Ok(_) => {
                self.log
                    .scope(|| info!(database = name, "created database"));
                Ok(CreateOutcome::Created)
            }
            Err(e) if exist_ok && e.is_already_exists() => {
                self.log
                    .scope(|| debug!(database = name, "database already exists"));
                Ok(CreateOutcome::AlreadyExisted)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_database(&self, name: &str) -> Result<(), PlanetaeError> {
        let dialect = self.driver.dialect();
        let sql = dialect.drop_database(&dialect.quote_ident(name)?);
        self.execute(sql).await?;
        self.log
            .scope(|| info!(database = name, "dropped database"));
        Ok(())
    }

    /// Release the server connection. Closing again is a no-op. Databases
    /// already handed out keep their own connections.
    pub async fn close(&mut self) -> Result<(), PlanetaeError> {
        let previous = std::mem::replace(&mut self.link, Link::Closed);
        let Link::Open(handle) = &previous else {
            return Ok(());
        };
        handle.close().await?;
        self.log
            .scope(|| info!(backend = self.driver.name(), "client closed"));
        Ok(())
    }

    /// Next database of the current iteration pass.
    ///
    /// The first call of a pass takes one snapshot of the database names;
    /// every step removes one name from it. A drained pass keeps yielding
    /// `None` until [`Client::reset_database_cache`] is called. If the snapshot
    /// cannot be taken the error is yielded once and the pass ends.
    pub async fn next_database(&mut self) -> Option<Result<Database, PlanetaeError>> {
        if self.known_databases.is_none() {
            let snapshot = match self.snapshot_names().await {
                Ok(names) => names,
                Err(e) => {
                    self.known_databases = Some(HashSet::new());
                    return Some(Err(e));
                }
            };
            self.known_databases = Some(snapshot);
        }

        let remaining = self.known_databases.as_mut()?;
        let name = remaining.iter().next()?.clone();
        remaining.remove(&name);
        Some(self.get_database(&name).await)
    }

    async fn snapshot_names(&mut self) -> Result<HashSet<String>, PlanetaeError> {
        self.connect().await?;
        self.get_database_names().await
    }

    /// The iteration pass as a stream; order is unspecified.
    pub fn databases(&mut self) -> impl Stream<Item = Result<Database, PlanetaeError>> + '_ {
        futures::stream::unfold(self, |client| async move {
            let next = client.next_database().await?;
            Some((next, client))
        })
    }

    /// Forget the current pass so the next iteration takes a fresh snapshot.
    pub fn reset_database_cache(&mut self) {
        self.known_databases = None;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("driver", &self.driver)
            .field("credentials", &self.credentials)
            .field(
                "automatically_create_database",
                &self.automatically_create_database,
            )
            .field("connected", &self.link.is_open())
            .finish_non_exhaustive()
    }
}
