//! Schema mutation and document CRUD against one named database.
//!
//! Layout:
//! - `mod.rs`: the `Database` handle, schema operations and document CRUD
//! - `backup.rs`: concurrent backup and sequential restore

pub mod backup;

use crate::backend::{Backend, Driver};
use crate::dialect::Dialect;
use crate::error::PlanetaeError;
use crate::logging::LogSink;
use crate::port::{RowSet, Statement};
use crate::schema::{ColumnPosition, SchemaBuilder};
use crate::service::session_actor::{self, Link, SessionHandle};
use crate::types::{Credentials, Document, Signature, TableDescription};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

pub use backup::{BackupArtifact, BackupMode};

/// One named schema behind its own lazily opened connection.
///
/// Two `Database` values for the same name never share a connection. Every
/// operation takes `&self`; statements issued concurrently (as the backup
/// fan-out does) are serialized by the session actor owning the connection.
pub struct Database {
    name: String,
    credentials: Arc<Credentials>,
    driver: Driver,
    builder: SchemaBuilder,
    log: LogSink,
    link: Mutex<Link>,
}

impl Database {
    pub fn new(
        name: impl Into<String>,
        driver: Driver,
        credentials: impl Into<Arc<Credentials>>,
        log: LogSink,
    ) -> Result<Self, PlanetaeError> {
        let name = name.into();
        driver.dialect().quote_ident(&name)?;
        Ok(Self {
            builder: driver.schema_builder(),
            name,
            credentials: credentials.into(),
            driver,
            log,
            link: Mutex::new(Link::Idle),
        })
    }

    /// Bind to `name` on a registered backend, without logging.
    pub fn for_backend(
        backend: Backend,
        credentials: Credentials,
        name: impl Into<String>,
    ) -> Result<Self, PlanetaeError> {
        Self::new(name, Driver::resolve(backend)?, credentials, LogSink::none())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    fn quoted_name(&self) -> Result<Cow<'_, str>, PlanetaeError> {
        self.dialect().quote_ident(&self.name)
    }

    fn dialect(&self) -> &dyn Dialect {
        self.driver.dialect().as_ref()
    }

    /// Open the connection now instead of on first use. Idempotent while open.
    pub async fn connect(&self) -> Result<(), PlanetaeError> {
        self.ensure_session(true).await.map(|_| ())
    }

    /// Release the connection. Closing twice is not an error; any other
    /// operation after close fails with a connection error.
    pub async fn close(&self) -> Result<(), PlanetaeError> {
        let previous = std::mem::replace(&mut *self.link.lock().await, Link::Closed);
        let Link::Open(handle) = &previous else {
            return Ok(());
        };
        handle.close().await?;
        self.log
            .scope(|| info!(database = %self.name, "connection closed"));
        Ok(())
    }

    async fn session(&self) -> Result<SessionHandle, PlanetaeError> {
        self.ensure_session(true).await
    }

    /// Open lazily; `select = false` opens without a default schema so a
    /// database that does not exist yet can still be recreated.
    async fn ensure_session(&self, select: bool) -> Result<SessionHandle, PlanetaeError> {
        let mut link = self.link.lock().await;
        if let Link::Idle = &*link {
            let database = select.then_some(self.name.as_str());
            let conn = self
                .driver
                .connector()
                .open(&self.credentials, database)
                .await
                .inspect_err(|e| {
                    self.log.scope(
                        || error!(database = %self.name, error = %e, "failed to connect"),
                    )
                })?;
            *link = Link::Open(session_actor::spawn(conn, self.log.clone()).await?);
            self.log
                .scope(|| info!(database = %self.name, backend = self.driver.name(), "connected"));
        }
        link.handle()
    }

    async fn execute(&self, statement: Statement) -> Result<u64, PlanetaeError> {
        let session = self.session().await?;
        let sql = statement.sql.clone();
        session.execute(statement).await.inspect_err(|e| {
            self.log
                .scope(|| error!(database = %self.name, sql = %sql, error = %e, "statement failed"))
        })
    }

    async fn fetch(&self, statement: Statement) -> Result<RowSet, PlanetaeError> {
        let session = self.session().await?;
        let sql = statement.sql.clone();
        session.fetch(statement).await.inspect_err(|e| {
            self.log
                .scope(|| error!(database = %self.name, sql = %sql, error = %e, "query failed"))
        })
    }

    pub async fn get_all_tables(&self) -> Result<Vec<String>, PlanetaeError> {
        let rows = self
            .fetch(Statement::raw(self.dialect().list_tables()))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.as_text()))
            .collect())
    }

    /// Create `table` from `signature`.
    ///
    /// With `force` the table is dropped first, unconditionally: existing
    /// rows are destroyed. Without it an existing table is left untouched.
    pub async fn create_table(
        &self,
        table: &str,
        signature: &Signature,
        force: bool,
    ) -> Result<(), PlanetaeError> {
        let statement = self.builder.create_table(table, signature)?;
        if force {
            self.delete_table(table).await?;
        }
        self.execute(statement).await?;
        self.log
            .scope(|| info!(database = %self.name, table, "created table"));
        Ok(())
    }

    pub async fn get_table_description(
        &self,
        table: &str,
    ) -> Result<TableDescription, PlanetaeError> {
        let rows = self
            .fetch(Statement::raw(
                self.dialect().describe_table(&self.dialect().quote_ident(table)?),
            ))
            .await?;
        Ok(TableDescription::from_rows(rows))
    }

    pub async fn add_column_to_table(
        &self,
        table: &str,
        column: &str,
        definition: &str,
        default: Option<&str>,
        position: ColumnPosition,
    ) -> Result<(), PlanetaeError> {
        let statement = self
            .builder
            .add_column(table, column, definition, default, &position)?;
        self.execute(statement).await?;
        self.log.scope(
            || info!(database = %self.name, table, column, ?position, "added column"),
        );
        Ok(())
    }

    pub async fn add_primary_key(&self, table: &str, column: &str) -> Result<(), PlanetaeError> {
        self.execute(self.builder.add_primary_key(table, column)?)
            .await?;
        self.log
            .scope(|| info!(database = %self.name, table, column, "added primary key"));
        Ok(())
    }

    pub async fn remove_column_from_table(
        &self,
        table: &str,
        column: &str,
    ) -> Result<(), PlanetaeError> {
        self.execute(self.builder.drop_column(table, column)?)
            .await?;
        self.log
            .scope(|| info!(database = %self.name, table, column, "dropped column"));
        Ok(())
    }

    /// Redefine a column's type and constraints, keeping its name.
    pub async fn change_signature_from_column(
        &self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<(), PlanetaeError> {
        self.execute(self.builder.modify_column(table, column, definition)?)
            .await?;
        self.log.scope(
            || info!(database = %self.name, table, column, definition, "changed column signature"),
        );
        Ok(())
    }

    /// Rename a column; the definition must be restated.
    pub async fn rename_column(
        &self,
        table: &str,
        old_name: &str,
        new_name: &str,
        definition: &str,
    ) -> Result<(), PlanetaeError> {
        self.execute(
            self.builder
                .rename_column(table, old_name, new_name, definition)?,
        )
        .await?;
        self.log.scope(
            || info!(database = %self.name, table, from = old_name, to = new_name, "renamed column"),
        );
        Ok(())
    }

    pub async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<(), PlanetaeError> {
        self.execute(self.builder.rename_table(old_name, new_name)?)
            .await?;
        self.log.scope(
            || info!(database = %self.name, from = old_name, to = new_name, "renamed table"),
        );
        Ok(())
    }

    /// Drop `table` if it exists.
    pub async fn delete_table(&self, table: &str) -> Result<(), PlanetaeError> {
        self.execute(self.builder.drop_table(table)?).await?;
        self.log
            .scope(|| info!(database = %self.name, table, "dropped table if it existed"));
        Ok(())
    }

    pub async fn truncate_table(&self, table: &str) -> Result<(), PlanetaeError> {
        self.execute(self.builder.truncate_table(table)?).await?;
        self.log
            .scope(|| info!(database = %self.name, table, "truncated table"));
        Ok(())
    }

    pub async fn create_index(&self, table: &str, column: &str) -> Result<(), PlanetaeError> {
        self.execute(self.builder.create_index(table, column)?)
            .await?;
        self.log
            .scope(|| info!(database = %self.name, table, column, "created index"));
        Ok(())
    }

    /// The INSERT for `document` without running it.
    pub fn build_insert(&self, table: &str, document: &Document) -> Result<Statement, PlanetaeError> {
        self.builder.insert(table, document)
    }

    pub async fn insert_document(
        &self,
        table: &str,
        document: &Document,
    ) -> Result<u64, PlanetaeError> {
        let affected = self.execute(self.build_insert(table, document)?).await?;
        self.log
            .scope(|| info!(database = %self.name, table, columns = document.len(), "inserted document"));
        Ok(affected)
    }

    /// Apply `changes` to the rows matching `query`; returns rows affected.
    pub async fn update_document(
        &self,
        table: &str,
        query: &Document,
        changes: &Document,
        limit: Option<u64>,
    ) -> Result<u64, PlanetaeError> {
        let affected = self
            .execute(self.builder.update(table, query, changes, limit)?)
            .await?;
        self.log
            .scope(|| info!(database = %self.name, table, affected, "updated documents"));
        Ok(affected)
    }

    /// Delete the rows matching `query`. Matching nothing is not an error.
    ///
    /// An empty `query` matches every row.
    pub async fn delete_document(
        &self,
        table: &str,
        query: &Document,
        limit: Option<u64>,
    ) -> Result<u64, PlanetaeError> {
        let affected = self
            .execute(self.builder.delete(table, query, limit)?)
            .await?;
        self.log
            .scope(|| info!(database = %self.name, table, affected, "deleted documents"));
        Ok(affected)
    }

    /// First row matching `query`, or `None`.
    pub async fn get_document(
        &self,
        table: &str,
        query: &Document,
    ) -> Result<Option<Document>, PlanetaeError> {
        Ok(self
            .select(table, self.builder.select(table, query, Some(1))?)
            .await?
            .into_iter()
            .next())
    }

    pub async fn get_documents(
        &self,
        table: &str,
        query: &Document,
    ) -> Result<Vec<Document>, PlanetaeError> {
        self.select(table, self.builder.select(table, query, None)?)
            .await
    }

    pub async fn get_all_documents(&self, table: &str) -> Result<Vec<Document>, PlanetaeError> {
        self.select(table, self.builder.select(table, &Document::new(), None)?)
            .await
    }

    /// Run a `SELECT *` and zip each row against the table's current column order.
    ///
    /// The description is fetched on every call; it is never cached.
    async fn select(
        &self,
        table: &str,
        statement: Statement,
    ) -> Result<Vec<Document>, PlanetaeError> {
        let description = self.get_table_description(table).await?;
        let rows = self.fetch(statement).await?;
        self.log
            .scope(|| info!(database = %self.name, table, rows = rows.len(), "fetched documents"));
        Ok(rows
            .into_iter()
            .map(|row| Document::from_row(description.names(), row))
            .collect())
    }

    /// Drop the bound database itself.
    pub async fn delete_database(&self) -> Result<(), PlanetaeError> {
        self.execute(Statement::raw(self.dialect().drop_database(&self.quoted_name()?)))
            .await?;
        self.log
            .scope(|| info!(database = %self.name, "dropped database"));
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}
