//! Backup and restore of a whole database as a replayable SQL script.
//!
//! The artifact is a leading newline followed by blocks, each terminated by
//! [`BLOCK_DELIMITER`]: the database creation statement, one creation
//! statement per table, then one INSERT per row with its values inlined.
//! Restore splits on the same delimiter and replays the blocks in order.

use super::Database;
use crate::error::PlanetaeError;
use crate::port::Statement;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const BLOCK_DELIMITER: &str = "\n\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupMode {
    /// Structure followed by data.
    #[default]
    Full,
    /// Creation statements only.
    StructureOnly,
    /// Row inserts only. Such an artifact cannot be fed to `restore`.
    DataOnly,
}

impl BackupMode {
    pub fn includes_structure(self) -> bool {
        !matches!(self, BackupMode::DataOnly)
    }

    pub fn includes_data(self) -> bool {
        !matches!(self, BackupMode::StructureOnly)
    }
}

/// Ordered statement blocks of a backup script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupArtifact {
    blocks: Vec<String>,
}

impl BackupArtifact {
    /// Append a block. A block containing the delimiter would be split in two
    /// on restore, so it is refused.
    pub fn push(&mut self, block: impl Into<String>) -> Result<(), PlanetaeError> {
        let block = block.into();
        if block.contains(BLOCK_DELIMITER) {
            return Err(PlanetaeError::InvalidArtifact(format!(
                "statement contains the block delimiter: {}",
                block.lines().next().unwrap_or_default()
            )));
        }
        self.blocks.push(block);
        Ok(())
    }

    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    pub fn render(&self) -> String {
        let mut out = String::from("\n");
        for block in &self.blocks {
            out.push_str(block);
            out.push_str(BLOCK_DELIMITER);
        }
        out
    }

    /// Split a script on the delimiter, dropping empty blocks.
    pub fn parse(text: &str) -> Self {
        let blocks = text
            .split(BLOCK_DELIMITER)
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .map(str::to_string)
            .collect();
        Self { blocks }
    }
}

impl Database {
    async fn database_creation_statement(&self) -> Result<String, PlanetaeError> {
        let statement =
            Statement::raw(self.dialect().show_create_database(&self.quoted_name()?));
        second_cell(self.fetch(statement).await?, &self.name)
    }

    async fn table_creation_statement(&self, table: &str) -> Result<String, PlanetaeError> {
        let statement =
            Statement::raw(self.dialect().show_create_table(&self.dialect().quote_ident(table)?));
        second_cell(self.fetch(statement).await?, table)
    }

    /// Write a backup script of this database to `path`, replacing any file there.
    ///
    /// Every creation statement and every table's rows are fetched as one
    /// group of concurrent requests; the first failure fails the whole
    /// backup and nothing is written.
    pub async fn backup(&self, path: impl AsRef<Path>, mode: BackupMode) -> Result<(), PlanetaeError> {
        let path = path.as_ref();
        self.log.scope(
            || info!(database = %self.name, path = %path.display(), ?mode, "starting backup"),
        );

        let tables = self.get_all_tables().await?;
        let (database_sql, table_sqls, documents) = futures::try_join!(
            self.database_creation_statement(),
            try_join_all(tables.iter().map(|t| self.table_creation_statement(t))),
            try_join_all(tables.iter().map(|t| self.get_all_documents(t))),
        )
        .inspect_err(|e| {
            self.log
                .scope(|| warn!(database = %self.name, error = %e, "backup aborted"))
        })?;

        let mut artifact = BackupArtifact::default();
        if mode.includes_structure() {
            artifact.push(database_sql)?;
            for sql in table_sqls {
                artifact.push(sql)?;
            }
        }
        let mut rows = 0usize;
        if mode.includes_data() {
            for (table, docs) in tables.iter().zip(&documents) {
                for document in docs {
                    let insert = self.build_insert(table, document)?;
                    artifact.push(self.dialect().inline(&insert.sql, &insert.params)?)?;
                    rows += 1;
                }
            }
        }

        write_replacing(path, &artifact.render()).await?;
        self.log.scope(|| {
            info!(
                database = %self.name,
                path = %path.display(),
                tables = tables.len(),
                rows,
                "backup written"
            )
        });
        Ok(())
    }

    /// Replace this database with the contents of the script at `path`.
    ///
    /// Destructive: the database is dropped without confirmation once the
    /// script has been read. Replay is not transactional; a failure part way
    /// leaves a partially restored database behind. The script must have been
    /// taken from a database of the same name.
    pub async fn restore(&self, path: impl AsRef<Path>) -> Result<(), PlanetaeError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let artifact = BackupArtifact::parse(&text);
        let Some((first, rest)) = artifact.blocks().split_first() else {
            return Err(PlanetaeError::InvalidArtifact(format!(
                "{} contains no statements",
                path.display()
            )));
        };
        if !self.dialect().is_database_creation(first) {
            return Err(PlanetaeError::InvalidArtifact(
                "first block is not a database creation statement".to_string(),
            ));
        }

        self.log.scope(
            || info!(database = %self.name, path = %path.display(), blocks = artifact.blocks().len(), "starting restore"),
        );

        self.ensure_session(false).await?;
        match self.delete_database().await {
            Err(e) if e.is_not_found() => {}
            other => other?,
        }

        self.execute(Statement::raw(first.as_str())).await?;
        self.execute(Statement::raw(self.dialect().use_database(&self.quoted_name()?)))
            .await?;
        for block in rest {
            self.execute(Statement::raw(block.as_str())).await?;
        }

        self.log
            .scope(|| info!(database = %self.name, "restore finished"));
        Ok(())
    }
}

/// Second column of the first row, terminated with `;`.
fn second_cell(rows: crate::port::RowSet, what: &str) -> Result<String, PlanetaeError> {
    rows.into_iter()
        .next()
        .and_then(|row| row.into_iter().nth(1))
        .and_then(|cell| cell.as_text())
        .map(|sql| format!("{};", sql.trim_end().trim_end_matches(';')))
        .ok_or_else(|| PlanetaeError::NotFound(format!("creation statement for {what}")))
}

/// Write through a sibling temporary file so `path` never holds a partial script.
async fn write_replacing(path: &Path, contents: &str) -> Result<(), PlanetaeError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = partial_path(path)?;
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn partial_path(path: &Path) -> Result<PathBuf, PlanetaeError> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            PlanetaeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file path", path.display()),
            ))
        })?
        .to_os_string();
    name.push(".partial");
    Ok(path.with_file_name(name))
}
