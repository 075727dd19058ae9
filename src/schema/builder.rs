use crate::dialect::Dialect;
use crate::error::PlanetaeError;
use crate::port::Statement;
use crate::types::{Document, Signature, Value};
use std::borrow::Cow;
use std::sync::Arc;

/// Where `ADD COLUMN` places the new column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnPosition {
    #[default]
    Last,
    First,
    After(String),
}

/// Column clauses of a `CREATE TABLE`, in signature order, plus the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLines {
    pub lines: Vec<String>,
    pub primary_key: String,
}

/// Pure translation of signatures and documents into dialect statements.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    dialect: Arc<dyn Dialect>,
}

impl SchemaBuilder {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn ident<'a>(&self, name: &'a str) -> Result<Cow<'a, str>, PlanetaeError> {
        self.dialect.quote_ident(name)
    }

    /// Render `"<column> <definition>,"` lines and pick the primary key.
    ///
    /// The column whose definition carries the primary-key marker becomes the
    /// key and loses the marker; the key is declared by a trailing clause
    /// instead. Without a marked column an implicit key column is prepended.
    pub fn column_lines(&self, signature: &Signature) -> Result<ColumnLines, PlanetaeError> {
        let marker = self.dialect.primary_key_marker();
        let mut primary_key: Option<String> = None;
        let mut lines = Vec::with_capacity(signature.len() + 1);

        for (name, definition) in signature.iter() {
            let name = self.ident(name)?;
            let definition = match strip_marker(definition, marker) {
                Some(stripped) => {
                    if let Some(existing) = primary_key.as_deref() {
                        return Err(PlanetaeError::InvalidSignature(format!(
                            "both {existing} and {name} are marked {marker}"
                        )));
                    }
                    primary_key = Some(name.to_string());
                    stripped
                }
                None => definition.trim().to_string(),
            };
            lines.push(format!("{name} {definition},"));
        }

        let primary_key = match primary_key {
            Some(pk) => pk,
            None => {
                let (id, definition) = self.dialect.implicit_primary_key();
                if signature.names().any(|n| n == id) {
                    return Err(PlanetaeError::InvalidSignature(format!(
                        "column {id} collides with the implicit primary key; mark a key explicitly"
                    )));
                }
                lines.insert(0, format!("{id} {definition},"));
                id.to_string()
            }
        };

        Ok(ColumnLines { lines, primary_key })
    }

    pub fn create_table(
        &self,
        table: &str,
        signature: &Signature,
    ) -> Result<Statement, PlanetaeError> {
        let table = self.ident(table)?;
        let ColumnLines { lines, primary_key } = self.column_lines(signature)?;
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {table} (\n");
        for line in &lines {
            sql.push_str(line);
            sql.push('\n');
        }
        sql.push_str(&format!(
            "PRIMARY KEY({primary_key})\n){};",
            self.dialect.table_options()
        ));
        Ok(Statement::raw(sql))
    }

    pub fn drop_table(&self, table: &str) -> Result<Statement, PlanetaeError> {
        Ok(Statement::raw(format!("DROP TABLE IF EXISTS {};", self.ident(table)?)))
    }

    pub fn truncate_table(&self, table: &str) -> Result<Statement, PlanetaeError> {
        Ok(Statement::raw(format!("TRUNCATE TABLE {};", self.ident(table)?)))
    }

    pub fn rename_table(&self, old: &str, new: &str) -> Result<Statement, PlanetaeError> {
        Ok(Statement::raw(format!(
            "ALTER TABLE {} RENAME TO {};",
            self.ident(old)?,
            self.ident(new)?
        )))
    }

    pub fn add_column(
        &self,
        table: &str,
        column: &str,
        definition: &str,
        default: Option<&str>,
        position: &ColumnPosition,
    ) -> Result<Statement, PlanetaeError> {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.ident(table)?,
            self.ident(column)?,
            definition.trim()
        );
        if let Some(default) = default {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        match position {
            ColumnPosition::Last => {}
            ColumnPosition::First => sql.push_str(" FIRST"),
            ColumnPosition::After(other) => {
                sql.push_str(&format!(" AFTER {}", self.ident(other)?));
            }
        }
        sql.push(';');
        Ok(Statement::raw(sql))
    }

    pub fn drop_column(&self, table: &str, column: &str) -> Result<Statement, PlanetaeError> {
        Ok(Statement::raw(format!(
            "ALTER TABLE {} DROP COLUMN {};",
            self.ident(table)?,
            self.ident(column)?
        )))
    }

    pub fn modify_column(
        &self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<Statement, PlanetaeError> {
        Ok(Statement::raw(format!(
            "ALTER TABLE {} MODIFY {} {};",
            self.ident(table)?,
            self.ident(column)?,
            definition.trim()
        )))
    }

    pub fn rename_column(
        &self,
        table: &str,
        old: &str,
        new: &str,
        definition: &str,
    ) -> Result<Statement, PlanetaeError> {
        Ok(Statement::raw(format!(
            "ALTER TABLE {} CHANGE {} {} {};",
            self.ident(table)?,
            self.ident(old)?,
            self.ident(new)?,
            definition.trim()
        )))
    }

    pub fn add_primary_key(&self, table: &str, column: &str) -> Result<Statement, PlanetaeError> {
        Ok(Statement::raw(format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({});",
            self.ident(table)?,
            self.ident(column)?
        )))
    }

    pub fn create_index(&self, table: &str, column: &str) -> Result<Statement, PlanetaeError> {
        let index = self.ident(&format!("{table}_{column}_idx"))?.into_owned();
        Ok(Statement::raw(format!(
            "CREATE INDEX {index} ON {} ({});",
            self.ident(table)?,
            self.ident(column)?
        )))
    }

    pub fn insert(&self, table: &str, document: &Document) -> Result<Statement, PlanetaeError> {
        let table = self.ident(table)?;
        let columns = document.keys().map(|key| self.ident(key)).collect::<Result<Vec<_>, _>>()?;
        let placeholders = vec![self.dialect.placeholder(); columns.len()];
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({});",
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok(Statement::with_params(sql, document.values().cloned().collect()))
    }

    /// `SELECT *` with an equality-AND predicate; an empty predicate selects every row.
    pub fn select(
        &self,
        table: &str,
        predicate: &Document,
        limit: Option<u64>,
    ) -> Result<Statement, PlanetaeError> {
        let mut sql = format!("SELECT * FROM {}", self.ident(table)?);
        let (clause, params) = self.assignments(predicate, " AND ")?;
        if !predicate.is_empty() {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        sql.push(';');
        Ok(self.with_limit(Statement::with_params(sql, params), limit))
    }

    /// Bound values are the changes followed by the predicate, matching the text.
    pub fn update(
        &self,
        table: &str,
        predicate: &Document,
        changes: &Document,
        limit: Option<u64>,
    ) -> Result<Statement, PlanetaeError> {
        if changes.is_empty() {
            return Err(PlanetaeError::InvalidDocument(
                "update requires at least one change".to_string(),
            ));
        }
        let (sets, mut params) = self.assignments(changes, ", ")?;
        let mut sql = format!("UPDATE {} SET {sets}", self.ident(table)?);
        if !predicate.is_empty() {
            let (clause, predicate_params) = self.assignments(predicate, " AND ")?;
            sql.push_str(&format!(" WHERE {clause}"));
            params.extend(predicate_params);
        }
        sql.push(';');
        Ok(self.with_limit(Statement::with_params(sql, params), limit))
    }

    pub fn delete(
        &self,
        table: &str,
        predicate: &Document,
        limit: Option<u64>,
    ) -> Result<Statement, PlanetaeError> {
        let mut sql = format!("DELETE FROM {}", self.ident(table)?);
        let (clause, params) = self.assignments(predicate, " AND ")?;
        if !predicate.is_empty() {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        sql.push(';');
        Ok(self.with_limit(Statement::with_params(sql, params), limit))
    }

    /// Append a dialect `LIMIT` to an already built statement.
    pub fn with_limit(&self, mut statement: Statement, limit: Option<u64>) -> Statement {
        if let Some(limit) = limit {
            let body = statement.sql.trim_end().trim_end_matches(';');
            statement.sql = format!("{body}{};", self.dialect.limit_clause(limit));
        }
        statement
    }

    /// `col = ?` pairs joined by `separator`, with values in the same order.
    fn assignments(
        &self,
        document: &Document,
        separator: &str,
    ) -> Result<(String, Vec<Value>), PlanetaeError> {
        let placeholder = self.dialect.placeholder();
        let mut clauses = Vec::with_capacity(document.len());
        let mut params = Vec::with_capacity(document.len());
        for (key, value) in document.iter() {
            clauses.push(format!("{} = {placeholder}", self.ident(key)?));
            params.push(value.clone());
        }
        Ok((clauses.join(separator), params))
    }
}

/// Remove the primary-key marker from a definition, if present.
fn strip_marker(definition: &str, marker: &str) -> Option<String> {
    let upper = definition.to_ascii_uppercase();
    let at = upper.find(&marker.to_ascii_uppercase())?;
    let before = definition[..at].trim_end();
    let after = definition[at + marker.len()..].trim_start();
    Some(if after.is_empty() {
        before.to_string()
    } else {
        format!("{before} {after}")
    })
}
