//! In-memory server speaking the MySQL statements this crate emits.
//!
//! Good enough to run the client, CRUD and backup paths end to end: it keeps
//! databases, tables and rows in a shared map, records every statement it
//! receives and can be told to fail statements or logins on demand.
#![allow(dead_code)]

use async_trait::async_trait;
use planetae_db::dialect::{Dialect, MySqlDialect};
use planetae_db::port::{Connection, Connector, Row, RowSet, Statement};
use planetae_db::{Client, Credentials, Database, Driver, LogSink, PlanetaeError, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const WRONG_PASSWORD: &str = "wrong";

#[derive(Debug, Clone)]
struct Column {
    name: String,
    definition: String,
    default: Value,
}

impl Column {
    fn is_auto_increment(&self) -> bool {
        self.definition.to_ascii_uppercase().contains("AUTO_INCREMENT")
    }

    fn sql_type(&self) -> String {
        self.definition
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<Column>,
    primary_key: Option<String>,
    rows: Vec<Row>,
    next_id: i64,
    indexes: Vec<String>,
}

impl Table {
    fn position(&self, column: &str) -> Result<usize, PlanetaeError> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| PlanetaeError::NotFound(format!("Unknown column '{column}'")))
    }
}

#[derive(Debug, Default)]
struct Schema {
    tables: BTreeMap<String, Table>,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeMap<String, Schema>,
    journal: Vec<String>,
    failing: Vec<String>,
    refuse_connections: bool,
    opened: usize,
    live: usize,
}

/// Shared handle; every clone talks to the same server.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn driver(&self) -> Driver {
        Driver::new("memory", Arc::new(MySqlDialect), Arc::new(self.clone()))
    }

    pub fn client(&self) -> Client {
        Client::builder(self.driver(), credentials()).build()
    }

    pub fn auto_client(&self) -> Client {
        Client::builder(self.driver(), credentials())
            .automatically_create_database(true)
            .build()
    }

    /// Create a database directly, bypassing any client.
    pub fn seed_database(&self, name: &str) {
        self.lock().databases.entry(name.to_string()).or_default();
    }

    pub fn database_names(&self) -> Vec<String> {
        self.lock().databases.keys().cloned().collect()
    }

    /// Every later statement containing `needle` fails with an execution error.
    pub fn fail_when(&self, needle: &str) {
        self.lock().failing.push(needle.to_string());
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Statements received so far, in arrival order.
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    pub fn connections_opened(&self) -> usize {
        self.lock().opened
    }

    pub fn live_connections(&self) -> usize {
        self.lock().live
    }

    pub fn row_count(&self, database: &str, table: &str) -> usize {
        self.lock()
            .databases
            .get(database)
            .and_then(|s| s.tables.get(table))
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

/// Seed `name` on the server and bind a fresh, not yet connected database to it.
pub fn bind(server: &MemoryServer, name: &str) -> Database {
    server.seed_database(name);
    Database::new(name, server.driver(), credentials(), LogSink::none()).unwrap()
}

pub fn credentials() -> Credentials {
    Credentials::new("memory", 3306).with_login("root", "secret")
}

#[async_trait]
impl Connector for MemoryServer {
    async fn open(
        &self,
        credentials: &Credentials,
        database: Option<&str>,
    ) -> Result<Box<dyn Connection>, PlanetaeError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if state.refuse_connections || credentials.password.as_deref() == Some(WRONG_PASSWORD) {
            return Err(PlanetaeError::Connection(
                "Access denied for user".to_string(),
            ));
        }
        if let Some(name) = database
            && !state.databases.contains_key(name)
        {
            return Err(PlanetaeError::NotFound(format!("Unknown database '{name}'")));
        }
        state.opened += 1;
        state.live += 1;
        Ok(Box::new(MemoryConnection {
            server: self.clone(),
            current: database.map(str::to_string),
        }))
    }
}

pub struct MemoryConnection {
    server: MemoryServer,
    current: Option<String>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn fetch(&mut self, statement: &Statement) -> Result<RowSet, PlanetaeError> {
        tokio::task::yield_now().await;
        self.run(statement).map(|(rows, _)| rows)
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, PlanetaeError> {
        tokio::task::yield_now().await;
        self.run(statement).map(|(_, affected)| affected)
    }

    async fn close(self: Box<Self>) -> Result<(), PlanetaeError> {
        let mut state = self.server.lock();
        state.live = state.live.saturating_sub(1);
        Ok(())
    }
}

type Outcome = (RowSet, u64);

impl MemoryConnection {
    fn run(&mut self, statement: &Statement) -> Result<Outcome, PlanetaeError> {
        let server = self.server.clone();
        let mut state = server.lock();
        state.journal.push(statement.sql.clone());
        if let Some(needle) = state
            .failing
            .iter()
            .find(|n| statement.sql.contains(n.as_str()))
        {
            return Err(PlanetaeError::Execution(format!("injected failure on {needle}")));
        }

        let sql = statement.sql.trim().trim_end_matches(';').trim();
        let upper = sql.to_ascii_uppercase();
        if upper.starts_with("CREATE TABLE") {
            return self.create_table(&mut state, sql);
        }
        if upper.starts_with("ALTER TABLE") && upper.contains(" ADD COLUMN ") {
            return self.add_column(&mut state, sql);
        }
        let words: Vec<&str> = sql.split_whitespace().collect();
        if upper.starts_with("ALTER TABLE") && words.get(3).is_some_and(|w| w.eq_ignore_ascii_case("MODIFY")) {
            let table = self.table_mut(&mut state, &unquote(words[2]))?;
            let at = table.position(&unquote(words[4]))?;
            table.columns[at].definition = words[5..].join(" ");
            return Ok((Vec::new(), 0));
        }
        if upper.starts_with("ALTER TABLE") && words.get(3).is_some_and(|w| w.eq_ignore_ascii_case("CHANGE")) {
            let table = self.table_mut(&mut state, &unquote(words[2]))?;
            let old_name = unquote(words[4]);
            let at = table.position(&old_name)?;
            let new_name = unquote(words[5]);
            if table.primary_key.as_deref() == Some(old_name.as_str()) {
                table.primary_key = Some(new_name.clone());
            }
            table.columns[at].name = new_name;
            table.columns[at].definition = words[6..].join(" ");
            return Ok((Vec::new(), 0));
        }

        let mut cur = Cursor::new(tokenize(sql, &statement.params)?);
        self.dispatch(&mut state, &mut cur)
    }

    fn dispatch(&mut self, state: &mut ServerState, cur: &mut Cursor) -> Result<Outcome, PlanetaeError> {
        let head = cur.word()?;
        match head.as_str() {
            "SHOW" => self.show(state, cur),
            "DESCRIBE" => {
                let table = self.table(state, &cur.ident()?)?;
                let rows = table
                    .columns
                    .iter()
                    .map(|c| {
                        let key = if table.primary_key.as_deref() == Some(c.name.as_str()) {
                            "PRI"
                        } else {
                            ""
                        };
                        vec![
                            Value::Text(c.name.clone()),
                            Value::Text(c.sql_type()),
                            Value::Text(if c.definition.to_ascii_uppercase().contains("NOT NULL") { "NO" } else { "YES" }.to_string()),
                            Value::Text(key.to_string()),
                            c.default.clone(),
                            Value::Text(if c.is_auto_increment() { "auto_increment" } else { "" }.to_string()),
                        ]
                    })
                    .collect();
                Ok((rows, 0))
            }
            "USE" => {
                let name = cur.ident()?;
                if !state.databases.contains_key(&name) {
                    return Err(PlanetaeError::NotFound(format!("Unknown database '{name}'")));
                }
                self.current = Some(name);
                Ok((Vec::new(), 0))
            }
            "CREATE" => match cur.word()?.as_str() {
                "DATABASE" => {
                    let name = cur.ident()?;
                    if state.databases.contains_key(&name) {
                        return Err(PlanetaeError::AlreadyExists(format!(
                            "Can't create database '{name}'; database exists"
                        )));
                    }
                    state.databases.insert(name, Schema::default());
                    Ok((Vec::new(), 1))
                }
                "INDEX" => {
                    let index = cur.ident()?;
                    cur.keyword("ON")?;
                    let table = self.table_mut(state, &cur.ident()?)?;
                    cur.punct('(')?;
                    table.position(&cur.ident()?)?;
                    if table.indexes.contains(&index) {
                        return Err(PlanetaeError::AlreadyExists(format!("Duplicate key name '{index}'")));
                    }
                    table.indexes.push(index);
                    Ok((Vec::new(), 0))
                }
                other => Err(syntax(other)),
            },
            "DROP" => match cur.word()?.as_str() {
                "DATABASE" => {
                    let name = cur.ident()?;
                    if state.databases.remove(&name).is_none() {
                        return Err(PlanetaeError::NotFound(format!(
                            "Can't drop database '{name}'; database doesn't exist"
                        )));
                    }
                    if self.current.as_deref() == Some(name.as_str()) {
                        self.current = None;
                    }
                    Ok((Vec::new(), 0))
                }
                "TABLE" => {
                    let if_exists = cur.eat_keyword("IF");
                    if if_exists {
                        cur.keyword("EXISTS")?;
                    }
                    let name = cur.ident()?;
                    let schema = self.schema_mut(state)?;
                    if schema.tables.remove(&name).is_none() && !if_exists {
                        return Err(PlanetaeError::NotFound(format!("Unknown table '{name}'")));
                    }
                    Ok((Vec::new(), 0))
                }
                other => Err(syntax(other)),
            },
            "TRUNCATE" => {
                cur.keyword("TABLE")?;
                let table = self.table_mut(state, &cur.ident()?)?;
                table.rows.clear();
                table.next_id = 0;
                Ok((Vec::new(), 0))
            }
            "ALTER" => {
                cur.keyword("TABLE")?;
                let name = cur.ident()?;
                match cur.word()?.as_str() {
                    "RENAME" => {
                        cur.keyword("TO")?;
                        let to = cur.ident()?;
                        let schema = self.schema_mut(state)?;
                        if schema.tables.contains_key(&to) {
                            return Err(PlanetaeError::AlreadyExists(format!("Table '{to}' already exists")));
                        }
                        let table = schema
                            .tables
                            .remove(&name)
                            .ok_or_else(|| PlanetaeError::NotFound(format!("Table '{name}' doesn't exist")))?;
                        schema.tables.insert(to, table);
                        Ok((Vec::new(), 0))
                    }
                    "ADD" => {
                        cur.keyword("PRIMARY")?;
                        cur.keyword("KEY")?;
                        cur.punct('(')?;
                        let column = cur.ident()?;
                        let table = self.table_mut(state, &name)?;
                        table.position(&column)?;
                        if table.primary_key.is_some() {
                            return Err(PlanetaeError::Execution("Multiple primary key defined".to_string()));
                        }
                        table.primary_key = Some(column);
                        Ok((Vec::new(), 0))
                    }
                    "DROP" => {
                        cur.keyword("COLUMN")?;
                        let column = cur.ident()?;
                        let table = self.table_mut(state, &name)?;
                        let at = table.position(&column)?;
                        table.columns.remove(at);
                        for row in &mut table.rows {
                            row.remove(at);
                        }
                        if table.primary_key.as_deref() == Some(column.as_str()) {
                            table.primary_key = None;
                        }
                        Ok((Vec::new(), 0))
                    }
                    other => Err(syntax(other)),
                }
            }
            "INSERT" => {
                cur.keyword("INTO")?;
                let table = self.table_mut(state, &cur.ident()?)?;
                cur.punct('(')?;
                let columns = cur.list(Cursor::ident)?;
                cur.keyword("VALUES")?;
                cur.punct('(')?;
                let values = cur.list(Cursor::value)?;
                if columns.len() != values.len() {
                    return Err(PlanetaeError::Execution("Column count doesn't match value count".to_string()));
                }
                insert(table, columns, values)?;
                Ok((Vec::new(), 1))
            }
            "SELECT" => {
                cur.punct('*')?;
                cur.keyword("FROM")?;
                let table = self.table(state, &cur.ident()?)?;
                let predicate = cur.predicate(table)?;
                let limit = cur.limit()?;
                let rows = table
                    .rows
                    .iter()
                    .filter(|row| matches(row, &predicate))
                    .take(limit)
                    .cloned()
                    .collect();
                Ok((rows, 0))
            }
            "UPDATE" => {
                let table = self.table_mut(state, &cur.ident()?)?;
                cur.keyword("SET")?;
                let mut changes = Vec::new();
                loop {
                    let at = table.position(&cur.ident()?)?;
                    cur.punct('=')?;
                    changes.push((at, cur.value()?));
                    if !cur.eat_punct(',') {
                        break;
                    }
                }
                let predicate = cur.predicate(table)?;
                let limit = cur.limit()?;
                let mut affected = 0;
                for row in table.rows.iter_mut().filter(|row| matches(row, &predicate)).take(limit) {
                    let mut changed = false;
                    for (at, value) in &changes {
                        if !same(&row[*at], value) {
                            row[*at] = value.clone();
                            changed = true;
                        }
                    }
                    affected += u64::from(changed);
                }
                Ok((Vec::new(), affected))
            }
            "DELETE" => {
                cur.keyword("FROM")?;
                let table = self.table_mut(state, &cur.ident()?)?;
                let predicate = cur.predicate(table)?;
                let limit = cur.limit()?;
                let before = table.rows.len();
                let mut removed = 0;
                table.rows.retain(|row| {
                    if removed < limit && matches(row, &predicate) {
                        removed += 1;
                        false
                    } else {
                        true
                    }
                });
                Ok((Vec::new(), (before - table.rows.len()) as u64))
            }
            other => Err(syntax(other)),
        }
    }

    fn show(&mut self, state: &mut ServerState, cur: &mut Cursor) -> Result<Outcome, PlanetaeError> {
        match cur.word()?.as_str() {
            "DATABASES" => {
                let mut rows = vec![vec![Value::Text("information_schema".to_string())]];
                rows.extend(state.databases.keys().map(|n| vec![Value::Text(n.clone())]));
                Ok((rows, 0))
            }
            "TABLES" => {
                let schema = self.schema(state)?;
                let rows = schema
                    .tables
                    .keys()
                    .map(|t| vec![Value::Text(t.clone())])
                    .collect();
                Ok((rows, 0))
            }
            "CREATE" => match cur.word()?.as_str() {
                "TABLE" => {
                    let name = cur.ident()?;
                    let table = self.table(state, &name)?;
                    Ok((vec![vec![Value::Text(name.clone()), Value::Text(render_table(&name, table))]], 0))
                }
                "DATABASE" => {
                    let name = cur.ident()?;
                    if !state.databases.contains_key(&name) {
                        return Err(PlanetaeError::NotFound(format!("Unknown database '{name}'")));
                    }
                    let sql = format!(
                        "CREATE DATABASE {} /*!40100 DEFAULT CHARACTER SET utf8mb4 */",
                        quote(&name)
                    );
                    Ok((vec![vec![Value::Text(name), Value::Text(sql)]], 0))
                }
                other => Err(syntax(other)),
            },
            other => Err(syntax(other)),
        }
    }

    fn create_table(&mut self, state: &mut ServerState, sql: &str) -> Result<Outcome, PlanetaeError> {
        let open = sql.find('(').ok_or_else(|| syntax(sql))?;
        let close = sql.rfind(')').ok_or_else(|| syntax(sql))?;
        let head: Vec<&str> = sql[..open].split_whitespace().collect();
        let if_not_exists = head.len() == 6;
        let name = unquote(head.last().ok_or_else(|| syntax(sql))?);

        let mut table = Table::default();
        for line in sql[open + 1..close].lines() {
            let line = line.trim().trim_end_matches(',');
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("PRIMARY KEY") {
                let key = rest.trim().trim_start_matches('(').trim_end_matches(')');
                table.primary_key = Some(unquote(key));
                continue;
            }
            let (column, definition) = line.split_once(' ').ok_or_else(|| syntax(line))?;
            let (definition, default) = match definition.rfind(" DEFAULT ") {
                Some(at) => {
                    let literal = &definition[at + " DEFAULT ".len()..];
                    let value = Cursor::new(tokenize(literal, &[])?).value()?;
                    (definition[..at].to_string(), value)
                }
                None => (definition.to_string(), Value::Null),
            };
            table.columns.push(Column {
                name: unquote(column),
                definition,
                default,
            });
        }

        let schema = self.schema_mut(state)?;
        if schema.tables.contains_key(&name) {
            if if_not_exists {
                return Ok((Vec::new(), 0));
            }
            return Err(PlanetaeError::AlreadyExists(format!("Table '{name}' already exists")));
        }
        schema.tables.insert(name, table);
        Ok((Vec::new(), 0))
    }

    fn add_column(&mut self, state: &mut ServerState, sql: &str) -> Result<Outcome, PlanetaeError> {
        let words: Vec<&str> = sql.split_whitespace().collect();
        let table = self.table_mut(state, &unquote(words[2]))?;
        let column = unquote(words[5]);
        if table.position(&column).is_ok() {
            return Err(PlanetaeError::Execution(format!("Duplicate column name '{column}'")));
        }
        let mut rest = &words[6..];

        let mut at = table.columns.len();
        if rest.last() == Some(&"FIRST") {
            at = 0;
            rest = &rest[..rest.len() - 1];
        } else if rest.len() >= 2 && rest[rest.len() - 2] == "AFTER" {
            at = table.position(&unquote(rest[rest.len() - 1]))? + 1;
            rest = &rest[..rest.len() - 2];
        }

        let (definition, default) = match rest.iter().position(|w| *w == "DEFAULT") {
            Some(d) => {
                let literal = rest[d + 1..].join(" ");
                (rest[..d].join(" "), Cursor::new(tokenize(&literal, &[])?).value()?)
            }
            None => (rest.join(" "), Value::Null),
        };

        for row in &mut table.rows {
            row.insert(at, default.clone());
        }
        table.columns.insert(
            at,
            Column {
                name: column,
                definition,
                default,
            },
        );
        Ok((Vec::new(), 0))
    }

    fn schema<'s>(&self, state: &'s ServerState) -> Result<&'s Schema, PlanetaeError> {
        let name = self
            .current
            .as_deref()
            .ok_or_else(|| PlanetaeError::Execution("No database selected".to_string()))?;
        state
            .databases
            .get(name)
            .ok_or_else(|| PlanetaeError::NotFound(format!("Unknown database '{name}'")))
    }

    fn schema_mut<'s>(&self, state: &'s mut ServerState) -> Result<&'s mut Schema, PlanetaeError> {
        let name = self
            .current
            .as_deref()
            .ok_or_else(|| PlanetaeError::Execution("No database selected".to_string()))?;
        state
            .databases
            .get_mut(name)
            .ok_or_else(|| PlanetaeError::NotFound(format!("Unknown database '{name}'")))
    }

    fn table<'s>(&self, state: &'s ServerState, name: &str) -> Result<&'s Table, PlanetaeError> {
        self.schema(state)?
            .tables
            .get(name)
            .ok_or_else(|| PlanetaeError::NotFound(format!("Table '{name}' doesn't exist")))
    }

    fn table_mut<'s>(&self, state: &'s mut ServerState, name: &str) -> Result<&'s mut Table, PlanetaeError> {
        self.schema_mut(state)?
            .tables
            .get_mut(name)
            .ok_or_else(|| PlanetaeError::NotFound(format!("Table '{name}' doesn't exist")))
    }
}

fn insert(table: &mut Table, columns: Vec<String>, values: Vec<Value>) -> Result<(), PlanetaeError> {
    let mut row: Row = table.columns.iter().map(|c| c.default.clone()).collect();
    for (column, value) in columns.iter().zip(values) {
        let at = table.position(column)?;
        row[at] = value;
    }

    if let Some(at) = table.columns.iter().position(Column::is_auto_increment) {
        match row[at].as_i64() {
            Some(given) => table.next_id = table.next_id.max(given),
            None => {
                table.next_id += 1;
                row[at] = Value::Int(table.next_id);
            }
        }
    }

    if let Some(pk) = table.primary_key.as_deref() {
        let at = table.position(pk)?;
        if table.rows.iter().any(|r| same(&r[at], &row[at])) {
            return Err(PlanetaeError::Execution(format!(
                "Duplicate entry '{}' for key 'PRIMARY'",
                row[at]
            )));
        }
    }
    table.rows.push(row);
    Ok(())
}

fn render_table(name: &str, table: &Table) -> String {
    let dialect = MySqlDialect;
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| match &c.default {
            Value::Null => format!("  {} {}", quote(&c.name), c.definition),
            default => format!("  {} {} DEFAULT {}", quote(&c.name), c.definition, dialect.literal(default)),
        })
        .collect();
    if let Some(pk) = &table.primary_key {
        lines.push(format!("  PRIMARY KEY({})", quote(pk)));
    }
    format!("CREATE TABLE {} (\n{}\n) DEFAULT CHARSET=utf8mb4", quote(name), lines.join(",\n"))
}

/// Servers always quote names in the DDL they hand back.
fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn unquote(word: &str) -> String {
    match word.strip_prefix('`').and_then(|w| w.strip_suffix('`')) {
        Some(inner) => inner.replace("``", "`"),
        None => word.to_string(),
    }
}

fn matches(row: &Row, predicate: &[(usize, Value)]) -> bool {
    predicate.iter().all(|(at, value)| same(&row[*at], value))
}

/// SQL equality: NULL never matches, integers compare across signedness.
fn same(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn syntax(near: &str) -> PlanetaeError {
    PlanetaeError::Execution(format!("You have an error in your SQL syntax near '{near}'"))
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Lit(Value),
    Punct(char),
}

/// Split into words, literals and punctuation, binding `?` to `params` in order.
fn tokenize(sql: &str, params: &[Value]) -> Result<Vec<Tok>, PlanetaeError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut params = params.iter();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
        } else if (c == 'X' || c == 'x') && chars.get(i + 1) == Some(&'\'') {
            let start = i + 2;
            let end = start + chars[start..].iter().position(|&c| c == '\'').ok_or_else(|| syntax(sql))?;
            let hex: String = chars[start..end].iter().collect();
            let bytes = (0..hex.len())
                .step_by(2)
                .map(|k| u8::from_str_radix(&hex[k..k + 2], 16))
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| syntax(&hex))?;
            toks.push(Tok::Lit(Value::Bytes(bytes)));
            i = end + 1;
        } else if c == '\'' {
            let mut text = String::new();
            i += 1;
            loop {
                let c = *chars.get(i).ok_or_else(|| syntax(sql))?;
                match c {
                    '\\' => {
                        let escaped = *chars.get(i + 1).ok_or_else(|| syntax(sql))?;
                        text.push(match escaped {
                            '0' => '\0',
                            'n' => '\n',
                            'r' => '\r',
                            'Z' => '\u{1a}',
                            other => other,
                        });
                        i += 2;
                    }
                    '\'' if chars.get(i + 1) == Some(&'\'') => {
                        text.push('\'');
                        i += 2;
                    }
                    '\'' => {
                        i += 1;
                        break;
                    }
                    other => {
                        text.push(other);
                        i += 1;
                    }
                }
            }
            toks.push(Tok::Lit(Value::Text(text)));
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '-' && matches!(chars[i - 1], 'e' | 'E')) {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = match text.parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => match text.parse::<u64>() {
                    Ok(n) => Value::UInt(n),
                    Err(_) => Value::Float(text.parse::<f64>().map_err(|_| syntax(&text))?),
                },
            };
            toks.push(Tok::Lit(value));
        } else if c == '`' {
            let mut name = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    Some('`') if chars.get(i + 1) == Some(&'`') => {
                        name.push('`');
                        i += 2;
                    }
                    Some('`') => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        name.push(other);
                        i += 1;
                    }
                    None => return Err(syntax(sql)),
                }
            }
            toks.push(Tok::Word(name));
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            toks.push(Tok::Word(chars[start..i].iter().collect()));
        } else if c == '?' {
            let value = params
                .next()
                .ok_or_else(|| PlanetaeError::Execution("missing bound value".to_string()))?;
            toks.push(Tok::Lit(value.clone()));
            i += 1;
        } else {
            toks.push(Tok::Punct(c));
            i += 1;
        }
    }
    if params.next().is_some() {
        return Err(PlanetaeError::Execution("too many bound values".to_string()));
    }
    Ok(toks)
}

struct Cursor {
    toks: Vec<Tok>,
    pos: usize,
}

impl Cursor {
    fn new(toks: Vec<Tok>) -> Self {
        Self { toks, pos: 0 }
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    /// Next word, upper-cased.
    fn word(&mut self) -> Result<String, PlanetaeError> {
        match self.next() {
            Some(Tok::Word(w)) => Ok(w.to_ascii_uppercase()),
            other => Err(syntax(&format!("{other:?}"))),
        }
    }

    fn ident(&mut self) -> Result<String, PlanetaeError> {
        match self.next() {
            Some(Tok::Word(w)) => Ok(w),
            other => Err(syntax(&format!("{other:?}"))),
        }
    }

    fn keyword(&mut self, kw: &str) -> Result<(), PlanetaeError> {
        let w = self.word()?;
        if w == kw { Ok(()) } else { Err(syntax(&w)) }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn punct(&mut self, c: char) -> Result<(), PlanetaeError> {
        match self.next() {
            Some(Tok::Punct(p)) if p == c => Ok(()),
            other => Err(syntax(&format!("{other:?}"))),
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Tok::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Value, PlanetaeError> {
        match self.next() {
            Some(Tok::Lit(v)) => Ok(v),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(Value::Null),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("TRUE") => Ok(Value::Bool(true)),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("FALSE") => Ok(Value::Bool(false)),
            other => Err(syntax(&format!("{other:?}"))),
        }
    }

    /// Comma separated items up to and including the closing parenthesis.
    fn list<T>(&mut self, item: fn(&mut Self) -> Result<T, PlanetaeError>) -> Result<Vec<T>, PlanetaeError> {
        let mut out = Vec::new();
        if self.eat_punct(')') {
            return Ok(out);
        }
        loop {
            out.push(item(self)?);
            if self.eat_punct(')') {
                return Ok(out);
            }
            self.punct(',')?;
        }
    }

    fn predicate(&mut self, table: &Table) -> Result<Vec<(usize, Value)>, PlanetaeError> {
        let mut out = Vec::new();
        if !self.eat_keyword("WHERE") {
            return Ok(out);
        }
        loop {
            let at = table.position(&self.ident()?)?;
            self.punct('=')?;
            out.push((at, self.value()?));
            if !self.eat_keyword("AND") {
                return Ok(out);
            }
        }
    }

    fn limit(&mut self) -> Result<usize, PlanetaeError> {
        if !self.eat_keyword("LIMIT") {
            return Ok(usize::MAX);
        }
        match self.value()?.as_i64() {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => Err(syntax("LIMIT")),
        }
    }
}
