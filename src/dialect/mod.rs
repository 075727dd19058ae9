//! Per-backend SQL rules shared by the schema builder, the client and the
//! backup engine.
//!
//! A `Dialect` is injected as a value rather than specialised through
//! subclassing; backends of the same family share one implementation.

pub mod mysql;

use crate::error::PlanetaeError;
use crate::types::Value;
use std::borrow::Cow;
use std::fmt::Debug;

pub use mysql::MySqlDialect;

/// Longest identifier the supported servers accept, in characters.
pub const MAX_IDENTIFIER_LEN: usize = 64;

pub trait Dialect: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Positional placeholder, identical for every position in `?`-style dialects.
    fn placeholder(&self) -> &'static str {
        "?"
    }

    /// Marker that designates the primary key inside a column definition.
    fn primary_key_marker(&self) -> &'static str {
        "PRIMARY KEY"
    }

    /// Delimiter around a quoted identifier; doubled when it occurs inside one.
    fn identifier_quote(&self) -> char {
        '`'
    }

    /// Keywords that only work as identifiers when quoted.
    fn is_reserved(&self, word: &str) -> bool;

    /// Render `name` for splicing into statement text.
    ///
    /// Plain names pass through unchanged; anything else, reserved words
    /// included, is quoted. Only names no server accepts are rejected.
    fn quote_ident<'a>(&self, name: &'a str) -> Result<Cow<'a, str>, PlanetaeError> {
        if name.is_empty() || name.contains('\0') || name.chars().count() > MAX_IDENTIFIER_LEN {
            return Err(PlanetaeError::InvalidIdentifier(name.to_string()));
        }
        let word = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';
        let plain = name.starts_with(|c: char| !c.is_ascii_digit()) && name.chars().all(word);
        if plain && !self.is_reserved(name) {
            return Ok(Cow::Borrowed(name));
        }

        let quote = self.identifier_quote();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(quote);
        for c in name.chars() {
            if c == quote {
                out.push(quote);
            }
            out.push(c);
        }
        out.push(quote);
        Ok(Cow::Owned(out))
    }

    /// Column synthesized when a signature declares no primary key.
    fn implicit_primary_key(&self) -> (&'static str, &'static str);

    /// Trailing table options appended after the closing parenthesis.
    fn table_options(&self) -> &'static str {
        ""
    }

    fn limit_clause(&self, limit: u64) -> String {
        format!(" LIMIT {limit}")
    }

    fn list_databases(&self) -> String;
    fn is_system_database(&self, name: &str) -> bool;
    fn create_database(&self, name: &str) -> String;
    fn drop_database(&self, name: &str) -> String;
    fn use_database(&self, name: &str) -> String;
    fn list_tables(&self) -> String;
    fn describe_table(&self, table: &str) -> String;
    fn show_create_table(&self, table: &str) -> String;
    fn show_create_database(&self, name: &str) -> String;

    /// Render a value as an inline SQL literal.
    fn literal(&self, value: &Value) -> String;

    /// Whether a script block (re)creates a database.
    fn is_database_creation(&self, block: &str) -> bool {
        let head = block.trim_start().to_ascii_uppercase();
        head.starts_with("CREATE DATABASE") || head.starts_with("CREATE SCHEMA")
    }

    /// Substitute every placeholder in `sql` with the literal of its bound value.
    ///
    /// Placeholders inside quoted identifiers are left alone.
    fn inline(&self, sql: &str, params: &[Value]) -> Result<String, PlanetaeError> {
        let placeholder = self.placeholder();
        let quote = self.identifier_quote();
        let mut values = params.iter();
        let mut used = 0;
        let mut quoted = false;
        let mut out = String::with_capacity(sql.len() + params.len() * 8);
        let mut rest = sql;
        while let Some(c) = rest.chars().next() {
            if c == quote {
                quoted = !quoted;
            }
            if !quoted && rest.starts_with(placeholder) {
                let value = values.next().ok_or_else(|| {
                    PlanetaeError::Execution(format!(
                        "statement has more placeholders than the {} values given",
                        params.len()
                    ))
                })?;
                out.push_str(&self.literal(value));
                used += 1;
                rest = &rest[placeholder.len()..];
                continue;
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
        if used != params.len() {
            return Err(PlanetaeError::Execution(format!(
                "statement has {used} placeholders but {} values",
                params.len()
            )));
        }
        Ok(out)
    }
}
