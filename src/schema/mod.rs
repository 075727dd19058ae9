//! Declarative schema and query construction.
//!
//! Everything here is pure: statements are built, never executed.

pub mod builder;

pub use builder::{ColumnLines, ColumnPosition, SchemaBuilder};
