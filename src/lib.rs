pub mod backend;
pub mod client;
pub mod config;
pub mod database;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod port;
pub mod schema;
pub mod service;
pub mod types;

pub use backend::{Backend, Driver};
pub use client::{Client, ClientBuilder, CreateOutcome};
pub use config::Config;
pub use database::{BackupArtifact, BackupMode, Database};
pub use error::PlanetaeError;
pub use logging::LogSink;
pub use port::Statement;
pub use schema::ColumnPosition;
pub use types::{Credentials, Document, Signature, TableDescription, Value};
