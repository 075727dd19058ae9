//! Plain data carried across the crate.
//!
//! Layout:
//! - `value.rs`: scalar cell values
//! - `document.rs`: ordered column to value maps (rows, changes, predicates)
//! - `signature.rs`: declarative column definitions for DDL
//! - `description.rs`: introspected table layout
//! - `credentials.rs`: server endpoint and login

pub mod credentials;
pub mod description;
pub mod document;
pub mod signature;
pub mod value;

pub use credentials::Credentials;
pub use description::TableDescription;
pub use document::Document;
pub use signature::Signature;
pub use value::Value;
