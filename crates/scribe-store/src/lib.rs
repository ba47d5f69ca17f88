//! # scribe-store
//!
//! Storage layer: dataset catalog, pooled SQLite access, schema
//! introspection, read-only query execution, and in-memory session state.
//!
//! ## Crate Position
//!
//! Depends on: scribe-core. Depended on by: scribe-engine, scribe-server.

#![deny(unsafe_code)]

pub mod catalog;
pub mod database;
pub mod error;
pub mod executor;
pub mod schema;
pub mod sessions;

pub use catalog::{
    builtin_configs, load_configs, Dataset, DatasetCatalog, DatasetConfig, DatasetSummary,
    SchemaKind, DEFAULT_DATASET,
};
pub use database::Database;
pub use error::StoreError;
pub use executor::{friendly_message, QueryExecutor, DEFAULT_MAX_ROWS};
pub use schema::{describe_database, table_columns, table_counts, ColumnInfo};
pub use sessions::{Session, SessionStore, SessionStoreConfig, DEFAULT_IDLE_TTL, DEFAULT_MAX_TURNS};
