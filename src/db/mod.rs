//! Database abstraction layer
//!
//! This module provides a trait-based abstraction over database operations,
//! so the schema cache and executor run the same against PostgreSQL and
//! test fakes.

pub mod executor;
pub mod postgres;
pub mod provider;
pub mod schema;
pub mod types;

// Re-export main types
pub use executor::execute;
pub use postgres::PostgresDatabase;
pub use provider::Database;
pub use schema::SchemaCache;
pub use types::{CellValue, ColumnInfo, DataType, Record};
