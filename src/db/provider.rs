//! Database provider trait
//!
//! Defines the interface the schema cache and the query executor run
//! against. This abstraction allows for:
//! - A pooled PostgreSQL implementation in production
//! - In-memory fakes in tests, so pipeline behavior can be checked
//!   without a live server

use crate::db::types::{ColumnInfo, Record};
use crate::error::DbResult;
use async_trait::async_trait;

/// Main database provider trait
///
/// Implementations are shared by every in-flight request, so they must
/// be `Send + Sync` and handle their own connection checkout.
#[async_trait]
pub trait Database: Send + Sync {
    /// List base tables in the `public` namespace
    ///
    /// # Errors
    /// Returns `DbError::SchemaLoadFailed` if introspection fails
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Columns of one `public` table, in ordinal order
    ///
    /// # Errors
    /// Returns `DbError::SchemaLoadFailed` if introspection fails
    async fn table_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Run one statement and return its rows as records
    ///
    /// # Errors
    /// Returns `DbError::QueryFailed` with the engine's message if the
    /// statement fails, or `DbError::Pool` if no connection is available
    async fn fetch_records(&self, sql: &str) -> DbResult<Vec<Record>>;
}
