//! Database schema cache
//!
//! A point-in-time snapshot of the `public` tables and their columns,
//! built once at startup and shared read-only with every request.

use crate::db::Database;
use crate::db::types::ColumnInfo;
use crate::error::DbResult;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Snapshot of table descriptions, or the reason none could be built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCache {
    /// Table name → rendered column description
    Ready(BTreeMap<String, String>),
    /// Introspection failed; the agent runs with no table knowledge
    Unavailable(String),
}

impl SchemaCache {
    /// Introspect every base table in `public` and render its description.
    ///
    /// Columns are fetched per table concurrently; a table's entry is only
    /// inserted once its full column list has been rendered.
    ///
    /// # Errors
    /// Propagates the first introspection failure
    pub async fn build(db: &dyn Database) -> DbResult<Self> {
        let names = db.list_tables().await?;
        let described = try_join_all(names.into_iter().map(|name| async move {
            let columns = db.table_columns(&name).await?;
            let block = render_table(&name, &columns);
            Ok::<_, crate::error::DbError>((name, block))
        }))
        .await?;

        Ok(SchemaCache::Ready(described.into_iter().collect()))
    }

    /// Like [`SchemaCache::build`], but a failure becomes
    /// [`SchemaCache::Unavailable`] instead of an error.
    pub async fn load(db: &dyn Database) -> Self {
        match Self::build(db).await {
            Ok(cache) => {
                tracing::info!("schema cache built with {} table(s)", cache.len());
                cache
            }
            Err(e) => {
                tracing::error!("schema introspection failed: {}", e);
                SchemaCache::Unavailable(e.to_string())
            }
        }
    }

    /// Build a ready cache from already-introspected tables
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<ColumnInfo>)>,
        S: Into<String>,
    {
        SchemaCache::Ready(
            tables
                .into_iter()
                .map(|(name, columns)| {
                    let name = name.into();
                    let block = render_table(&name, &columns);
                    (name, block)
                })
                .collect(),
        )
    }

    /// Cached table names (sorted; the order carries no meaning)
    pub fn table_names(&self) -> Vec<&str> {
        match self {
            SchemaCache::Ready(tables) => tables.keys().map(String::as_str).collect(),
            SchemaCache::Unavailable(_) => Vec::new(),
        }
    }

    /// Rendered description of one table, if cached
    pub fn describe(&self, table: &str) -> Option<&str> {
        match self {
            SchemaCache::Ready(tables) => tables.get(table).map(String::as_str),
            SchemaCache::Unavailable(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SchemaCache::Ready(tables) => tables.len(),
            SchemaCache::Unavailable(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SchemaCache::Ready(_))
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        SchemaCache::Ready(BTreeMap::new())
    }
}

/// Render one table's columns as the block the agent reads.
///
/// ```text
/// Schema for table 'employees':
/// - id (integer), Nullable: NO
/// - name (text), Nullable: YES
/// ```
pub fn render_table(table: &str, columns: &[ColumnInfo]) -> String {
    let mut block = format!("Schema for table '{}':\n", table);
    for col in columns {
        let _ = writeln!(
            block,
            "- {} ({}), Nullable: {}",
            col.name,
            col.data_type,
            if col.nullable { "YES" } else { "NO" }
        );
    }
    block
}
