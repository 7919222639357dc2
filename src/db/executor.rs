//! Query executor
//!
//! Runs sanitized SQL against the shared database and returns the rows as
//! field-named records.

use crate::db::Database;
use crate::db::types::Record;
use crate::error::{DbError, DbResult};
use crate::sql::guard::{self, StatementCheck};

/// Execute one statement and shape its rows into records.
///
/// Empty or whitespace-only input returns no rows without touching the
/// database. Anything that is not a single read-only statement is refused
/// before a connection is checked out.
///
/// # Errors
/// Returns `DbError::Rejected` for refused statements and passes database
/// failures through unchanged.
pub async fn execute(db: &dyn Database, sql: &str) -> DbResult<Vec<Record>> {
    if sql.trim().is_empty() {
        return Ok(Vec::new());
    }

    match guard::check(sql) {
        StatementCheck::ReadOnly => {}
        StatementCheck::Empty => return Ok(Vec::new()),
        StatementCheck::MultipleStatements => {
            return Err(DbError::Rejected(
                "only a single statement may be executed".to_string(),
            ));
        }
        StatementCheck::Disallowed(keyword) => {
            return Err(DbError::Rejected(format!(
                "{} statements are not allowed, only read-only queries",
                keyword
            )));
        }
    }

    tracing::debug!(sql = %sql, "executing generated query");
    let records = db.fetch_records(sql).await?;
    tracing::debug!("query returned {} row(s)", records.len());
    Ok(records)
}
