//! Request orchestration
//!
//! One question in, one well-formed [`QueryResponse`] out: synthesize SQL,
//! execute it, and fold every failure into the response body. The only
//! thing a caller sees as an error is [`ServiceUnavailable`], returned
//! before any work starts when there is no database.

use crate::agent::{DatabaseDeps, SqlAgent, Synthesis};
use crate::db::{self, Database, Record, SchemaCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SUCCESS_SUMMARY: &str = "Query executed successfully.";
pub const FAILURE_SUMMARY: &str = "An error occurred while processing your request.";

/// Body of `POST /api/query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Body returned for every processed question. Absent fields serialize
/// as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub sql: Option<String>,
    pub data: Option<Vec<Record>>,
    pub summary: String,
    pub error: Option<String>,
}

/// The three ways a processed question can end
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Declined(String),
    Executed { sql: String, data: Vec<Record> },
    Failed(String),
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Declined(reason) => QueryResponse {
                sql: None,
                data: None,
                summary: reason,
                error: None,
            },
            QueryOutcome::Executed { sql, data } => QueryResponse {
                sql: Some(sql),
                data: Some(data),
                summary: SUCCESS_SUMMARY.to_string(),
                error: None,
            },
            QueryOutcome::Failed(error) => QueryResponse {
                sql: None,
                data: None,
                summary: FAILURE_SUMMARY.to_string(),
                error: Some(error),
            },
        }
    }
}

/// No database pool; the request was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Database not connected")]
pub struct ServiceUnavailable;

/// Long-lived state shared by every request
pub struct QueryService {
    database: Option<Arc<dyn Database>>,
    schema: Arc<SchemaCache>,
    agent: SqlAgent,
}

impl QueryService {
    pub fn new(
        database: Option<Arc<dyn Database>>,
        schema: Arc<SchemaCache>,
        agent: SqlAgent,
    ) -> Self {
        Self {
            database,
            schema,
            agent,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.database.is_some()
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    /// Answer one question.
    ///
    /// # Errors
    /// [`ServiceUnavailable`] when no database is configured. The agent is
    /// not invoked in that case.
    pub async fn answer(&self, question: &str) -> Result<QueryResponse, ServiceUnavailable> {
        let database = self.database.clone().ok_or(ServiceUnavailable)?;
        let deps = DatabaseDeps {
            database,
            schema: Arc::clone(&self.schema),
        };
        Ok(self.process(question, &deps).await.into())
    }

    async fn process(&self, question: &str, deps: &DatabaseDeps) -> QueryOutcome {
        let sql = match self.agent.run(question, deps).await {
            Ok(Synthesis::Generated(sql)) => sql,
            Ok(Synthesis::Declined(reason)) => return QueryOutcome::Declined(reason),
            Err(e) => {
                tracing::error!("query synthesis failed: {}", e);
                return QueryOutcome::Failed(e.to_string());
            }
        };

        match db::execute(deps.database.as_ref(), &sql).await {
            Ok(data) => QueryOutcome::Executed { sql, data },
            Err(e) => {
                tracing::error!(sql = %sql, "query execution failed: {}", e);
                QueryOutcome::Failed(e.to_string())
            }
        }
    }
}
