//! Common test utilities and helpers
//!
//! In-memory stand-ins for the database and the completion backend so the
//! whole pipeline can run without PostgreSQL or network access.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use sqlagent::agent::{AgentConfig, RetryPolicy, SqlAgent};
use sqlagent::db::{ColumnInfo, Database, Record, SchemaCache};
use sqlagent::error::{DbError, DbResult, LlmError, LlmResult};
use sqlagent::llm::{CompletionRequest, CompletionResponse, LlmBackend, Message, Part, ToolCall};
use sqlagent::service::QueryService;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// `employees(id, name, join_date)`
pub fn employees_schema() -> SchemaCache {
    SchemaCache::from_tables([(
        "employees",
        vec![
            ColumnInfo::new("id", "integer", false),
            ColumnInfo::new("name", "text", false),
            ColumnInfo::new("join_date", "date", true),
        ],
    )])
}

pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Database fake: fixed schema, one canned answer for every query
pub struct FakeDatabase {
    answer: Result<Vec<Record>, String>,
    executed: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn with_rows(rows: Vec<Record>) -> Self {
        Self {
            answer: Ok(rows),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Every query fails with `message` as the engine error
    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn list_tables(&self) -> DbResult<Vec<String>> {
        Ok(vec!["employees".to_string()])
    }

    async fn table_columns(&self, _table: &str) -> DbResult<Vec<ColumnInfo>> {
        Ok(vec![
            ColumnInfo::new("id", "integer", false),
            ColumnInfo::new("name", "text", false),
            ColumnInfo::new("join_date", "date", true),
        ])
    }

    async fn fetch_records(&self, sql: &str) -> DbResult<Vec<Record>> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.answer.clone().map_err(DbError::QueryFailed)
    }
}

/// One scripted backend step
pub enum Step {
    Reply(CompletionResponse),
    Fail(LlmError),
    /// Sleep this long, then answer with the text
    Stall(Duration, String),
}

pub fn text(answer: &str) -> Step {
    Step::Reply(CompletionResponse {
        parts: vec![Part::Text(answer.to_string())],
    })
}

pub fn tool_call(name: &str, arguments: Value) -> Step {
    Step::Reply(CompletionResponse {
        parts: vec![Part::ToolCall(ToolCall {
            name: name.to_string(),
            arguments,
            signature: None,
        })],
    })
}

pub fn list_tables() -> Step {
    tool_call("list_tables", json!({}))
}

pub fn get_table_schema(table: &str) -> Step {
    tool_call("get_table_schema", json!({ "table_name": table }))
}

pub fn server_error() -> Step {
    Step::Fail(LlmError::Api {
        status: 503,
        body: "overloaded".to_string(),
    })
}

/// Backend fake that plays back a script and records each conversation
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    /// Played when the script runs out
    repeat: Option<fn() -> Step>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `step()`
    pub fn forever(step: fn() -> Step) -> Self {
        Self {
            repeat: Some(step),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversation sent on call `n` (0-based)
    pub fn conversation(&self, n: usize) -> Vec<Message> {
        self.seen.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> LlmResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.messages.to_vec());

        let step = self.steps.lock().unwrap().pop_front();
        let step = match (step, self.repeat) {
            (Some(step), _) => step,
            (None, Some(make)) => make(),
            (None, None) => panic!("backend script exhausted"),
        };

        match step {
            Step::Reply(response) => Ok(response),
            Step::Fail(error) => Err(error),
            Step::Stall(delay, answer) => {
                tokio::time::sleep(delay).await;
                Ok(CompletionResponse {
                    parts: vec![Part::Text(answer)],
                })
            }
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Agent settings for tests: no backoff sleeps
pub fn test_agent_config() -> AgentConfig {
    AgentConfig {
        retry: RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        },
        timeout: Duration::from_secs(5),
        max_tool_rounds: 8,
    }
}

pub fn service(
    database: Option<Arc<FakeDatabase>>,
    schema: SchemaCache,
    backend: Arc<ScriptedBackend>,
    config: AgentConfig,
) -> QueryService {
    let agent = SqlAgent::new(backend, config);
    QueryService::new(
        database.map(|db| db as Arc<dyn Database>),
        Arc::new(schema),
        agent,
    )
}
