//! Query synthesis agent
//!
//! Turns one natural-language question into either a SQL statement or a
//! decline. The model may call the schema tools for a bounded number of
//! rounds before it must answer with plain text. Each completion call is
//! bounded by a timeout and retried with exponential backoff on transient
//! failures.

pub mod prompt;
pub mod tools;

use crate::config::Settings;
use crate::db::{Database, SchemaCache};
use crate::error::{AgentError, AgentResult, LlmError, LlmResult};
use crate::llm::{CompletionRequest, CompletionResponse, LlmBackend, Message, ToolDefinition};
use crate::sql::sanitize_sql;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use prompt::{DECLINE_SENTINEL, SYSTEM_PROMPT};
pub use tools::SchemaTool;

/// What one request may use while it runs. Built per request, never mutated.
#[derive(Clone)]
pub struct DatabaseDeps {
    pub database: Arc<dyn Database>,
    pub schema: Arc<SchemaCache>,
}

/// Outcome of a synthesis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    /// The model said the question cannot be answered; carries its text
    Declined(String),
    /// Sanitized SQL, ready for the executor
    Generated(String),
}

impl Synthesis {
    /// Classify the model's final text.
    ///
    /// Fences are stripped first. Text starting with the decline sentinel
    /// or `ERROR:` (any case) is a decline; everything else is SQL.
    pub fn classify(raw: &str) -> Self {
        let text = sanitize_sql(raw);
        if starts_with_ignore_case(&text, prompt::DECLINE_SENTINEL)
            || starts_with_ignore_case(&text, prompt::LEGACY_DECLINE_PREFIX)
        {
            Synthesis::Declined(text)
        } else {
            Synthesis::Generated(text)
        }
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Exponential backoff between completion attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Agent tuning
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub retry: RetryPolicy,
    /// Bound on each completion call
    pub timeout: Duration,
    /// Tool-call rounds allowed before an answer is required
    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
            max_tool_rounds: 8,
        }
    }
}

impl From<&Settings> for AgentConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                ..RetryPolicy::default()
            },
            timeout: settings.llm_timeout(),
            max_tool_rounds: settings.max_tool_rounds,
        }
    }
}

/// Stateless NL→SQL agent; safe to share across requests
pub struct SqlAgent {
    backend: Arc<dyn LlmBackend>,
    tools: Vec<ToolDefinition>,
    config: AgentConfig,
}

impl SqlAgent {
    pub fn new(backend: Arc<dyn LlmBackend>, config: AgentConfig) -> Self {
        Self {
            backend,
            tools: SchemaTool::definitions(),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one question to completion.
    ///
    /// # Errors
    /// `RetriesExhausted` when transient failures outlast the retry budget,
    /// `Backend` for non-retryable backend errors, `ToolRoundsExceeded`
    /// when the model never stops calling tools.
    #[tracing::instrument(skip(self, deps), fields(model = %self.backend.model_name()))]
    pub async fn run(&self, question: &str, deps: &DatabaseDeps) -> AgentResult<Synthesis> {
        let mut messages = vec![Message::user(question)];

        for round in 0..=self.config.max_tool_rounds {
            let response = self.complete_with_retry(&messages).await?;
            let calls = response.tool_calls();

            if calls.is_empty() {
                let synthesis = Synthesis::classify(&response.text());
                match &synthesis {
                    Synthesis::Generated(sql) => info!(sql = %sql, "agent generated SQL"),
                    Synthesis::Declined(reason) => info!(reason = %reason, "agent declined"),
                }
                return Ok(synthesis);
            }

            if round == self.config.max_tool_rounds {
                break;
            }

            debug!(round, calls = calls.len(), "answering tool calls");
            let results = calls
                .into_iter()
                .map(|call| tools::dispatch(call, &deps.schema))
                .collect();
            messages.push(Message::model(response.parts));
            messages.push(Message::tool_results(results));
        }

        warn!(
            "model still calling tools after {} round(s)",
            self.config.max_tool_rounds
        );
        Err(AgentError::ToolRoundsExceeded(self.config.max_tool_rounds))
    }

    async fn complete_with_retry(&self, messages: &[Message]) -> AgentResult<CompletionResponse> {
        let request = CompletionRequest {
            system_prompt: prompt::SYSTEM_PROMPT,
            messages,
            tools: &self.tools,
        };
        let attempts = self.config.retry.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let error = match self.complete_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !error.is_transient() {
                return Err(AgentError::Backend(error));
            }
            if attempt >= attempts {
                return Err(AgentError::RetriesExhausted {
                    attempts,
                    source: error,
                });
            }

            let delay = self.config.retry.delay_for_retry(attempt);
            warn!(
                "completion attempt {}/{} failed: {}; retrying in {:?}",
                attempt, attempts, error, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn complete_once(&self, request: CompletionRequest<'_>) -> LlmResult<CompletionResponse> {
        let response = tokio::time::timeout(self.config.timeout, self.backend.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.config.timeout))??;

        if response.tool_calls().is_empty() && response.text().trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty answer".to_string()));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_generated() {
        assert_eq!(
            Synthesis::classify("```sql\nSELECT 1 LIMIT 1001\n```"),
            Synthesis::Generated("SELECT 1 LIMIT 1001".into())
        );
    }

    #[test]
    fn test_classify_sentinel() {
        assert_eq!(
            Synthesis::classify("Unable to generate query"),
            Synthesis::Declined("Unable to generate query".into())
        );
        assert!(matches!(
            Synthesis::classify("  unable to generate query: no such table"),
            Synthesis::Declined(_)
        ));
    }

    #[test]
    fn test_classify_legacy_prefix() {
        assert!(matches!(
            Synthesis::classify("ERROR: no table holds salaries"),
            Synthesis::Declined(_)
        ));
        assert!(matches!(
            Synthesis::classify("error: nope"),
            Synthesis::Declined(_)
        ));
    }

    #[test]
    fn test_classify_sentinel_inside_fence() {
        assert!(matches!(
            Synthesis::classify("```\nUnable to generate query\n```"),
            Synthesis::Declined(_)
        ));
    }

    #[test]
    fn test_short_text_is_sql() {
        assert_eq!(
            Synthesis::classify("TABLE t"),
            Synthesis::Generated("TABLE t".into())
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(10), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_saturates_at_max_delay() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_retry(u32::MAX), policy.max_delay);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            max_retries: 1,
            llm_timeout_secs: 5,
            max_tool_rounds: 2,
            ..Settings::default()
        };
        let config = AgentConfig::from(&settings);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_tool_rounds, 2);
    }
}
