//! Error types for sqlagent
//!
//! This module defines the error hierarchy used throughout the application.
//! We use `thiserror` for library-style errors with clear error chains.

use std::io;
use std::time::Duration;

/// Main error type for the sqlagent application
#[derive(Debug, thiserror::Error)]
pub enum SqlAgentError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Language model backend errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Query synthesis errors
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to check a connection out of the pool
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Query execution failed. Carries the engine's message verbatim.
    #[error("{0}")]
    QueryFailed(String),

    /// Schema introspection failed
    #[error("Schema loading failed: {0}")]
    SchemaLoadFailed(String),

    /// Statement kind is not allowed to run
    #[error("Refusing to execute statement: {0}")]
    Rejected(String),
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file could not be read
    #[error("Configuration file not readable: {0}")]
    NotFound(String),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Required setting absent from file, environment and command line
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Language model backend errors
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the provider
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered but the payload was unusable
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The call did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Missing or rejected credentials
    #[error("Authentication failed: API key missing or rejected")]
    Authentication,
}

impl LlmError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Timeout(_) | LlmError::InvalidResponse(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Authentication => false,
        }
    }
}

/// Query synthesis errors
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Completion backend failed after the retry budget was spent
    #[error("Completion failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    /// Completion backend failed with a non-retryable error
    #[error(transparent)]
    Backend(LlmError),

    /// The model kept calling tools without producing an answer
    #[error("Model did not produce an answer within {0} tool round(s)")]
    ToolRoundsExceeded(usize),
}

/// Specialized Result type for sqlagent operations
pub type Result<T> = std::result::Result<T, SqlAgentError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for LLM backend calls
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Specialized Result type for agent runs
pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failed_preserves_engine_message() {
        let err = DbError::QueryFailed("relation \"nope\" does not exist".to_string());
        assert_eq!(err.to_string(), "relation \"nope\" does not exist");
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout(Duration::from_secs(60)).is_transient());
        assert!(LlmError::InvalidResponse("no candidates".into()).is_transient());
        assert!(
            LlmError::Api {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            LlmError::Api {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !LlmError::Api {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!LlmError::Authentication.is_transient());
    }
}
