//! Language model backend
//!
//! Provider-neutral conversation types and the [`LlmBackend`] trait the
//! agent drives. One call sends the whole conversation so far and returns
//! the model's next turn, which is either text, tool calls, or both.

pub mod gemini;

use crate::error::LlmResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiClient;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
    /// Opaque provider token that must be echoed back with the call
    pub signature: Option<String>,
}

/// The answer to one [`ToolCall`]
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub name: String,
    pub content: serde_json::Value,
}

/// One piece of a message
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }
}

/// Tool declaration offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters
    pub parameters: serde_json::Value,
}

/// Everything the backend needs for one completion call
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

/// The model's next turn
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResponse {
    pub parts: Vec<Part>,
}

impl CompletionResponse {
    /// Concatenated text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// Text completion service with tool calling
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send the conversation and return the model's next turn
    async fn complete(&self, request: CompletionRequest<'_>) -> LlmResult<CompletionResponse>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
