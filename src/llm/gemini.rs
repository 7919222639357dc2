//! Google Gemini backend
//!
//! Talks to the `generateContent` endpoint with function calling enabled.
//! Wire types are private; the rest of the crate only sees the neutral
//! types from [`crate::llm`].

use super::{
    CompletionRequest, CompletionResponse, LlmBackend, Message, Part, Role, ToolCall,
    ToolDefinition,
};
use crate::error::{LlmError, LlmResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

/// One part. Exactly one of the payload fields is set.
#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
    #[serde(default)]
    total_token_count: Option<u32>,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> LlmResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Authentication);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint root (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LlmBackend for GeminiClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> LlmResult<CompletionResponse> {
        let body = build_request(&request);
        let url = self.endpoint();

        debug!(
            url = %url,
            messages = request.messages.len(),
            "sending request to Gemini"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            warn!("Gemini rejected the API key ({})", status);
            return Err(LlmError::Authentication);
        }
        if !status.is_success() {
            warn!("Gemini API error: {} - {}", status, text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn build_request(request: &CompletionRequest<'_>) -> GenerateRequest {
    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![WireTool {
            function_declarations: request.tools.to_vec(),
        }]
    };

    GenerateRequest {
        system_instruction: WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(request.system_prompt.to_string()),
                ..Default::default()
            }],
        },
        contents: request.messages.iter().map(to_wire_content).collect(),
        tools,
        generation_config: GenerationConfig { temperature: 0.0 },
    }
}

fn to_wire_content(message: &Message) -> WireContent {
    let role = match message.role {
        Role::User => "user",
        Role::Model => "model",
    };
    let parts = message
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::ToolCall(call) => WirePart {
                function_call: Some(WireFunctionCall {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }),
                thought_signature: call.signature.clone(),
                ..Default::default()
            },
            Part::ToolResult(result) => WirePart {
                function_response: Some(WireFunctionResponse {
                    name: result.name.clone(),
                    response: as_response_object(&result.content),
                }),
                ..Default::default()
            },
        })
        .collect();

    WireContent {
        role: Some(role.to_string()),
        parts,
    }
}

/// `functionResponse.response` must be a JSON object
fn as_response_object(content: &serde_json::Value) -> serde_json::Value {
    if content.is_object() {
        content.clone()
    } else {
        serde_json::json!({ "result": content })
    }
}

fn parse_response(text: &str) -> LlmResult<CompletionResponse> {
    let response: GenerateResponse = serde_json::from_str(text)
        .map_err(|e| LlmError::InvalidResponse(format!("malformed JSON: {}", e)))?;

    if let Some(usage) = &response.usage_metadata {
        debug!(
            "Gemini usage - prompt: {:?} tokens, response: {:?} tokens, total: {:?} tokens",
            usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
        );
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(LlmError::InvalidResponse(format!(
            "no candidates in response ({})",
            reason
        )));
    };

    let content = candidate.content.unwrap_or_default();
    let parts: Vec<Part> = content
        .parts
        .into_iter()
        .filter(|p| p.thought != Some(true))
        .filter_map(|p| {
            if let Some(call) = p.function_call {
                Some(Part::ToolCall(ToolCall {
                    name: call.name,
                    arguments: call.args,
                    signature: p.thought_signature,
                }))
            } else {
                p.text.map(Part::Text)
            }
        })
        .collect();

    if parts.is_empty() {
        return Err(LlmError::InvalidResponse(format!(
            "candidate has no content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(CompletionResponse { parts })
}
