//! Gemini API backend implementation.
//!
//! Connects to the `generateContent` endpoint of Google's Generative
//! Language API. Sampling parameters are fixed per backend and applied
//! identically to every attempt; every call runs under the configured
//! [`RetryPolicy`].

use std::time::Duration;

use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use async_trait::async_trait;

use crate::backend::ModelBackend;
use crate::error::{LlmError, Result};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, Message, Role};

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Default model identifier.
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Model identifier.
    pub model: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling parameter.
    pub top_p: f32,

    /// Top-k sampling parameter.
    pub top_k: u32,

    /// Request timeout.
    pub timeout: Duration,

    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl GeminiConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
            temperature: 0.05,
            top_p: 0.98,
            top_k: 5,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Create config from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            LlmError::Config("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the sampling parameters.
    pub fn with_sampling(mut self, temperature: f32, top_p: f32, top_k: u32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self.top_k = top_k;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Gemini API backend.
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    /// Create a new Gemini backend with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create a backend from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    /// Build the generateContent endpoint URL.
    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    /// Handle a response, mapping failure statuses onto the error taxonomy.
    async fn handle_response(response: Response) -> Result<CompletionResponse> {
        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        let body = response.text().await?;
        let parsed: ApiResponse = serde_json::from_str(&body)?;
        parse_api_response(parsed)
    }

    /// Handle an error response.
    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        match status {
            401 | 403 => LlmError::Auth(format!("authentication failed: {message}")),
            _ => LlmError::http(status, message),
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = build_api_request(&request, &self.config);

        with_retry(&self.config.retry, "gemini", || async {
            let response = self
                .client
                .post(self.generate_url())
                .header("x-goog-api-key", &self.config.api_key)
                .header(header::CONTENT_TYPE, "application/json")
                .json(&api_request)
                .send()
                .await?;

            Self::handle_response(response).await
        })
        .await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<ApiPart>,
}

/// One part of a content entry. Exactly one field is set.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<ApiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTool {
    function_declarations: Vec<ApiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

/// Map the provider-agnostic request onto the Gemini wire format.
fn build_api_request(request: &CompletionRequest, config: &GeminiConfig) -> ApiRequest {
    // Gemini function responses are keyed by function name, not call id, so
    // resolve each tool_use_id against the tool uses seen earlier in the
    // conversation.
    let mut call_names: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    for message in &request.messages {
        for block in &message.content {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                call_names.insert(id.as_str(), name.as_str());
            }
        }
    }

    let contents = request
        .messages
        .iter()
        .map(|message| ApiContent {
            role: Some(
                match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }
                .to_string(),
            ),
            parts: message
                .content
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => ApiPart {
                        text: Some(text.clone()),
                        ..ApiPart::default()
                    },
                    ContentBlock::ToolUse { name, input, .. } => ApiPart {
                        function_call: Some(ApiFunctionCall {
                            name: name.clone(),
                            args: input.clone(),
                        }),
                        ..ApiPart::default()
                    },
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => {
                        let name = call_names
                            .get(tool_use_id.as_str())
                            .copied()
                            .unwrap_or("unknown");
                        let response = if *is_error {
                            serde_json::json!({ "error": content })
                        } else {
                            serde_json::json!({ "result": content })
                        };
                        ApiPart {
                            function_response: Some(ApiFunctionResponse {
                                name: name.to_string(),
                                response,
                            }),
                            ..ApiPart::default()
                        }
                    }
                })
                .collect(),
        })
        .collect();

    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![ApiTool {
            function_declarations: request
                .tools
                .iter()
                .map(|tool| ApiFunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: sanitize_schema(tool.input_schema.clone()),
                })
                .collect(),
        }]
    };

    ApiRequest {
        contents,
        system_instruction: request.system.as_ref().map(|text| ApiContent {
            role: None,
            parts: vec![ApiPart {
                text: Some(text.clone()),
                ..ApiPart::default()
            }],
        }),
        tools,
        generation_config: ApiGenerationConfig {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
        },
    }
}

/// Map a Gemini response onto the provider-agnostic types.
///
/// Gemini function calls carry no correlation id, so one is minted here;
/// the caller pairs results back to it.
fn parse_api_response(api: ApiResponse) -> Result<CompletionResponse> {
    let candidate = api
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response contained no candidates".into()))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let content = parts
        .into_iter()
        .filter_map(|part| {
            if let Some(text) = part.text {
                Some(ContentBlock::Text { text })
            } else {
                part.function_call.map(|call| ContentBlock::ToolUse {
                    id: format!("call_{}", Uuid::new_v4().simple()),
                    name: call.name,
                    input: call.args,
                })
            }
        })
        .collect();

    Ok(CompletionResponse::new(content))
}

/// Strip JSON Schema meta fields the Gemini API rejects.
fn sanitize_schema(mut schema: Value) -> Value {
    fn strip(value: &mut Value) {
        if let Value::Object(map) = value {
            map.remove("$schema");
            map.remove("additionalProperties");
            for child in map.values_mut() {
                strip(child);
            }
        } else if let Value::Array(items) = value {
            for item in items.iter_mut() {
                strip(item);
            }
        }
    }
    strip(&mut schema);
    schema
}
