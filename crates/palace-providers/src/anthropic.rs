//! Anthropic messages API backend.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use palace_core::prompt::SYSTEM_PROMPT;
use palace_core::traits::{GenerateRequest, GenerateResponse, GenerativeBackend, TokenUsage};
use palace_core::ProviderError;

use crate::http;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const API_VERSION: &str = "2023-06-01";

/// Anthropic API backend.
pub struct AnthropicBackend {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(api_key: &str, base_url: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http::build_client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
    model: String,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Prefer the API's own error message over the raw body.
fn unwrap_error_message(err: ProviderError) -> ProviderError {
    match err {
        ProviderError::ApiError { status, message } => ProviderError::ApiError {
            status,
            message: serde_json::from_str::<ErrorEnvelope>(&message)
                .map(|e| e.error.message)
                .unwrap_or(message),
        },
        other => other,
    }
}

#[async_trait]
impl GenerativeBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();

        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT),
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(e, DEFAULT_TIMEOUT_SECS))?;
        let response = http::check_status(response, &request.model)
            .await
            .map_err(unwrap_error_message)?;
        let api_response: MessagesResponse = response.json().await.map_err(http::parse_error)?;

        let content = api_response
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<String>();

        Ok(GenerateResponse {
            content,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens: api_response.usage.input_tokens,
                completion_tokens: api_response.usage.output_tokens,
                total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
