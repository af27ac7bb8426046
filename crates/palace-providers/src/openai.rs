//! OpenAI-compatible chat completions backend.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use palace_core::prompt::SYSTEM_PROMPT;
use palace_core::traits::{GenerateRequest, GenerateResponse, GenerativeBackend, TokenUsage};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// OpenAI-compatible API backend. Also works against local servers that
/// speak the same protocol.
pub struct OpenAiBackend {
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        org_id: Option<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            org_id,
            client: http::build_client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();

        let body = ChatRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT),
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(e, DEFAULT_TIMEOUT_SECS))?;
        let response = http::check_status(response, &request.model).await?;
        let api_response: ChatResponse = response.json().await.map_err(http::parse_error)?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(GenerateResponse {
            content,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens: api_response.usage.prompt_tokens,
                completion_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palace_core::ProviderError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.into(),
            prompt: "Summarize photosynthesis".into(),
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "choices": [{"message": {"content": "{\"summary\": \"Light to sugar\"}", "role": "assistant"}, "index": 0}],
            "model": "gpt-4.1-mini",
            "usage": {"prompt_tokens": 40, "completion_tokens": 15, "total_tokens": 55}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4.1-mini",
                "messages": [{"role": "system", "content": SYSTEM_PROMPT}, {"role": "user"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("test-key", Some(server.uri()), None).unwrap();
        let response = backend.generate(&request("gpt-4.1-mini")).await.unwrap();
        assert!(response.content.contains("Light to sugar"));
        assert_eq!(response.model, "gpt-4.1-mini");
        assert_eq!(response.token_usage.total_tokens, 55);
    }

    #[tokio::test]
    async fn null_content_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": null, "role": "assistant"}}],
                "model": "m"
            })))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("key", Some(server.uri()), None).unwrap();
        let response = backend.generate(&request("m")).await.unwrap();
        assert!(response.content.is_empty());
    }

    #[tokio::test]
    async fn forbidden_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(403).set_body_string("no access"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("key", Some(server.uri()), None).unwrap();
        let err = backend.generate(&request("gpt-4.1")).await.unwrap_err();
        let provider_err = err.downcast_ref::<ProviderError>().unwrap();
        assert!(provider_err.is_permanent());
    }

    #[tokio::test]
    async fn server_error_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("key", Some(server.uri()), None).unwrap();
        let err = backend.generate(&request("gpt-4.1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::ApiError { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("key", Some(server.uri()), None).unwrap();
        let err = backend.generate(&request("gpt-4.1")).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProviderError>().and_then(ProviderError::retry_after_ms),
            Some(12_000)
        );
    }

    #[tokio::test]
    async fn huge_retry_after_saturates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "18446744073709551615"),
            )
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("key", Some(server.uri()), None).unwrap();
        let err = backend.generate(&request("gpt-4.1")).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProviderError>().and_then(ProviderError::retry_after_ms),
            Some(u64::MAX)
        );
    }
}
