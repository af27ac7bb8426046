//! Google Gemini `generateContent` backend.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use palace_core::prompt::SYSTEM_PROMPT;
use palace_core::traits::{GenerateRequest, GenerateResponse, GenerativeBackend, TokenUsage};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Gemini REST backend.
pub struct GeminiBackend {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: &str, base_url: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http::build_client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();

        let body = GenerateContentRequest {
            contents: [Content {
                role: Some("user"),
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: request.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT),
                }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, request.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(e, DEFAULT_TIMEOUT_SECS))?;
        let response = http::check_status(response, &request.model).await?;
        let api_response: GenerateContentResponse =
            response.json().await.map_err(http::parse_error)?;

        // Blocked or truncated candidates come back without text; the cascade
        // treats the resulting blank content as a failed attempt.
        let candidate = api_response.candidates.into_iter().next();
        if let Some(reason) = candidate.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            debug!(finish_reason = reason, "candidate finished");
        }
        let content = candidate
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        let usage = api_response.usage_metadata;
        Ok(GenerateResponse {
            content,
            model: api_response
                .model_version
                .unwrap_or_else(|| request.model.clone()),
            token_usage: TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
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

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gemini-2.5-flash-lite".into(),
            prompt: "Analyze: cells divide".into(),
            system_prompt: None,
            max_tokens: 8192,
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "```json\n{\"summary\":"}, {"text": " \"Mitosis\"}\n```"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 8, "totalTokenCount": 20},
            "modelVersion": "gemini-2.5-flash-lite-001"
        });

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 8192},
                "systemInstruction": {"parts": [{"text": SYSTEM_PROMPT}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new("test-key", Some(server.uri())).unwrap();
        let response = backend.generate(&request()).await.unwrap();
        assert_eq!(response.content, "```json\n{\"summary\": \"Mitosis\"}\n```");
        assert_eq!(response.model, "gemini-2.5-flash-lite-001");
        assert_eq!(response.token_usage.total_tokens, 20);
    }

    #[tokio::test]
    async fn blocked_candidate_yields_empty_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new("test-key", Some(server.uri())).unwrap();
        let response = backend.generate(&request()).await.unwrap();
        assert!(response.content.is_empty());
        assert_eq!(response.model, "gemini-2.5-flash-lite");
    }

    #[tokio::test]
    async fn rate_limit_defaults_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new("test-key", Some(server.uri())).unwrap();
        let err = backend.generate(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::RateLimited {
                retry_after_ms: 5000
            })
        ));
    }

    #[tokio::test]
    async fn unknown_model_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new("test-key", Some(server.uri())).unwrap();
        let err = backend.generate(&request()).await.unwrap_err();
        let provider_err = err.downcast_ref::<ProviderError>().unwrap();
        assert!(matches!(provider_err, ProviderError::ModelNotFound(m) if m == "gemini-2.5-flash-lite"));
        assert!(provider_err.is_permanent());
    }
}
