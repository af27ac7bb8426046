//! Mock backend for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use palace_core::traits::{GenerateRequest, GenerateResponse, GenerativeBackend, TokenUsage};
use palace_core::ProviderError;

/// What the mock does when called.
#[derive(Debug, Clone)]
enum Behavior {
    /// Reply with the first matching prompt substring, else the default.
    Respond {
        routes: HashMap<String, String>,
        default: String,
    },
    /// Fail with the given error message.
    Fail(String),
    /// Fail with an authentication error, which the cascade treats as permanent.
    Unauthorized,
    /// Never complete.
    Hang,
}

/// A scriptable backend for exercising the pipeline without network calls.
pub struct MockBackend {
    behavior: Behavior,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockBackend {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock with prompt-substring → response routes.
    pub fn new(routes: HashMap<String, String>, default_response: &str) -> Self {
        Self::with_behavior(Behavior::Respond {
            routes,
            default: default_response.to_string(),
        })
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self::new(HashMap::new(), response)
    }

    /// A mock that succeeds with blank text.
    pub fn empty() -> Self {
        Self::with_fixed_response("")
    }

    pub fn failing(message: &str) -> Self {
        Self::with_behavior(Behavior::Fail(message.to_string()))
    }

    pub fn unauthorized() -> Self {
        Self::with_behavior(Behavior::Unauthorized)
    }

    /// A mock whose calls never return; for timeout and cancellation tests.
    pub fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    /// Get the number of calls made to this backend.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this backend.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl GenerativeBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let content = match &self.behavior {
            Behavior::Respond { routes, default } => routes
                .iter()
                .find(|(key, _)| request.prompt.contains(key.as_str()))
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| default.clone()),
            Behavior::Fail(message) => {
                return Err(ProviderError::NetworkError(message.clone()).into())
            }
            Behavior::Unauthorized => {
                return Err(ProviderError::AuthenticationFailed("mock key rejected".into()).into())
            }
            Behavior::Hang => std::future::pending().await,
        };

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "mock-model".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let backend = MockBackend::with_fixed_response(r#"{"summary": "ok"}"#);

        let response = backend.generate(&request("anything")).await.unwrap();
        assert_eq!(response.content, r#"{"summary": "ok"}"#);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_routing() {
        let mut routes = HashMap::new();
        routes.insert("JSON array".to_string(), "[]".to_string());
        routes.insert("JSON object".to_string(), "{}".to_string());
        let backend = MockBackend::new(routes, "none");

        let resp = backend.generate(&request("Return a JSON array")).await.unwrap();
        assert_eq!(resp.content, "[]");
        let resp = backend.generate(&request("Return a JSON object")).await.unwrap();
        assert_eq!(resp.content, "{}");
        let resp = backend.generate(&request("Something else")).await.unwrap();
        assert_eq!(resp.content, "none");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn failures_are_provider_errors() {
        let err = MockBackend::failing("connection reset")
            .generate(&request("x"))
            .await
            .unwrap_err();
        assert!(!err.downcast_ref::<ProviderError>().unwrap().is_permanent());

        let err = MockBackend::unauthorized()
            .generate(&request("x"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().unwrap().is_permanent());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_never_completes() {
        let backend = MockBackend::hanging();
        let outcome =
            tokio::time::timeout(Duration::from_secs(10), backend.generate(&request("x"))).await;
        assert!(outcome.is_err());
        assert_eq!(backend.call_count(), 1);
    }
}
