//! Shared HTTP plumbing for the REST backends.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Response, StatusCode};

use palace_core::ProviderError;

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Build a client with an outer request timeout. The cascade applies its own,
/// usually shorter, per-attempt bound on top.
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

pub(crate) fn send_error(err: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(err.to_string())
    }
}

/// Map error statuses to [`ProviderError`], passing successful responses through.
pub(crate) async fn check_status(response: Response, model: &str) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after_secs.saturating_mul(1000),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationFailed(body),
        StatusCode::NOT_FOUND => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError {
            status: status.as_u16(),
            message: body,
        },
    })
}

pub(crate) fn parse_error(err: reqwest::Error) -> ProviderError {
    ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {err}"),
    }
}
