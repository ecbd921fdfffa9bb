//! Common utilities shared across enrichment providers.

use crate::error::{EnrichError, Result};
use reqwest::{Client, Response};
use std::time::Duration;

/// Build a standard HTTP client with common timeout settings.
///
/// # Arguments
/// * `timeout_secs` - Timeout in seconds (defaults to 60 if not specified)
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn build_http_client(timeout_secs: Option<u64>) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.unwrap_or(60)))
        .build()
        .map_err(|e| EnrichError::Internal(format!("failed to create HTTP client: {e}")))
}

/// Exponential backoff: `base * 2^attempt`, saturating.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Turn a non-success response into `EnrichError::ApiError`.
pub async fn api_error(provider: &str, response: Response) -> EnrichError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    EnrichError::ApiError {
        provider: provider.to_string(),
        status,
        message,
    }
}

/// Read a required credential, treating blank values as missing.
pub fn require(value: Option<&str>, name: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(EnrichError::NotConfigured(format!("{name} is not set"))),
    }
}
