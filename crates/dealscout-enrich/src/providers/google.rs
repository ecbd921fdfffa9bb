//! Google Custom Search provider.

use super::common::{api_error, backoff_delay, build_http_client, require};
use crate::error::{EnrichError, Result};
use crate::provider::SearchProvider;
use async_trait::async_trait;
use dealscout_core::EnrichmentConfig;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "google";

/// Google Custom Search JSON API client.
///
/// Requests a single result and returns its link. HTTP 429 responses are
/// retried with exponential backoff.
pub struct GoogleSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
    retries: u32,
    backoff: Duration,
}

impl GoogleSearch {
    /// Create a client for the public endpoint.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Some(30))?,
            endpoint: EnrichmentConfig::default().search_endpoint,
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            retries: 5,
            backoff: Duration::from_secs(1),
        })
    }

    /// Create a client from enrichment settings.
    ///
    /// # Errors
    /// Returns `NotConfigured` if the API key or engine id is missing.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let api_key = require(config.search_api_key.as_deref(), "GOOGLE_API_KEY")?;
        let engine_id = require(Some(&config.search_engine_id), "SEARCH_ENGINE")?;
        Ok(Self::new(api_key, engine_id)?
            .with_endpoint(&config.search_endpoint)
            .with_retries(
                config.search_retries,
                Duration::from_millis(config.search_backoff_ms),
            ))
    }

    /// Point the client at a different endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the 429 retry budget and base backoff.
    #[must_use]
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries.max(1);
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    async fn best_match(&self, query: &str) -> Result<Option<String>> {
        for attempt in 0..self.retries {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("q", query),
                    ("key", self.api_key.as_str()),
                    ("cx", self.engine_id.as_str()),
                    ("num", "1"),
                ])
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let delay = backoff_delay(self.backoff, attempt);
                tracing::warn!(
                    "Search rate limited, retrying in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    self.retries
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !response.status().is_success() {
                return Err(api_error(PROVIDER, response).await);
            }

            let body: SearchResponse = response.json().await.map_err(|e| EnrichError::ParseError {
                provider: PROVIDER.to_string(),
                message: format!("Failed to parse response: {e}"),
            })?;

            let link = body.items.into_iter().next().map(|item| item.link);
            if link.is_none() {
                tracing::debug!("No search results for {:?}", query);
            }
            return Ok(link);
        }

        Err(EnrichError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
            attempts: self.retries,
        })
    }

    fn provider_id(&self) -> &'static str {
        PROVIDER
    }
}

// Custom Search API types

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}
