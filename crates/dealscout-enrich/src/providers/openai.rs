//! `OpenAI` vision match scorer.

use super::common::{api_error, build_http_client, require};
use crate::error::{EnrichError, Result};
use crate::provider::MatchScorer;
use crate::verdict::MatchVerdict;
use async_trait::async_trait;
use base64::Engine;
use dealscout_core::EnrichmentConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "openai";

/// Scores a marketplace page screenshot against a product query using a
/// vision-capable chat completions model.
pub struct OpenAiMatchScorer {
    api_key: String,
    model: String,
    client: Client,
    endpoint: String,
}

impl OpenAiMatchScorer {
    /// Create a scorer with the given API key and the default model.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let defaults = EnrichmentConfig::default();
        Ok(Self {
            api_key: api_key.into(),
            model: defaults.scoring_model,
            client: build_http_client(Some(60))?,
            endpoint: defaults.scoring_endpoint,
        })
    }

    /// Create a scorer from enrichment settings.
    ///
    /// # Errors
    /// Returns `NotConfigured` if the API key is missing.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let api_key = require(config.scoring_api_key.as_deref(), "OPENAI_API_KEY")?;
        Ok(Self::new(api_key)?
            .with_model(&config.scoring_model)
            .with_endpoint(&config.scoring_endpoint))
    }

    /// Use a different model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the scorer at a different chat completions endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn to_api_request(&self, query: &str, screenshot: &[u8]) -> ChatRequest {
        let image = base64::engine::general_purpose::STANDARD.encode(screenshot);
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt(query),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/png;base64,{image}"),
                        },
                    },
                ],
            }],
        }
    }
}

fn prompt(query: &str) -> String {
    format!(
        "Does this product name, {query}, match the product shown in the screenshot? \
         If so, what is its price on this page?\n\
         Respond only with JSON in the following format:\n\
         {{\"id\": \"Product ID\", \"price\": \"Price\", \"match\": \"Match Percentage Estimate\"}}"
    )
}

#[async_trait]
impl MatchScorer for OpenAiMatchScorer {
    async fn score(&self, query: &str, screenshot: &[u8]) -> Result<MatchVerdict> {
        let request = self.to_api_request(query, screenshot);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(PROVIDER, response).await);
        }

        let body: ChatResponse = response.json().await.map_err(|e| EnrichError::ParseError {
            provider: PROVIDER.to_string(),
            message: format!("Failed to parse response: {e}"),
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EnrichError::ParseError {
                provider: PROVIDER.to_string(),
                message: "no choices in response".to_string(),
            })?;

        MatchVerdict::from_content(&content).map_err(|e| {
            tracing::warn!("Malformed match verdict {:?}: {}", content, e);
            EnrichError::ParseError {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            }
        })
    }

    fn provider_id(&self) -> &'static str {
        PROVIDER
    }
}

// Chat completions API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
