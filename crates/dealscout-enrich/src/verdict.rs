//! Match-scoring verdicts and lenient parsing of model output.

use crate::error::{EnrichError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured answer from the match scorer.
///
/// Every field is optional: the model may omit or garble any of them, and
/// a partial verdict is still usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchVerdict {
    /// Marketplace product id
    pub id: Option<String>,
    /// Price as quoted by the model, e.g. `"$1,299.00"` or `"N/A"`
    pub price: Option<String>,
    /// Match confidence as quoted, e.g. `"85%"`
    pub confidence: Option<String>,
}

impl MatchVerdict {
    /// Parse the message content returned by the model.
    ///
    /// Accepts bare JSON or JSON wrapped in a Markdown code fence. Fields
    /// may be strings or numbers; anything else is dropped.
    pub fn from_content(content: &str) -> Result<Self> {
        let body = strip_code_fence(content);
        let value: Value = serde_json::from_str(body)?;
        let Value::Object(fields) = value else {
            return Err(EnrichError::ParseError {
                provider: "scorer".to_string(),
                message: "verdict is not a JSON object".to_string(),
            });
        };

        Ok(Self {
            id: fields.get("id").and_then(scalar_to_string),
            price: fields.get("price").and_then(scalar_to_string),
            confidence: fields.get("match").and_then(scalar_to_string),
        })
    }

    /// Numeric price, if the quoted price parses.
    #[must_use]
    pub fn price_value(&self) -> Option<f64> {
        self.price.as_deref().and_then(parse_price)
    }
}

/// Parse a quoted price such as `"$1,299.99"`.
///
/// Returns `None` for non-numeric values like `"N/A"`.
#[must_use]
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) up to the first newline
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
