//! Provider traits for the two enrichment calls.

use crate::error::Result;
use crate::verdict::MatchVerdict;
use async_trait::async_trait;

/// Free-text search returning the single best-match URL.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query`. `Ok(None)` means the search ran and found nothing.
    async fn best_match(&self, query: &str) -> Result<Option<String>>;

    /// Identifier for logging
    fn provider_id(&self) -> &'static str;
}

/// Image + text scoring of a rendered candidate page.
#[async_trait]
pub trait MatchScorer: Send + Sync {
    /// Score how well the page in `screenshot` (PNG) matches `query`.
    async fn score(&self, query: &str, screenshot: &[u8]) -> Result<MatchVerdict>;

    /// Identifier for logging
    fn provider_id(&self) -> &'static str;
}
