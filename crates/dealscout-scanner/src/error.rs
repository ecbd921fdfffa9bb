//! Error types for scraper runs and the discovery pipeline.

use dealscout_browser::BrowserError;
use dealscout_core::{ProxyEndpoint, ScoutError, SiteId};
use dealscout_enrich::EnrichError;
use thiserror::Error;

/// Why a site routine stopped early.
///
/// Caught at the lifecycle boundary and turned into a [`RunOutcome`](crate::RunOutcome);
/// never propagated to sibling scrapers.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The proxy could not reach the site. Already reported to the pool.
    #[error("proxy {proxy} failed for {site}")]
    BadProxy {
        /// Proxy that failed
        proxy: ProxyEndpoint,
        /// Site it failed for
        site: SiteId,
    },

    /// A single step failed (selector missing, payload unreadable)
    #[error("transient failure: {0}")]
    Transient(String),

    /// Browser session error, including navigation timeouts
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Stop was requested; not a failure
    #[error("cancelled")]
    Cancelled,

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl ScrapeError {
    /// Whether this is a cooperative stop rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors from lifecycle control and the enrichment stage.
#[derive(Debug, Error)]
pub enum ScanError {
    /// `start()` called on a scraper that is not idle
    #[error("scraper for {site} is already running")]
    AlreadyRunning {
        /// Site of the scraper
        site: SiteId,
    },

    /// Site id not present in the configured site list
    #[error("unknown site: {0}")]
    UnknownSite(SiteId),

    /// Constructed outside a tokio runtime
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Search or scoring call failed
    #[error("enrichment error: {0}")]
    Enrichment(#[from] EnrichError),

    /// Marketplace page could not be captured
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Validation error from shared types
    #[error(transparent)]
    Core(#[from] ScoutError),
}

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

impl From<ScanError> for ScoutError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Core(inner) => inner,
            other => ScoutError::Scraper(other.to_string()),
        }
    }
}
