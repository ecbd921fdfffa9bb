//! Marketplace lookup for discovered records.

use crate::error::{Result, ScanError};
use crate::pipeline::Enricher;
use crate::records::{DiscoveredRecord, EnrichmentResult};
use async_trait::async_trait;
use dealscout_browser::{PageDriver, PageSession};
use dealscout_core::{AppConfig, ProxyEndpoint, Site, SiteId};
use dealscout_enrich::{GoogleSearch, MatchScorer, OpenAiMatchScorer, SearchProvider};
use dealscout_proxy::ProxyPool;
use std::sync::Arc;

/// Finds a record on the marketplace and scores the match.
///
/// search → proxy → render → screenshot → score. A failed score still
/// yields a result carrying the URL.
pub struct MarketplaceEnricher {
    site: Site,
    pool: Arc<ProxyPool>,
    driver: Arc<dyn PageDriver>,
    search: Arc<dyn SearchProvider>,
    scorer: Arc<dyn MatchScorer>,
}

impl MarketplaceEnricher {
    /// Create an enricher for `site`.
    pub fn new(
        site: Site,
        pool: Arc<ProxyPool>,
        driver: Arc<dyn PageDriver>,
        search: Arc<dyn SearchProvider>,
        scorer: Arc<dyn MatchScorer>,
    ) -> Self {
        Self {
            site,
            pool,
            driver,
            search,
            scorer,
        }
    }

    /// Build the Google search and `OpenAI` scoring clients from config.
    pub fn from_config(
        config: &AppConfig,
        pool: Arc<ProxyPool>,
        driver: Arc<dyn PageDriver>,
    ) -> Result<Self> {
        let site_id = SiteId::new(config.enrichment.marketplace_site.as_str())?;
        let site = pool
            .site(&site_id)
            .cloned()
            .ok_or(ScanError::UnknownSite(site_id))?;

        let search = GoogleSearch::from_config(&config.enrichment)?;
        let scorer = OpenAiMatchScorer::from_config(&config.enrichment)?;
        Ok(Self::new(site, pool, driver, Arc::new(search), Arc::new(scorer)))
    }

    /// Render `url` and take a screenshot.
    async fn capture(
        &self,
        session: &mut (dyn PageSession + 'static),
        url: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<Vec<u8>> {
        if let Err(e) = session.navigate(url).await {
            if let Some(proxy) = proxy {
                self.pool.report_failure(proxy, &self.site.id).await;
            }
            return Err(e.into());
        }
        Ok(session.screenshot().await?)
    }
}

#[async_trait]
impl Enricher for MarketplaceEnricher {
    async fn enrich(&self, record: &DiscoveredRecord) -> Result<Option<EnrichmentResult>> {
        let query = record.search_query();
        let Some(url) = self.search.best_match(&query).await? else {
            return Ok(None);
        };
        tracing::debug!("Best {} match for {:?}: {}", self.site.id, query, url);

        let proxy = self.pool.acquire(&self.site.id).map(|p| p.endpoint);
        let mut session = self.driver.open_session(proxy.as_ref()).await?;
        let captured = self.capture(&mut *session, &url, proxy.as_ref()).await;
        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close marketplace session: {}", e);
        }
        let screenshot = captured?;

        let mut result = EnrichmentResult::new(url, self.site.id.clone());
        match self.scorer.score(&query, &screenshot).await {
            Ok(verdict) => {
                result.price = verdict.price_value();
                result.product_id = verdict.id;
                result.confidence = verdict.confidence;
            }
            Err(e) => {
                tracing::warn!(
                    "Match scoring failed for {} via {}: {}",
                    record.id,
                    self.scorer.provider_id(),
                    e
                );
            }
        }
        Ok(Some(result))
    }
}
