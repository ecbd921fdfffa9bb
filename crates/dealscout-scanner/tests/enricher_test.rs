//! Marketplace enricher against fake search, scorer and browser.

mod common;

use async_trait::async_trait;
use common::{record, site_id, FakeDriver};
use dealscout_core::{AppConfig, ProxyEndpoint, Site};
use dealscout_enrich::{EnrichError, MatchScorer, MatchVerdict, SearchProvider};
use dealscout_proxy::Health;
use dealscout_scanner::{Enricher, MarketplaceEnricher, ScanError};
use std::sync::Arc;

struct FixedSearch(Option<&'static str>);

#[async_trait]
impl SearchProvider for FixedSearch {
    async fn best_match(&self, _query: &str) -> dealscout_enrich::Result<Option<String>> {
        Ok(self.0.map(str::to_string))
    }

    fn provider_id(&self) -> &'static str {
        "fixed"
    }
}

struct FixedScorer(Option<MatchVerdict>);

#[async_trait]
impl MatchScorer for FixedScorer {
    async fn score(&self, _query: &str, screenshot: &[u8]) -> dealscout_enrich::Result<MatchVerdict> {
        assert!(!screenshot.is_empty());
        self.0.clone().ok_or_else(|| EnrichError::ParseError {
            provider: "fixed".to_string(),
            message: "not JSON".to_string(),
        })
    }

    fn provider_id(&self) -> &'static str {
        "fixed"
    }
}

fn amazon() -> Site {
    Site::new("amazon", "https://www.amazon.com").unwrap()
}

fn enricher(
    driver: Arc<FakeDriver>,
    search: Option<&'static str>,
    verdict: Option<MatchVerdict>,
) -> (MarketplaceEnricher, Arc<dealscout_proxy::ProxyPool>) {
    let pool = common::pool(driver.clone());
    let enricher = MarketplaceEnricher::new(
        amazon(),
        pool.clone(),
        driver,
        Arc::new(FixedSearch(search)),
        Arc::new(FixedScorer(verdict)),
    );
    (enricher, pool)
}

#[tokio::test]
async fn test_full_match() {
    let driver = Arc::new(FakeDriver::new());
    let verdict = MatchVerdict {
        id: Some("B0123".to_string()),
        price: Some("$1,049.99".to_string()),
        confidence: Some("92%".to_string()),
    };
    let (enricher, _) = enricher(driver.clone(), Some("https://www.amazon.com/dp/B0123"), Some(verdict));

    let result = enricher
        .enrich(&record("1", "home_depot"))
        .await
        .unwrap()
        .expect("match");

    assert_eq!(result.url, "https://www.amazon.com/dp/B0123");
    assert_eq!(result.site, site_id("amazon"));
    assert_eq!(result.product_id.as_deref(), Some("B0123"));
    assert_eq!(result.price, Some(1049.99));
    assert_eq!(result.confidence.as_deref(), Some("92%"));
    assert_eq!(driver.opened(), 1);
    assert_eq!(driver.closed(), 1);
}

#[tokio::test]
async fn test_no_search_result_skips_browser() {
    let driver = Arc::new(FakeDriver::new());
    let (enricher, _) = enricher(driver.clone(), None, None);

    let result = enricher.enrich(&record("1", "lowes")).await.unwrap();
    assert!(result.is_none());
    assert_eq!(driver.opened(), 0);
}

#[tokio::test]
async fn test_scoring_failure_leaves_partial_result() {
    let driver = Arc::new(FakeDriver::new());
    let (enricher, _) = enricher(driver, Some("https://www.amazon.com/dp/Z"), None);

    let result = enricher
        .enrich(&record("1", "ace"))
        .await
        .unwrap()
        .expect("partial result");
    assert_eq!(result.url, "https://www.amazon.com/dp/Z");
    assert!(result.price.is_none());
    assert!(result.confidence.is_none());
}

#[tokio::test]
async fn test_unparseable_price_is_none() {
    let driver = Arc::new(FakeDriver::new());
    let verdict = MatchVerdict {
        price: Some("N/A".to_string()),
        confidence: Some("10%".to_string()),
        ..MatchVerdict::default()
    };
    let (enricher, _) = enricher(driver, Some("https://www.amazon.com/dp/Q"), Some(verdict));

    let result = enricher.enrich(&record("1", "ace")).await.unwrap().unwrap();
    assert!(result.price.is_none());
    assert_eq!(result.confidence.as_deref(), Some("10%"));
}

#[tokio::test]
async fn test_navigation_failure_reports_proxy() {
    let driver = Arc::new(FakeDriver::new().failing_through("slow"));
    let (enricher, pool) = enricher(
        driver.clone(),
        Some("https://www.amazon.com/dp/B0123"),
        Some(MatchVerdict::default()),
    );
    pool.refresh("slow:8080\n").await;

    let err = enricher.enrich(&record("1", "home_depot")).await.unwrap_err();
    assert!(matches!(err, ScanError::Browser(_)));

    let snapshot = pool.snapshot();
    let proxy = snapshot.get(&ProxyEndpoint::new("slow", 8080)).unwrap();
    assert_eq!(proxy.health(&site_id("amazon")), Health::Failed);
    assert_eq!(driver.closed(), 1);
}

#[tokio::test]
async fn test_from_config_requires_credentials() {
    let driver = Arc::new(FakeDriver::new());
    let pool = common::pool(driver.clone());
    let result = MarketplaceEnricher::from_config(&AppConfig::default(), pool, driver);
    assert!(matches!(result, Err(ScanError::Enrichment(EnrichError::NotConfigured(_)))));
}
