//! The shared proxy pool.
//!
//! Readers take an `Arc<PoolSnapshot>` per call and select from it, so a
//! refresh or health update is never observed half-applied. Writers build
//! a new snapshot and swap it in.

use crate::error::Result;
use crate::metrics::{NoopObserver, PoolObserver, ProxyMetrics};
use crate::proxy::{parse_source, Health, Proxy};
use crate::snapshot::SnapshotStore;
use dealscout_browser::PageDriver;
use dealscout_core::{AppConfig, ProxyEndpoint, Site, SiteId};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Default timeout for a single reachability probe.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default number of probes in flight during a refresh.
const DEFAULT_PROBE_CONCURRENCY: usize = 8;

/// Immutable view of the pool at one point in time.
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    proxies: Vec<Proxy>,
}

impl PoolSnapshot {
    fn new(proxies: Vec<Proxy>) -> Self {
        Self { proxies }
    }

    /// Proxies in source order.
    #[must_use]
    pub fn proxies(&self) -> &[Proxy] {
        &self.proxies
    }

    /// Availability flag: false when the list is empty.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.proxies.is_empty()
    }

    /// Look up a proxy by address.
    #[must_use]
    pub fn get(&self, endpoint: &ProxyEndpoint) -> Option<&Proxy> {
        self.proxies.iter().find(|p| &p.endpoint == endpoint)
    }
}

/// Health-ranked proxy pool shared by all scrapers in a run.
pub struct ProxyPool {
    sites: Vec<Site>,
    driver: Arc<dyn PageDriver>,
    store: Option<SnapshotStore>,
    observer: Arc<dyn PoolObserver>,
    probe_timeout: Duration,
    probe_concurrency: usize,
    current: RwLock<Arc<PoolSnapshot>>,
    /// Serialises refreshes; health updates only hold `current` briefly
    refresh_lock: tokio::sync::Mutex<()>,
    /// Orders snapshot writes so the file always ends with the latest state
    persist_lock: tokio::sync::Mutex<()>,
}

impl ProxyPool {
    /// Create an empty, unavailable pool probing `sites` through `driver`.
    pub fn new(sites: Vec<Site>, driver: Arc<dyn PageDriver>) -> Self {
        Self {
            sites,
            driver,
            store: None,
            observer: Arc::new(NoopObserver),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            current: RwLock::new(Arc::new(PoolSnapshot::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a pool from application configuration.
    pub fn from_config(config: &AppConfig, driver: Arc<dyn PageDriver>) -> Self {
        Self::new(config.sites.clone(), driver)
            .with_snapshot_store(SnapshotStore::new(&config.proxies.snapshot_path))
            .with_probe_timeout(Duration::from_secs(config.proxies.probe_timeout_secs))
            .with_probe_concurrency(config.proxies.probe_concurrency)
    }

    /// Persist snapshots through `store`.
    #[must_use]
    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Push metrics and alerts to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the timeout for a single probe.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set how many probes run at once during a refresh.
    #[must_use]
    pub fn with_probe_concurrency(mut self, concurrency: usize) -> Self {
        self.probe_concurrency = concurrency.max(1);
        self
    }

    /// Known sites.
    #[must_use]
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Look up a known site by id.
    #[must_use]
    pub fn site(&self, id: &SiteId) -> Option<&Site> {
        self.sites.iter().find(|site| &site.id == id)
    }

    /// Current snapshot. Holders may see stale data after the next write.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PoolSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any proxies are loaded.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.snapshot().is_available()
    }

    /// Compute metrics for the current snapshot.
    #[must_use]
    pub fn metrics(&self) -> ProxyMetrics {
        ProxyMetrics::compute(self.snapshot().proxies(), &self.sites)
    }

    /// Pick a random proxy for `site`.
    ///
    /// Proxies marked `Failed` for the site are skipped while any other
    /// proxy exists; if every proxy has failed, one is still returned.
    /// `None` means the pool is unavailable and the caller should proceed
    /// without a proxy.
    #[must_use]
    pub fn acquire(&self, site: &SiteId) -> Option<Proxy> {
        let snapshot = self.snapshot();
        if !snapshot.is_available() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let eligible: Vec<&Proxy> = snapshot
            .proxies()
            .iter()
            .filter(|proxy| proxy.is_eligible(site))
            .collect();

        if let Some(proxy) = eligible.choose(&mut rng) {
            return Some((*proxy).clone());
        }

        tracing::warn!(
            "Every proxy has failed for {}, handing out a failed proxy",
            site
        );
        snapshot.proxies().choose(&mut rng).cloned()
    }

    /// Replace the whole pool from a `host:port` source.
    ///
    /// Every (proxy, site) pair is probed before the new list becomes
    /// visible. The snapshot is then persisted and metrics are pushed.
    /// An empty source leaves the pool unavailable.
    pub async fn refresh(&self, source: &str) -> ProxyMetrics {
        let _refresh = self.refresh_lock.lock().await;

        let endpoints = parse_source(source);
        if endpoints.is_empty() {
            tracing::info!("No proxies found, running without proxies");
        } else {
            tracing::info!(
                "Probing {} proxies against {} sites",
                endpoints.len(),
                self.sites.len()
            );
        }

        let mut proxies: Vec<Proxy> = endpoints
            .iter()
            .cloned()
            .map(|endpoint| Proxy::new(endpoint, &self.sites))
            .collect();

        let pairs: Vec<(usize, &ProxyEndpoint, &Site)> = endpoints
            .iter()
            .enumerate()
            .flat_map(|(index, endpoint)| {
                self.sites.iter().map(move |site| (index, endpoint, site))
            })
            .collect();

        let outcomes: Vec<(usize, &Site, Health, bool)> = stream::iter(pairs)
            .map(|(index, endpoint, site)| async move {
                let (health, alert) = self.probe_pair(endpoint, site).await;
                (index, site, health, alert)
            })
            .buffer_unordered(self.probe_concurrency)
            .collect()
            .await;

        for (index, site, health, alert) in outcomes {
            let proxy = &mut proxies[index];
            proxy.set_health(&site.id, health);
            if alert {
                proxy.alert = true;
                self.observer.on_alert(&proxy.endpoint, &site.id);
            }
        }

        let snapshot = Arc::new(PoolSnapshot::new(proxies));
        self.swap(snapshot);
        self.save().await
    }

    /// Replace the pool from a source file. A missing file counts as empty.
    pub async fn refresh_from_file(&self, path: &Path) -> Result<ProxyMetrics> {
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("Proxy source {} not found", path.display());
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.refresh(&source).await)
    }

    /// Re-probe one proxy for one site and record the result.
    ///
    /// Returns `None` when the proxy or site is unknown.
    pub async fn probe(&self, endpoint: &ProxyEndpoint, site: &SiteId) -> Option<Health> {
        let site = self.site(site)?.clone();
        self.snapshot().get(endpoint)?;

        let (health, alert) = self.probe_pair(endpoint, &site).await;
        let updated = self.update(endpoint, |proxy| {
            proxy.set_health(&site.id, health);
            proxy.alert |= alert;
        });
        if !updated {
            return None;
        }

        if alert {
            self.observer.on_alert(endpoint, &site.id);
        }
        self.save().await;
        Some(health)
    }

    /// Mark `endpoint` as failed for `site` and raise its alert flag.
    ///
    /// Used by scrapers that hit a bad proxy mid-run. Returns false if the
    /// proxy is no longer in the pool (e.g. replaced by a refresh).
    pub async fn report_failure(&self, endpoint: &ProxyEndpoint, site: &SiteId) -> bool {
        let updated = self.update(endpoint, |proxy| {
            proxy.set_health(site, Health::Failed);
            proxy.alert = true;
        });
        if !updated {
            tracing::debug!("Ignoring failure report for unknown proxy {}", endpoint);
            return false;
        }

        tracing::warn!("Proxy {} marked failed for {}", endpoint, site);
        self.observer.on_alert(endpoint, site);
        self.save().await;
        true
    }

    /// Restore the persisted snapshot, if any. Best effort: a missing or
    /// unreadable file leaves the pool unchanged. Returns the number of
    /// proxies restored.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let mut proxies = match store.load().await {
            Ok(Some(proxies)) => proxies,
            Ok(None) => {
                tracing::debug!("No proxy snapshot at {}", store.path().display());
                return 0;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to restore proxy snapshot from {}: {}",
                    store.path().display(),
                    e
                );
                return 0;
            }
        };

        let mut seen = HashSet::new();
        proxies.retain(|proxy| seen.insert(proxy.endpoint.clone()));
        for proxy in &mut proxies {
            proxy.fill_missing_sites(&self.sites);
        }
        let count = proxies.len();
        self.swap(Arc::new(PoolSnapshot::new(proxies)));

        tracing::info!("Restored {} proxies from snapshot", count);
        self.observer.on_metrics(&self.metrics());
        count
    }

    /// Probe one pair. Errors, panics and timeouts all count as `Failed`;
    /// the flag is true when the probe errored rather than simply not loading.
    async fn probe_pair(&self, endpoint: &ProxyEndpoint, site: &Site) -> (Health, bool) {
        let probe = AssertUnwindSafe(self.driver.probe(&site.base_url, endpoint)).catch_unwind();

        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(Ok(true))) => (Health::Working, false),
            Ok(Ok(Ok(false))) => (Health::Failed, false),
            Ok(Ok(Err(e))) => {
                tracing::warn!("Probe of {} via {} errored: {}", site.id, endpoint, e);
                (Health::Failed, true)
            }
            Ok(Err(_)) => {
                tracing::error!("Probe of {} via {} panicked", site.id, endpoint);
                (Health::Failed, true)
            }
            Err(_) => {
                tracing::debug!(
                    "Probe of {} via {} timed out after {:?}",
                    site.id,
                    endpoint,
                    self.probe_timeout
                );
                (Health::Failed, false)
            }
        }
    }

    /// Copy-on-write update of a single proxy.
    fn update(&self, endpoint: &ProxyEndpoint, apply: impl FnOnce(&mut Proxy)) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut proxies = current.proxies.clone();
        let Some(proxy) = proxies.iter_mut().find(|p| &p.endpoint == endpoint) else {
            return false;
        };
        apply(proxy);
        *current = Arc::new(PoolSnapshot::new(proxies));
        true
    }

    fn swap(&self, snapshot: Arc<PoolSnapshot>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Persist the latest snapshot and push metrics.
    async fn save(&self) -> ProxyMetrics {
        let _persist = self.persist_lock.lock().await;
        let snapshot = self.snapshot();

        if let Some(store) = &self.store {
            if let Err(e) = store.save(snapshot.proxies()).await {
                tracing::warn!(
                    "Failed to save proxy snapshot to {}: {}",
                    store.path().display(),
                    e
                );
            }
        }

        let metrics = ProxyMetrics::compute(snapshot.proxies(), &self.sites);
        self.observer.on_metrics(&metrics);
        metrics
    }
}

impl std::fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyPool")
            .field("sites", &self.sites)
            .field("proxies", &self.snapshot().proxies().len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealscout_browser::{BrowserError, PageSession};

    /// Driver that answers probes from a fixed rule and never opens sessions.
    struct RuleDriver<F>(F);

    #[async_trait::async_trait]
    impl<F> PageDriver for RuleDriver<F>
    where
        F: Fn(&str, &ProxyEndpoint) -> dealscout_browser::Result<bool> + Send + Sync,
    {
        async fn open_session(
            &self,
            _proxy: Option<&ProxyEndpoint>,
        ) -> dealscout_browser::Result<Box<dyn PageSession>> {
            Err(BrowserError::ChromiumError("no sessions in tests".to_string()))
        }

        async fn probe(
            &self,
            url: &str,
            proxy: &ProxyEndpoint,
        ) -> dealscout_browser::Result<bool> {
            (self.0)(url, proxy)
        }
    }

    fn rule<F>(f: F) -> Arc<dyn PageDriver>
    where
        F: Fn(&str, &ProxyEndpoint) -> dealscout_browser::Result<bool> + Send + Sync + 'static,
    {
        Arc::new(RuleDriver(f))
    }

    fn always(reachable: bool) -> Arc<dyn PageDriver> {
        rule(move |_, _| Ok(reachable))
    }

    fn sites() -> Vec<Site> {
        vec![
            Site::new("home_depot", "https://www.homedepot.com").expect("site"),
            Site::new("amazon", "https://www.amazon.com").expect("site"),
        ]
    }

    #[tokio::test]
    async fn test_empty_pool_is_unavailable() {
        let pool = ProxyPool::new(sites(), always(true));
        assert!(!pool.is_available());
        assert!(pool.acquire(&sites()[0].id).is_none());
    }

    #[tokio::test]
    async fn test_refresh_probes_every_pair() {
        let pool = ProxyPool::new(
            sites(),
            rule(|url, proxy| Ok(!(url.contains("amazon") && proxy.port == 2))),
        );

        let metrics = pool.refresh("10.0.0.1:1\n10.0.0.2:2\n").await;
        assert_eq!(metrics.total_proxies, 2);

        let snapshot = pool.snapshot();
        let second = snapshot
            .get(&ProxyEndpoint::new("10.0.0.2", 2))
            .expect("second proxy");
        assert_eq!(second.health(&sites()[0].id), Health::Working);
        assert_eq!(second.health(&sites()[1].id), Health::Failed);
        assert!(!second.alert);
    }

    #[tokio::test]
    async fn test_probe_error_raises_alert() {
        let pool = ProxyPool::new(
            sites(),
            rule(|_, _| Err(BrowserError::ChromiumError("launch failed".to_string()))),
        );
        pool.refresh("10.0.0.1:8080").await;

        let snapshot = pool.snapshot();
        let proxy = &snapshot.proxies()[0];
        assert!(proxy.alert);
        assert!(proxy.sites.values().all(|h| *h == Health::Failed));
    }

    #[tokio::test]
    async fn test_acquire_falls_back_when_all_failed() {
        let pool = ProxyPool::new(sites(), always(false));
        pool.refresh("10.0.0.1:8080").await;

        let proxy = pool.acquire(&sites()[0].id).expect("some proxy");
        assert_eq!(proxy.endpoint, ProxyEndpoint::new("10.0.0.1", 8080));
    }

    #[tokio::test]
    async fn test_report_failure_updates_copy_on_write() {
        let pool = ProxyPool::new(sites(), always(true));
        pool.refresh("10.0.0.1:8080").await;

        let before = pool.snapshot();
        let endpoint = ProxyEndpoint::new("10.0.0.1", 8080);
        assert!(pool.report_failure(&endpoint, &sites()[0].id).await);

        // The old snapshot is untouched; the new one carries the failure
        assert_eq!(before.proxies()[0].health(&sites()[0].id), Health::Working);
        let after = pool.snapshot();
        assert_eq!(after.proxies()[0].health(&sites()[0].id), Health::Failed);
        assert!(after.proxies()[0].alert);

        let unknown = ProxyEndpoint::new("10.9.9.9", 1);
        assert!(!pool.report_failure(&unknown, &sites()[0].id).await);
    }

    #[tokio::test]
    async fn test_probe_single_pair() {
        let pool = ProxyPool::new(sites(), always(true));
        pool.refresh("10.0.0.1:8080").await;
        let endpoint = ProxyEndpoint::new("10.0.0.1", 8080);
        let site = sites()[1].id.clone();

        pool.report_failure(&endpoint, &site).await;
        assert_eq!(pool.probe(&endpoint, &site).await, Some(Health::Working));
        assert_eq!(
            pool.snapshot().proxies()[0].health(&site),
            Health::Working
        );

        let unknown_site = SiteId::new("lowes").expect("site id");
        assert_eq!(pool.probe(&endpoint, &unknown_site).await, None);
    }
}
