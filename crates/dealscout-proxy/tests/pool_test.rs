//! Pool behaviour against a scripted page driver.

use dealscout_browser::{BrowserError, PageDriver, PageSession};
use dealscout_core::{ProxyEndpoint, Site, SiteId};
use dealscout_proxy::{Health, PoolObserver, Proxy, ProxyMetrics, ProxyPool, SnapshotStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Driver whose probe result depends only on the proxy host.
struct HostDriver {
    working: HashSet<String>,
    hanging: HashSet<String>,
}

impl HostDriver {
    fn new(working: &[&str]) -> Self {
        Self {
            working: working.iter().map(ToString::to_string).collect(),
            hanging: HashSet::new(),
        }
    }

    fn hanging(mut self, host: &str) -> Self {
        self.hanging.insert(host.to_string());
        self
    }
}

#[async_trait::async_trait]
impl PageDriver for HostDriver {
    async fn open_session(
        &self,
        _proxy: Option<&ProxyEndpoint>,
    ) -> dealscout_browser::Result<Box<dyn PageSession>> {
        Err(BrowserError::ChromiumError("not used".to_string()))
    }

    async fn probe(&self, _url: &str, proxy: &ProxyEndpoint) -> dealscout_browser::Result<bool> {
        if self.hanging.contains(&proxy.host) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self.working.contains(&proxy.host))
    }
}

#[derive(Default)]
struct RecordingObserver {
    metrics: Mutex<Vec<ProxyMetrics>>,
    alerts: Mutex<Vec<(ProxyEndpoint, SiteId)>>,
}

impl PoolObserver for RecordingObserver {
    fn on_metrics(&self, metrics: &ProxyMetrics) {
        self.metrics.lock().unwrap().push(metrics.clone());
    }

    fn on_alert(&self, proxy: &ProxyEndpoint, site: &SiteId) {
        self.alerts.lock().unwrap().push((proxy.clone(), site.clone()));
    }
}

fn home_depot() -> Vec<Site> {
    vec![Site::new("home_depot", "https://www.homedepot.com").unwrap()]
}

#[tokio::test]
async fn test_acquire_never_returns_failed_proxy_when_alternative_exists() {
    let sites = home_depot();
    let site = sites[0].id.clone();
    let pool = ProxyPool::new(sites, Arc::new(HostDriver::new(&["b"])));

    pool.refresh("a:1\nb:2\n").await;

    for _ in 0..50 {
        let proxy = pool.acquire(&site).expect("pool is available");
        assert_eq!(proxy.endpoint, ProxyEndpoint::new("b", 2));
    }
}

#[tokio::test]
async fn test_repeated_source_lines_are_one_proxy() {
    let sites = home_depot();
    let site = sites[0].id.clone();
    let pool = ProxyPool::new(sites, Arc::new(HostDriver::new(&["10.0.0.1", "10.0.0.2"])));

    let metrics = pool.refresh("10.0.0.1:80\n10.0.0.1:80\n10.0.0.2:81\n").await;
    assert_eq!(metrics.total_proxies, 2);
    assert_eq!(metrics.site(&site).unwrap().total, 2);

    let reported = ProxyEndpoint::new("10.0.0.1", 80);
    assert!(pool.report_failure(&reported, &site).await);

    for _ in 0..200 {
        let proxy = pool.acquire(&site).expect("pool is available");
        assert_ne!(proxy.endpoint, reported);
    }
}

#[tokio::test]
async fn test_restore_drops_repeated_endpoints() {
    let tmp = TempDir::new().unwrap();
    let store = SnapshotStore::new(tmp.path().join("proxies_status.json"));
    let sites = home_depot();
    let site = sites[0].id.clone();

    let mut failed = Proxy::new(ProxyEndpoint::new("a", 1), &sites);
    failed.set_health(&site, Health::Failed);
    let fresh = Proxy::new(ProxyEndpoint::new("a", 1), &sites);
    let other = Proxy::new(ProxyEndpoint::new("b", 2), &sites);
    store.save(&[failed, fresh, other]).await.unwrap();

    let pool = ProxyPool::new(sites, Arc::new(HostDriver::new(&[]))).with_snapshot_store(store);
    assert_eq!(pool.restore().await, 2);

    let snapshot = pool.snapshot();
    let kept = snapshot.get(&ProxyEndpoint::new("a", 1)).unwrap();
    assert_eq!(kept.health(&site), Health::Failed);
    assert_eq!(pool.metrics().total_proxies, 2);
}

#[tokio::test]
async fn test_empty_refresh_makes_pool_unavailable() {
    let sites = home_depot();
    let site = sites[0].id.clone();
    let pool = ProxyPool::new(sites, Arc::new(HostDriver::new(&["a"])));

    pool.refresh("a:1\n").await;
    assert!(pool.is_available());

    let metrics = pool.refresh("").await;
    assert_eq!(metrics.total_proxies, 0);
    assert!(!pool.is_available());
    assert!(pool.acquire(&site).is_none());
}

#[tokio::test]
async fn test_all_failed_still_hands_out_a_proxy() {
    let sites = home_depot();
    let site = sites[0].id.clone();
    let pool = ProxyPool::new(sites, Arc::new(HostDriver::new(&[])));

    pool.refresh("a:1\nb:2\n").await;

    let proxy = pool.acquire(&site).expect("fallback proxy");
    assert_eq!(proxy.health(&site), Health::Failed);
}

#[tokio::test]
async fn test_probe_timeout_marks_failed_without_alert() {
    let sites = home_depot();
    let site = sites[0].id.clone();
    let driver = HostDriver::new(&["a", "slow"]).hanging("slow");
    let pool = ProxyPool::new(sites, Arc::new(driver)).with_probe_timeout(Duration::from_millis(50));

    let metrics = pool.refresh("a:1\nslow:2\n").await;
    let coverage = metrics.site(&site).expect("site metrics");
    assert_eq!(coverage.working, 1);
    assert_eq!(coverage.failed, 1);

    let snapshot = pool.snapshot();
    let slow = snapshot.get(&ProxyEndpoint::new("slow", 2)).expect("slow proxy");
    assert_eq!(slow.health(&site), Health::Failed);
    assert!(!slow.alert);
}

#[tokio::test]
async fn test_report_failure_persists_and_pushes_metrics() {
    let tmp = TempDir::new().unwrap();
    let snapshot_path = tmp.path().join("proxies_status.json");
    let sites = home_depot();
    let site = sites[0].id.clone();
    let observer = Arc::new(RecordingObserver::default());

    let pool = ProxyPool::new(sites, Arc::new(HostDriver::new(&["a"])))
        .with_snapshot_store(SnapshotStore::new(&snapshot_path))
        .with_observer(observer.clone());

    pool.refresh("a:1\n").await;
    let endpoint = ProxyEndpoint::new("a", 1);
    assert!(pool.report_failure(&endpoint, &site).await);

    let saved = SnapshotStore::new(&snapshot_path)
        .load()
        .await
        .unwrap()
        .expect("snapshot written");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].health(&site), Health::Failed);
    assert!(saved[0].alert);

    let metrics = observer.metrics.lock().unwrap();
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[1].site(&site).unwrap().failed, 1);
    assert_eq!(*observer.alerts.lock().unwrap(), vec![(endpoint, site)]);
}

#[tokio::test]
async fn test_restore_fills_new_sites() {
    let tmp = TempDir::new().unwrap();
    let snapshot_path = tmp.path().join("proxies_status.json");

    let first = ProxyPool::new(home_depot(), Arc::new(HostDriver::new(&["a"])))
        .with_snapshot_store(SnapshotStore::new(&snapshot_path));
    first.refresh("a:1\n").await;

    let mut sites = home_depot();
    sites.push(Site::new("lowes", "https://www.lowes.com").unwrap());
    let lowes = sites[1].id.clone();
    let second = ProxyPool::new(sites, Arc::new(HostDriver::new(&[])))
        .with_snapshot_store(SnapshotStore::new(&snapshot_path));

    assert_eq!(second.restore().await, 1);
    let snapshot = second.snapshot();
    assert_eq!(snapshot.proxies()[0].health(&lowes), Health::Unknown);
    assert_eq!(
        snapshot.proxies()[0].health(&home_depot()[0].id),
        Health::Working
    );
}

#[tokio::test]
async fn test_refresh_from_missing_file_is_empty() {
    let tmp = TempDir::new().unwrap();
    let pool = ProxyPool::new(home_depot(), Arc::new(HostDriver::new(&[])));

    let metrics = pool
        .refresh_from_file(&tmp.path().join("proxies.txt"))
        .await
        .unwrap();
    assert_eq!(metrics.total_proxies, 0);
    assert!(!pool.is_available());
}
