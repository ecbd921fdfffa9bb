//! Fakes shared by the scanner integration tests.

#![allow(dead_code)]

use dealscout_browser::{BrowserError, PageDriver, PageSession};
use dealscout_core::{ProxyEndpoint, RecordId, Site, SiteId};
use dealscout_proxy::ProxyPool;
use dealscout_scanner::{DiscoveredRecord, StatusObserver};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Page driver whose sessions fail navigation through listed proxy hosts.
#[derive(Default)]
pub struct FakeDriver {
    failing_hosts: HashSet<String>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub visited: Arc<Mutex<Vec<String>>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_through(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageDriver for FakeDriver {
    async fn open_session(
        &self,
        proxy: Option<&ProxyEndpoint>,
    ) -> dealscout_browser::Result<Box<dyn PageSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let fails = proxy.is_some_and(|p| self.failing_hosts.contains(&p.host));
        Ok(Box::new(FakeSession {
            fails,
            closed: self.closed.clone(),
            visited: self.visited.clone(),
        }))
    }

    // Every proxy looks healthy during refresh
    async fn probe(&self, _url: &str, _proxy: &ProxyEndpoint) -> dealscout_browser::Result<bool> {
        Ok(true)
    }
}

struct FakeSession {
    fails: bool,
    closed: Arc<AtomicUsize>,
    visited: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl PageSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> dealscout_browser::Result<()> {
        if self.fails {
            return Err(BrowserError::NavigationError(format!("{url}: connection refused")));
        }
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn content(&mut self) -> dealscout_browser::Result<String> {
        Ok("<html></html>".to_string())
    }

    async fn screenshot(&mut self) -> dealscout_browser::Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(self: Box<Self>) -> dealscout_browser::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every status transition.
#[derive(Default)]
pub struct StatusLog {
    pub events: Mutex<Vec<(SiteId, bool)>>,
}

impl StatusLog {
    pub fn events(&self) -> Vec<(SiteId, bool)> {
        self.events.lock().unwrap().clone()
    }
}

impl StatusObserver for StatusLog {
    fn on_status_changed(&self, site: &SiteId, running: bool) {
        self.events.lock().unwrap().push((site.clone(), running));
    }
}

pub fn sites() -> Vec<Site> {
    vec![
        Site::new("home_depot", "https://www.homedepot.com").unwrap(),
        Site::new("lowes", "https://www.lowes.com").unwrap(),
        Site::new("ace", "https://www.acehardware.com").unwrap(),
        Site::new("amazon", "https://www.amazon.com").unwrap(),
    ]
}

pub fn site_id(id: &str) -> SiteId {
    SiteId::new(id).unwrap()
}

pub fn pool(driver: Arc<dyn PageDriver>) -> Arc<ProxyPool> {
    Arc::new(ProxyPool::new(sites(), driver))
}

pub fn record(id: &str, site: &str) -> DiscoveredRecord {
    DiscoveredRecord::new(
        RecordId::new(id).unwrap(),
        site_id(site),
        "DeWalt",
        format!("Drill {id}"),
    )
    .with_prices(Some(199.0), Some(99.0))
}
