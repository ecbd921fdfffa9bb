//! Read-side health and coverage statistics over the proxy pool.

use crate::proxy::{Health, Proxy};
use dealscout_core::{ProxyEndpoint, Site, SiteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coverage of one site across the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMetrics {
    /// Proxies whose last probe loaded the site
    pub working: usize,
    /// Proxies known to fail for the site
    pub failed: usize,
    /// Proxies in the pool
    pub total: usize,
}

/// Point-in-time statistics pushed to observers after every snapshot save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyMetrics {
    /// Proxies in the pool
    pub total_proxies: usize,
    /// Per-site coverage; every known site has an entry
    pub per_site: BTreeMap<SiteId, SiteMetrics>,
}

impl ProxyMetrics {
    /// Derive metrics from a proxy list.
    #[must_use]
    pub fn compute(proxies: &[Proxy], sites: &[Site]) -> Self {
        let total_proxies = proxies.len();
        let mut per_site: BTreeMap<SiteId, SiteMetrics> = sites
            .iter()
            .map(|site| {
                (
                    site.id.clone(),
                    SiteMetrics {
                        total: total_proxies,
                        ..SiteMetrics::default()
                    },
                )
            })
            .collect();

        for proxy in proxies {
            for (site, metrics) in &mut per_site {
                match proxy.health(site) {
                    Health::Working => metrics.working += 1,
                    Health::Failed => metrics.failed += 1,
                    Health::Unknown => {}
                }
            }
        }

        Self {
            total_proxies,
            per_site,
        }
    }

    /// Coverage for one site, if it is known.
    #[must_use]
    pub fn site(&self, site: &SiteId) -> Option<&SiteMetrics> {
        self.per_site.get(site)
    }
}

/// Receives pool events. Called synchronously from whichever task
/// triggered the save, so implementations must be cheap and thread-safe.
pub trait PoolObserver: Send + Sync {
    /// Metrics were recomputed after a snapshot save or restore.
    fn on_metrics(&self, _metrics: &ProxyMetrics) {}

    /// A proxy's alert flag was raised for `site`.
    fn on_alert(&self, _proxy: &ProxyEndpoint, _site: &SiteId) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PoolObserver for NoopObserver {}
