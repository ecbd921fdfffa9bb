//! Proxy entity, per-site health and source parsing.

use dealscout_core::{ProxyEndpoint, Site, SiteId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Reachability of one site through one proxy.
///
/// Persisted as `true` / `false` / `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Health {
    /// Not probed yet
    #[default]
    Unknown,
    /// Last probe loaded the site
    Working,
    /// Last probe failed, or a scraper reported the proxy as bad
    Failed,
}

impl From<Option<bool>> for Health {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unknown,
            Some(true) => Self::Working,
            Some(false) => Self::Failed,
        }
    }
}

impl From<Health> for Option<bool> {
    fn from(health: Health) -> Self {
        match health {
            Health::Unknown => None,
            Health::Working => Some(true),
            Health::Failed => Some(false),
        }
    }
}

/// A proxy with its per-site health and alert flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    /// Address of the proxy
    #[serde(flatten)]
    pub endpoint: ProxyEndpoint,
    /// Health keyed by site, one entry per known site
    pub sites: BTreeMap<SiteId, Health>,
    /// Raised when a probe errors or a scraper reports the proxy as bad
    #[serde(default)]
    pub alert: bool,
}

impl Proxy {
    /// Create a proxy with `Unknown` health for every known site.
    #[must_use]
    pub fn new(endpoint: ProxyEndpoint, sites: &[Site]) -> Self {
        Self {
            endpoint,
            sites: sites
                .iter()
                .map(|site| (site.id.clone(), Health::Unknown))
                .collect(),
            alert: false,
        }
    }

    /// Health for `site`; sites without an entry are `Unknown`.
    #[must_use]
    pub fn health(&self, site: &SiteId) -> Health {
        self.sites.get(site).copied().unwrap_or_default()
    }

    /// Record health for `site`.
    pub fn set_health(&mut self, site: &SiteId, health: Health) {
        self.sites.insert(site.clone(), health);
    }

    /// Whether this proxy may be handed out for `site`.
    #[must_use]
    pub fn is_eligible(&self, site: &SiteId) -> bool {
        self.health(site) != Health::Failed
    }

    /// Add `Unknown` entries for known sites missing from the map.
    pub(crate) fn fill_missing_sites(&mut self, sites: &[Site]) {
        for site in sites {
            self.sites.entry(site.id.clone()).or_default();
        }
    }
}

/// Parse a newline-delimited `host:port` list.
///
/// Blank lines, lines without a colon and lines with an invalid port are
/// skipped. A repeated endpoint keeps its first position.
#[must_use]
pub fn parse_source(source: &str) -> Vec<ProxyEndpoint> {
    let mut seen = HashSet::new();
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (host, port) = line.rsplit_once(':')?;
            let host = host.trim();
            if host.is_empty() {
                return None;
            }
            match port.trim().parse::<u16>() {
                Ok(port) => Some(ProxyEndpoint::new(host, port)),
                Err(_) => {
                    tracing::debug!("Skipping proxy line with invalid port: {}", line);
                    None
                }
            }
        })
        .filter(|endpoint| seen.insert(endpoint.clone()))
        .collect()
}
