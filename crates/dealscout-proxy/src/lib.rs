//! Dealscout Proxy - shared, health-ranked proxy pool.
//!
//! One [`ProxyPool`] is shared by reference across every scraper in a run.
//! It owns the proxy list, per-site health, the persisted snapshot and the
//! metrics derived from them.
//!
//! # Features
//!
//! - Line-oriented `host:port` source parsing
//! - Concurrent (proxy, site) reachability probing on refresh
//! - Copy-on-write snapshots so readers never observe a half-applied refresh
//! - Uniform-random selection among proxies not known to fail for a site
//! - JSON snapshot persistence and metrics pushed to a [`PoolObserver`]
//!
//! # Example
//!
//! ```rust,ignore
//! use dealscout_proxy::ProxyPool;
//! use std::sync::Arc;
//!
//! let pool = Arc::new(ProxyPool::new(config.sites.clone(), Arc::new(driver)));
//! pool.refresh("10.0.0.1:8080\n10.0.0.2:3128\n").await;
//! let proxy = pool.acquire(&site_id);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod metrics;
pub mod pool;
pub mod proxy;
pub mod snapshot;

// Re-export commonly used types
pub use error::{ProxyError, Result};
pub use metrics::{NoopObserver, PoolObserver, ProxyMetrics, SiteMetrics};
pub use pool::{PoolSnapshot, ProxyPool};
pub use proxy::{parse_source, Health, Proxy};
pub use snapshot::SnapshotStore;
