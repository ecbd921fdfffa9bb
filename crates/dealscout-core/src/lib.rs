//! Dealscout Core - Foundation crate for the dealscout scraping orchestrator.
//!
//! This crate provides shared types, error handling and configuration
//! management that the proxy, browser, enrichment and scanner crates
//! depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`SiteId`, `RecordId`, `Timestamp`), `Site` and `ProxyEndpoint`
//!
//! # Example
//!
//! ```rust
//! use dealscout_core::{AppConfig, SiteId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let amazon = SiteId::new("amazon")?;
//! assert!(config.sites.iter().any(|site| site.id == amazon));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, BrowserConfig, EnrichmentConfig, ProxyConfig};
pub use error::{ConfigError, ConfigResult, Result, ScoutError};
pub use types::{ProxyEndpoint, RecordId, Site, SiteId, Timestamp};
