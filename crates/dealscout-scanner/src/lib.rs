//! Dealscout Scanner - scraper lifecycle and the discovery pipeline.
//!
//! Discovery scrapers run as independent tasks, each drawing proxies from
//! a shared [`dealscout_proxy::ProxyPool`] and emitting records into a
//! [`DiscoveryPipeline`]. The pipeline deduplicates, queues, and drives a
//! single enrichment worker that looks each record up on a marketplace.
//!
//! ```text
//! ScraperLifecycle ─┐
//! ScraperLifecycle ─┼─ on_discovered ─→ queue ─→ enrichment worker ─→ RecordStore
//! ScraperLifecycle ─┘                    (one active at a time)
//! ```
//!
//! Failures stay local: a scraper failure ends that scraper's run, and an
//! enrichment failure leaves one record unenriched.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod enricher;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod records;

pub use enricher::MarketplaceEnricher;
pub use error::{Result, ScanError, ScrapeError};
pub use lifecycle::{
    DiscoverySink, RunOutcome, ScrapeContext, ScraperLifecycle, ScraperState, SiteRoutine,
    StatusObserver,
};
pub use pipeline::{Admission, DiscoveryPipeline, Enricher, MergeObserver, PipelineStats};
pub use records::{DiscoveredRecord, EnrichmentResult, RecordStore};
