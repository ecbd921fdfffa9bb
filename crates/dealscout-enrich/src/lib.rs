//! Dealscout Enrich - clients for the enrichment lookup.
//!
//! Enrichment is two external calls per record:
//!
//! ```text
//! search query → SearchProvider → best-match URL
//!                                      ↓ (page rendered and captured by caller)
//! MatchVerdict ← MatchScorer ← screenshot + search query
//! ```
//!
//! Both calls are behind traits so the pipeline can be exercised with fakes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod provider;
pub mod providers;
pub mod verdict;

pub use error::{EnrichError, Result};
pub use provider::{MatchScorer, SearchProvider};
pub use providers::{GoogleSearch, OpenAiMatchScorer};
pub use verdict::{parse_price, MatchVerdict};
