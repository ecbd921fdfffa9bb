//! Enrichment provider implementations.

pub mod common;
pub mod google;
pub mod openai;

pub use google::GoogleSearch;
pub use openai::OpenAiMatchScorer;
