//! Discovered records, enrichment results and the merged record store.

use dealscout_core::{RecordId, SiteId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A discounted item found by a discovery scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredRecord {
    /// Stable site-scoped id
    pub id: RecordId,
    /// Site the record was found on
    pub site: SiteId,
    /// Brand name
    pub brand: String,
    /// Product name
    pub name: String,
    /// List price before discount
    pub original_price: Option<f64>,
    /// Current offer price
    pub current_price: Option<f64>,
    /// `original_price - current_price`, 0 when either is unknown
    pub dollar_off: f64,
    /// Discount as a percentage of the original price
    pub percentage_off: f64,
    /// Store department
    pub department: Option<String>,
    /// Product image
    pub image_url: Option<String>,
    /// Product page
    pub url: Option<String>,
    /// When the record was emitted
    pub discovered_at: Timestamp,
    /// Marketplace match, attached by the enrichment stage
    pub enrichment: Option<EnrichmentResult>,
}

impl DiscoveredRecord {
    /// Create a record with no pricing or enrichment.
    #[must_use]
    pub fn new(id: RecordId, site: SiteId, brand: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            site,
            brand: brand.into(),
            name: name.into(),
            original_price: None,
            current_price: None,
            dollar_off: 0.0,
            percentage_off: 0.0,
            department: None,
            image_url: None,
            url: None,
            discovered_at: Timestamp::now(),
            enrichment: None,
        }
    }

    /// Set prices and derive the discount fields.
    #[must_use]
    pub fn with_prices(mut self, original: Option<f64>, current: Option<f64>) -> Self {
        self.original_price = original;
        self.current_price = current;
        (self.dollar_off, self.percentage_off) = match (original, current) {
            (Some(original), Some(current)) if original > 0.0 => {
                let off = original - current;
                (off, off / original * 100.0)
            }
            _ => (0.0, 0.0),
        };
        self
    }

    /// Set the product page URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Free-text query used to find the item on the marketplace.
    ///
    /// Empty when both brand and name are blank.
    #[must_use]
    pub fn search_query(&self) -> String {
        format!("{} {}", self.brand.trim(), self.name.trim())
            .trim()
            .to_string()
    }
}

/// Marketplace match for a discovered record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Generated id
    pub id: Uuid,
    /// Marketplace product id, if the scorer reported one
    pub product_id: Option<String>,
    /// Marketplace price
    pub price: Option<f64>,
    /// Marketplace page that was scored
    pub url: String,
    /// Match confidence as reported, e.g. `"85%"`
    pub confidence: Option<String>,
    /// Marketplace site
    pub site: SiteId,
}

impl EnrichmentResult {
    /// Create a result for `url` with nothing scored yet.
    #[must_use]
    pub fn new(url: impl Into<String>, site: SiteId) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: None,
            price: None,
            url: url.into(),
            confidence: None,
            site,
        }
    }
}

/// Active and archived records with a combined id index.
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    active: Vec<DiscoveredRecord>,
    archived: Vec<DiscoveredRecord>,
    ids: HashSet<RecordId>,
}

impl RecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the archive, e.g. with records kept from a previous run.
    #[must_use]
    pub fn with_archived(mut self, records: impl IntoIterator<Item = DiscoveredRecord>) -> Self {
        for record in records {
            if self.ids.insert(record.id.clone()) {
                self.archived.push(record);
            }
        }
        self
    }

    /// Whether `id` is active or archived.
    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    /// Add a record to the active set. Returns false if the id is already known.
    pub fn merge(&mut self, record: DiscoveredRecord) -> bool {
        if !self.ids.insert(record.id.clone()) {
            return false;
        }
        self.active.push(record);
        true
    }

    /// Move a record from active to archived.
    pub fn archive(&mut self, id: &RecordId) -> bool {
        let Some(index) = self.active.iter().position(|r| &r.id == id) else {
            return false;
        };
        let record = self.active.remove(index);
        self.archived.push(record);
        true
    }

    /// Active records in merge order.
    #[must_use]
    pub fn active(&self) -> &[DiscoveredRecord] {
        &self.active
    }

    /// Archived records in archive order.
    #[must_use]
    pub fn archived(&self) -> &[DiscoveredRecord] {
        &self.archived
    }
}
