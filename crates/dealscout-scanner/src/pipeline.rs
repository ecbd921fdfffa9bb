//! Discovery to enrichment hand-off.
//!
//! Scrapers call [`DiscoverySink::on_discovered`] from their own tasks. New
//! records go onto an unbounded FIFO queue, and a single enrichment worker
//! drains it one record at a time. The worker gate is an `AtomicBool`: the
//! caller that flips it from false to true spawns the worker, everyone else
//! just enqueues.

use crate::error::{Result, ScanError};
use crate::lifecycle::DiscoverySink;
use crate::records::{DiscoveredRecord, EnrichmentResult, RecordStore};
use async_trait::async_trait;
use dealscout_core::RecordId;
use futures::FutureExt;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Default upper bound on how long `wait_idle` sleeps between checks.
const DEFAULT_IDLE_POLL: Duration = Duration::from_secs(1);

/// One enrichment pass for one record.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Look the record up on the second source. `Ok(None)` means no match.
    async fn enrich(&self, record: &DiscoveredRecord) -> Result<Option<EnrichmentResult>>;
}

/// Notified after a record lands in the active set.
pub trait MergeObserver: Send + Sync {
    /// Called once per merged record, from the worker task.
    fn on_record_merged(&self, record: &DiscoveredRecord);
}

struct NoopMerge;

impl MergeObserver for NoopMerge {
    fn on_record_merged(&self, _record: &DiscoveredRecord) {}
}

/// Result of offering a record to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Accepted and queued for enrichment
    Queued,
    /// Already pending, active or archived; dropped
    Duplicate,
}

/// Counters for monitoring and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Enrichment workers started over the pipeline's lifetime
    pub workers_spawned: usize,
    /// Records that received an enrichment result
    pub enriched: usize,
    /// Records merged into the active set
    pub merged: usize,
    /// Submissions dropped as duplicates
    pub duplicates: usize,
    /// Records currently waiting or in flight
    pub queued: usize,
}

#[derive(Default)]
struct Pending {
    queue: VecDeque<DiscoveredRecord>,
    /// Ids queued or in flight; cleared when the record is merged
    ids: HashSet<RecordId>,
}

struct Shared {
    enricher: Arc<dyn Enricher>,
    observer: Arc<dyn MergeObserver>,
    runtime: Handle,
    idle_poll: Duration,
    // Lock order: pending before store
    pending: Mutex<Pending>,
    store: Mutex<RecordStore>,
    active: AtomicBool,
    idle: Notify,
    workers_spawned: AtomicUsize,
    enriched: AtomicUsize,
    merged: AtomicUsize,
    duplicates: AtomicUsize,
}

/// Queue plus single-worker gate between discovery scrapers and enrichment.
///
/// Cheap to clone; clones share the same queue and store.
#[derive(Clone)]
pub struct DiscoveryPipeline {
    shared: Arc<Shared>,
}

impl DiscoveryPipeline {
    /// Create a pipeline whose worker runs on the current tokio runtime.
    pub fn new(enricher: Arc<dyn Enricher>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| ScanError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(enricher, runtime))
    }

    /// Create a pipeline whose worker runs on `runtime`.
    #[must_use]
    pub fn with_runtime(enricher: Arc<dyn Enricher>, runtime: Handle) -> Self {
        Self::build(enricher, runtime, Arc::new(NoopMerge), RecordStore::new(), DEFAULT_IDLE_POLL)
    }

    /// Notify `observer` on every merge.
    #[must_use]
    pub fn with_merge_observer(self, observer: Arc<dyn MergeObserver>) -> Self {
        self.rebuild(|parts| parts.observer = observer)
    }

    /// Start from an existing store, e.g. one seeded with archived records.
    #[must_use]
    pub fn with_store(self, store: RecordStore) -> Self {
        self.rebuild(|parts| parts.store = store)
    }

    /// Upper bound on `wait_idle`'s sleep between checks.
    #[must_use]
    pub fn with_idle_poll(self, interval: Duration) -> Self {
        self.rebuild(|parts| parts.idle_poll = interval)
    }

    fn build(
        enricher: Arc<dyn Enricher>,
        runtime: Handle,
        observer: Arc<dyn MergeObserver>,
        store: RecordStore,
        idle_poll: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                enricher,
                observer,
                runtime,
                idle_poll,
                pending: Mutex::new(Pending::default()),
                store: Mutex::new(store),
                active: AtomicBool::new(false),
                idle: Notify::new(),
                workers_spawned: AtomicUsize::new(0),
                enriched: AtomicUsize::new(0),
                merged: AtomicUsize::new(0),
                duplicates: AtomicUsize::new(0),
            }),
        }
    }

    /// Clones taken before a builder call keep the old settings.
    fn rebuild(self, apply: impl FnOnce(&mut Parts)) -> Self {
        let shared = &self.shared;
        let mut parts = Parts {
            enricher: shared.enricher.clone(),
            observer: shared.observer.clone(),
            runtime: shared.runtime.clone(),
            store: lock(&shared.store).clone(),
            idle_poll: shared.idle_poll,
        };
        apply(&mut parts);
        Self::build(parts.enricher, parts.runtime, parts.observer, parts.store, parts.idle_poll)
    }

    /// Start the worker if records are waiting and none is active.
    ///
    /// Returns true if this call spawned it.
    pub fn ensure_worker(&self) -> bool {
        Shared::ensure_worker(&self.shared)
    }

    /// Resolve once the queue is empty and no worker is active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.is_idle() {
                return;
            }
            let _ = tokio::time::timeout(self.shared.idle_poll, notified).await;
        }
    }

    /// Whether nothing is queued and no worker is active.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.shared.active.load(Ordering::Acquire) && lock(&self.shared.pending).ids.is_empty()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let shared = &self.shared;
        PipelineStats {
            workers_spawned: shared.workers_spawned.load(Ordering::Relaxed),
            enriched: shared.enriched.load(Ordering::Relaxed),
            merged: shared.merged.load(Ordering::Relaxed),
            duplicates: shared.duplicates.load(Ordering::Relaxed),
            queued: lock(&shared.pending).ids.len(),
        }
    }

    /// Active records in merge order.
    #[must_use]
    pub fn active_records(&self) -> Vec<DiscoveredRecord> {
        lock(&self.shared.store).active().to_vec()
    }

    /// Whether `id` is active or archived.
    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        lock(&self.shared.store).contains(id)
    }

    /// Move a record from the active set to the archive.
    pub fn archive(&self, id: &RecordId) -> bool {
        lock(&self.shared.store).archive(id)
    }
}

impl DiscoverySink for DiscoveryPipeline {
    fn on_discovered(&self, record: DiscoveredRecord) -> Admission {
        let shared = &self.shared;
        {
            let mut pending = lock(&shared.pending);
            let known = pending.ids.contains(&record.id) || lock(&shared.store).contains(&record.id);
            if known {
                shared.duplicates.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropping duplicate record {}", record.id);
                return Admission::Duplicate;
            }
            tracing::debug!("Queued {} from {}", record.id, record.site);
            pending.ids.insert(record.id.clone());
            pending.queue.push_back(record);
        }

        Shared::ensure_worker(shared);
        Admission::Queued
    }
}

impl std::fmt::Debug for DiscoveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryPipeline")
            .field("stats", &self.stats())
            .field("active", &self.shared.active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

struct Parts {
    enricher: Arc<dyn Enricher>,
    observer: Arc<dyn MergeObserver>,
    runtime: Handle,
    store: RecordStore,
    idle_poll: Duration,
}

impl Shared {
    fn ensure_worker(this: &Arc<Self>) -> bool {
        if lock(&this.pending).queue.is_empty() {
            return false;
        }
        if !this.try_take_gate() {
            return false;
        }

        let spawned = this.workers_spawned.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!("Starting enrichment worker #{}", spawned);
        this.runtime.spawn(Self::drain(this.clone()));
        true
    }

    fn try_take_gate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn drain(this: Arc<Self>) {
        loop {
            while let Some(record) = this.pop() {
                this.process(record).await;
                tokio::task::yield_now().await;
            }

            this.active.store(false, Ordering::Release);

            // A record queued after the last pop saw the gate still held
            if lock(&this.pending).queue.is_empty() || !this.try_take_gate() {
                break;
            }
            tracing::debug!("Enrichment worker re-took the gate for late records");
        }

        tracing::info!("Enrichment queue drained, worker exiting");
        this.idle.notify_waiters();
    }

    fn pop(&self) -> Option<DiscoveredRecord> {
        lock(&self.pending).queue.pop_front()
    }

    async fn process(&self, mut record: DiscoveredRecord) {
        let query = record.search_query();
        record.enrichment = if query.is_empty() {
            tracing::debug!("Record {} has no search query, skipping enrichment", record.id);
            None
        } else {
            tracing::debug!("Enriching {}: {:?}", record.id, query);
            match AssertUnwindSafe(self.enricher.enrich(&record)).catch_unwind().await {
                Ok(Ok(Some(result))) => {
                    self.enriched.fetch_add(1, Ordering::Relaxed);
                    Some(result)
                }
                Ok(Ok(None)) => {
                    tracing::info!("No marketplace match for {}", record.id);
                    None
                }
                Ok(Err(e)) => {
                    tracing::warn!("Enrichment failed for {}: {}", record.id, e);
                    None
                }
                Err(_) => {
                    tracing::error!("Enrichment panicked for {}", record.id);
                    None
                }
            }
        };

        self.merge(record);
    }

    fn merge(&self, record: DiscoveredRecord) {
        let id = record.id.clone();
        let merged = {
            let mut pending = lock(&self.pending);
            let mut store = lock(&self.store);
            pending.ids.remove(&id);
            store.merge(record.clone())
        };

        if merged {
            self.merged.fetch_add(1, Ordering::Relaxed);
            let notify = AssertUnwindSafe(|| self.observer.on_record_merged(&record));
            if std::panic::catch_unwind(notify).is_err() {
                tracing::error!("Merge observer panicked for {}", id);
            }
        } else {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Record {} was merged elsewhere, dropping", id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
