//! Per-scraper lifecycle: `Idle → Running → (Stopping) → Idle`.
//!
//! Each run is one tokio task with its own cancellation token. Cleanup and
//! the terminal status callback happen on every exit path, including a
//! panicking routine.

use crate::error::{Result, ScanError, ScrapeError};
use crate::pipeline::Admission;
use crate::records::DiscoveredRecord;
use async_trait::async_trait;
use dealscout_browser::{PageDriver, PageSession};
use dealscout_core::{ProxyEndpoint, Site, SiteId};
use dealscout_proxy::ProxyPool;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Site-specific browsing routine driven by a [`ScraperLifecycle`].
#[async_trait]
pub trait SiteRoutine: Send + 'static {
    /// Site this routine scrapes
    fn site(&self) -> &SiteId;

    /// Run to completion. Should call [`ScrapeContext::checkpoint`] between
    /// steps so a stop request is observed.
    async fn run(&mut self, ctx: &mut ScrapeContext) -> std::result::Result<(), ScrapeError>;
}

/// Receives newly found records. Called from scraper tasks concurrently.
pub trait DiscoverySink: Send + Sync {
    /// Offer a record for enrichment and merging.
    fn on_discovered(&self, record: DiscoveredRecord) -> Admission;
}

/// Receives running/idle transitions.
pub trait StatusObserver: Send + Sync {
    /// `running` is true on start and false once the run has fully ended.
    fn on_status_changed(&self, site: &SiteId, running: bool);
}

struct NoopStatus;

impl StatusObserver for NoopStatus {
    fn on_status_changed(&self, _site: &SiteId, _running: bool) {}
}

/// Lifecycle state of one scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScraperState {
    /// Not running
    #[default]
    Idle,
    /// Task active
    Running,
    /// Stop requested, task still winding down
    Stopping,
}

/// How the last run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Routine returned normally
    Completed,
    /// Stopped after a bad proxy; restart to draw a fresh one
    BadProxy,
    /// Stopped on request
    Cancelled,
    /// Any other error or a panic
    Failed(String),
}

/// Collaborators handed to a running [`SiteRoutine`].
pub struct ScrapeContext {
    site: Site,
    pool: Arc<ProxyPool>,
    driver: Arc<dyn PageDriver>,
    sink: Arc<dyn DiscoverySink>,
    cancel: CancellationToken,
    session: Option<Box<dyn PageSession>>,
    proxy: Option<ProxyEndpoint>,
    emitted: usize,
}

impl ScrapeContext {
    fn new(
        site: Site,
        pool: Arc<ProxyPool>,
        driver: Arc<dyn PageDriver>,
        sink: Arc<dyn DiscoverySink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            site,
            pool,
            driver,
            sink,
            cancel,
            session: None,
            proxy: None,
            emitted: 0,
        }
    }

    /// Site being scraped.
    #[must_use]
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Draw a proxy for this site. `None` means run without one.
    #[must_use]
    pub fn acquire_proxy(&self) -> Option<ProxyEndpoint> {
        self.pool.acquire(&self.site.id).map(|proxy| proxy.endpoint)
    }

    /// Proxy the current session was launched with.
    #[must_use]
    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }

    /// Open a page session, closing any previous one.
    pub async fn launch(
        &mut self,
        proxy: Option<ProxyEndpoint>,
    ) -> std::result::Result<&mut (dyn PageSession + 'static), ScrapeError> {
        self.close_session().await;
        let session = self.driver.open_session(proxy.as_ref()).await?;
        self.proxy = proxy;
        Ok(&mut **self.session.insert(session))
    }

    /// The open session.
    pub fn session(&mut self) -> std::result::Result<&mut (dyn PageSession + 'static), ScrapeError> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| ScrapeError::Other("no browser session launched".to_string()))
    }

    /// Navigate the session to the site's home page.
    ///
    /// If this fails while routed through a proxy, the proxy is reported to
    /// the pool and `BadProxy` is returned.
    pub async fn go_home(&mut self) -> std::result::Result<(), ScrapeError> {
        let url = self.site.base_url.clone();
        let Err(e) = self.session()?.navigate(&url).await else {
            return Ok(());
        };

        match self.proxy.clone() {
            Some(proxy) => {
                tracing::warn!("Initial navigation to {} via {} failed: {}", url, proxy, e);
                self.pool.report_failure(&proxy, &self.site.id).await;
                Err(ScrapeError::BadProxy {
                    proxy,
                    site: self.site.id.clone(),
                })
            }
            None => Err(ScrapeError::Browser(e)),
        }
    }

    /// Hand a found record to the discovery sink.
    pub fn emit(&mut self, record: DiscoveredRecord) -> Admission {
        self.emitted += 1;
        self.sink.on_discovered(record)
    }

    /// Records emitted so far in this run.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Cooperative yield point. Returns `Cancelled` once stop is requested.
    pub async fn checkpoint(&mut self) -> std::result::Result<(), ScrapeError> {
        tokio::task::yield_now().await;
        if self.cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        Ok(())
    }

    /// Whether stop has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!("Failed to close session for {}: {}", self.site.id, e);
            }
        }
        self.proxy = None;
    }
}

struct Control {
    state: ScraperState,
    cancel: CancellationToken,
    done: Option<watch::Receiver<bool>>,
    last_outcome: Option<RunOutcome>,
}

/// Start/stop control for one site routine.
pub struct ScraperLifecycle {
    site: Site,
    routine: Arc<tokio::sync::Mutex<Box<dyn SiteRoutine>>>,
    pool: Arc<ProxyPool>,
    driver: Arc<dyn PageDriver>,
    sink: Arc<dyn DiscoverySink>,
    status: Arc<dyn StatusObserver>,
    control: Arc<Mutex<Control>>,
}

impl ScraperLifecycle {
    /// Wrap `routine`. Its site must be known to `pool`.
    pub fn new(
        routine: Box<dyn SiteRoutine>,
        pool: Arc<ProxyPool>,
        driver: Arc<dyn PageDriver>,
        sink: Arc<dyn DiscoverySink>,
    ) -> Result<Self> {
        let site = pool
            .site(routine.site())
            .cloned()
            .ok_or_else(|| ScanError::UnknownSite(routine.site().clone()))?;

        Ok(Self {
            site,
            routine: Arc::new(tokio::sync::Mutex::new(routine)),
            pool,
            driver,
            sink,
            status: Arc::new(NoopStatus),
            control: Arc::new(Mutex::new(Control {
                state: ScraperState::Idle,
                cancel: CancellationToken::new(),
                done: None,
                last_outcome: None,
            })),
        })
    }

    /// Report transitions to `observer`.
    #[must_use]
    pub fn with_status_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.status = observer;
        self
    }

    /// Site this scraper runs against.
    #[must_use]
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScraperState {
        self.lock().state
    }

    /// Outcome of the most recent finished run.
    #[must_use]
    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.lock().last_outcome.clone()
    }

    /// Start a run in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut control = self.lock();
        if control.state != ScraperState::Idle {
            return Err(ScanError::AlreadyRunning {
                site: self.site.id.clone(),
            });
        }

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        control.state = ScraperState::Running;
        control.cancel = cancel.clone();
        control.done = Some(done_rx);

        let site = self.site.clone();
        let routine = self.routine.clone();
        let ctx = ScrapeContext::new(
            site.clone(),
            self.pool.clone(),
            self.driver.clone(),
            self.sink.clone(),
            cancel,
        );
        let status = self.status.clone();
        let control_handle = self.control.clone();

        tracing::info!("Starting scraper for {}", site.id);
        tokio::spawn(async move {
            report_status(&*status, &site.id, true);

            let outcome = run_once(routine, ctx).await;
            log_outcome(&site.id, &outcome);

            {
                let mut control = control_handle.lock().unwrap_or_else(PoisonError::into_inner);
                control.state = ScraperState::Idle;
                control.last_outcome = Some(outcome);
            }
            report_status(&*status, &site.id, false);
            let _ = done_tx.send(true);
        });

        Ok(())
    }

    /// Request a cooperative stop and wait for the run to end.
    ///
    /// No-op when idle. An in-flight external call is allowed to finish.
    pub async fn stop(&self) {
        let done = {
            let mut control = self.lock();
            if control.state == ScraperState::Idle {
                return;
            }
            tracing::info!("Stopping scraper for {}", self.site.id);
            control.state = ScraperState::Stopping;
            control.cancel.cancel();
            control.done.clone()
        };
        wait_done(done).await;
    }

    /// Wait for the current run, if any, to end without requesting a stop.
    pub async fn wait(&self) {
        let done = self.lock().done.clone();
        wait_done(done).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ScraperLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperLifecycle")
            .field("site", &self.site.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Run the routine, always closing the session afterwards.
async fn run_once(
    routine: Arc<tokio::sync::Mutex<Box<dyn SiteRoutine>>>,
    mut ctx: ScrapeContext,
) -> RunOutcome {
    let result = {
        let mut routine = routine.lock().await;
        AssertUnwindSafe(routine.run(&mut ctx)).catch_unwind().await
    };

    ctx.close_session().await;
    tracing::debug!("Scraper for {} emitted {} records", ctx.site.id, ctx.emitted);

    match result {
        Ok(Ok(())) => RunOutcome::Completed,
        Ok(Err(ScrapeError::Cancelled)) => RunOutcome::Cancelled,
        Ok(Err(ScrapeError::BadProxy { .. })) => RunOutcome::BadProxy,
        Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
        Err(panic) => RunOutcome::Failed(format!("routine panicked: {}", panic_message(&*panic))),
    }
}

/// Observer panics are logged so the lifecycle still reaches `Idle`.
fn report_status(status: &dyn StatusObserver, site: &SiteId, running: bool) {
    let notify = AssertUnwindSafe(|| status.on_status_changed(site, running));
    if std::panic::catch_unwind(notify).is_err() {
        tracing::error!("Status observer panicked for {}", site);
    }
}

fn log_outcome(site: &SiteId, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed => tracing::info!("Scraper for {} completed", site),
        RunOutcome::Cancelled => tracing::info!("Scraper for {} stopped", site),
        RunOutcome::BadProxy => {
            tracing::warn!("Scraper for {} stopped on a bad proxy", site);
        }
        RunOutcome::Failed(reason) => tracing::error!("Scraper for {} failed: {}", site, reason),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn wait_done(done: Option<watch::Receiver<bool>>) {
    if let Some(mut done) = done {
        // A dropped sender means the task is gone either way
        let _ = done.wait_for(|finished| *finished).await;
    }
}
