use crate::error::Result;
use dealscout_core::ProxyEndpoint;

/// Capability for opening browser sessions, optionally routed through a proxy.
#[async_trait::async_trait]
pub trait PageDriver: Send + Sync {
    /// Launch a fresh session. `None` runs without a proxy.
    async fn open_session(&self, proxy: Option<&ProxyEndpoint>) -> Result<Box<dyn PageSession>>;

    /// Check whether `url` loads through `proxy`.
    ///
    /// `Ok(false)` means the page did not load; `Err` means the session
    /// itself could not be brought up.
    async fn probe(&self, url: &str, proxy: &ProxyEndpoint) -> Result<bool> {
        let mut session = self.open_session(Some(proxy)).await?;
        let reachable = match session.navigate(url).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Probe of {} via {} failed: {}", url, proxy, e);
                false
            }
        };
        if let Err(e) = session.close().await {
            tracing::warn!("Failed to tear down probe session for {}: {}", proxy, e);
        }
        Ok(reachable)
    }
}

/// A live browser page. Must be released with [`PageSession::close`].
#[async_trait::async_trait]
pub trait PageSession: Send {
    /// Navigate to a URL and wait for it to load
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Rendered HTML of the current page
    async fn content(&mut self) -> Result<String>;

    /// Full-page PNG screenshot
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Tear down the page and its browser
    async fn close(self: Box<Self>) -> Result<()>;
}
