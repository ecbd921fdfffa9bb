use crate::driver::{PageDriver, PageSession};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use dealscout_core::{BrowserConfig, ProxyEndpoint};
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Chromium-backed page driver.
///
/// Every session launches its own browser process so that each one can be
/// routed through a different proxy and torn down independently.
#[derive(Debug, Clone)]
pub struct ChromiumDriver {
    config: BrowserConfig,
}

impl ChromiumDriver {
    /// Create a driver with the given browser settings
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.navigation_timeout_secs)
    }

    fn launch_config(&self, proxy: Option<&ProxyEndpoint>) -> Result<LaunchConfig> {
        let fingerprint = FingerprintConfig::randomized();

        let mut builder = LaunchConfig::builder()
            .no_sandbox()
            .window_size(self.config.window_width, self.config.window_height)
            .request_timeout(self.navigation_timeout())
            .arg(format!("--user-agent={}", fingerprint.user_agent));

        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server_url()));
        }

        builder.build().map_err(BrowserError::ChromiumError)
    }
}

#[async_trait::async_trait]
impl PageDriver for ChromiumDriver {
    async fn open_session(&self, proxy: Option<&ProxyEndpoint>) -> Result<Box<dyn PageSession>> {
        let config = self.launch_config(proxy)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // The handler must be polled for the browser connection to make progress
        let handler_task = HandlerGuard(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler event error: {}", e);
                }
            }
        }));

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        match proxy {
            Some(proxy) => tracing::debug!("Launched browser session via proxy {}", proxy),
            None => tracing::debug!("Launched browser session without proxy"),
        }

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            _handler: handler_task,
            timeout: self.navigation_timeout(),
        }))
    }
}

/// Aborts the browser event loop task when dropped.
///
/// Sessions dropped without `close()`, e.g. a probe cut off by a timeout,
/// would otherwise leave the task running.
struct HandlerGuard(JoinHandle<()>);

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Page,
    _handler: HandlerGuard,
    timeout: Duration,
}

#[async_trait::async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationError(format!("{url}: {e}"))),
            Err(_) => Err(BrowserError::Timeout(format!(
                "{url} did not load within {:?}",
                self.timeout
            ))),
        }
    }

    async fn content(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(true).build();
        match tokio::time::timeout(self.timeout, self.page.screenshot(params)).await {
            Ok(Ok(png)) => Ok(png),
            Ok(Err(e)) => Err(BrowserError::ScreenshotError(e.to_string())),
            Err(_) => Err(BrowserError::Timeout("screenshot".to_string())),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::ChromiumError(e.to_string()));
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser process wait failed: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "Requires Chrome browser to be installed"]
    fn test_launch_config_builds_with_and_without_proxy() {
        let driver = ChromiumDriver::new(BrowserConfig::default());
        assert!(driver.launch_config(None).is_ok());

        let proxy = ProxyEndpoint::new("10.1.2.3", 8080);
        assert!(driver.launch_config(Some(&proxy)).is_ok());
    }

    #[tokio::test]
    async fn test_handler_guard_aborts_task_on_drop() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let guard = HandlerGuard(tokio::spawn(async move {
            let _tx = tx;
            futures::future::pending::<()>().await;
        }));

        drop(guard);
        // The sender is dropped with the aborted task
        let result = tokio::time::timeout(Duration::from_secs(5), rx).await;
        assert!(matches!(result, Ok(Err(_))));
    }

    #[test]
    fn test_navigation_timeout_from_config() {
        let config = BrowserConfig {
            navigation_timeout_secs: 7,
            ..BrowserConfig::default()
        };
        let driver = ChromiumDriver::new(config);
        assert_eq!(driver.navigation_timeout(), Duration::from_secs(7));
    }

    #[tokio::test]
    #[ignore = "Requires Chrome browser to be installed"]
    async fn test_open_and_close_session() {
        let driver = ChromiumDriver::new(BrowserConfig::default());
        let mut session = driver.open_session(None).await.expect("launch browser");
        session
            .navigate("https://www.google.com")
            .await
            .expect("navigate");
        session.close().await.expect("close");
    }
}
