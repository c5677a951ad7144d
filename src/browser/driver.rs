//! Chrome CDP capability layer.
//!
//! Wraps one shared [`chromiumoxide::Browser`]; windows are isolated browser
//! contexts, tabs are pages created inside a window's context. Every command
//! issued against a tab is bounded by the tab's deadline, so a stalled page
//! cannot outlive its request.

use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    ScreenOrientation, ScreenOrientationType, SetDeviceMetricsOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::EnableParams as NetworkEnableParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EnableParams as PageEnableParams, EventLifecycleEvent,
    PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;

use crate::error::Error;
use crate::models::Orientation;
use crate::registry::{new_session_id, TabSession, WindowSession, DEFAULT_WINDOW_TIMEOUT};

/// How often element polls retry while waiting for a node to appear.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Scrolls both document roots to the bottom; sites disagree about which
/// element actually scrolls.
const SCROLL_CMD: &str = concat!(
    r#"document.documentElement.style.overflow = ""; "#,
    "document.documentElement.scrollTo(0,document.body.scrollHeight);",
    r#"document.body.style.overflow = ""; "#,
    "document.body.scrollTo(0,document.body.scrollHeight);"
);

/// Shared browser process plus the capability set the interpreter compiles
/// against.
pub struct Driver {
    browser: Browser,
}

impl Driver {
    /// Launch the browser and start draining its event handler.
    pub async fn launch(headless: bool) -> Result<Self, Error> {
        let mut builder = BrowserConfig::builder()
            .viewport(None)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--mute-audio")
            .arg("--no-first-run");

        if !headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(Error::Driver)?;
        let (browser, mut handler) = Browser::launch(config).await?;

        // Drain protocol events; individual consumers subscribe per page.
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self { browser })
    }

    /// Create a window: an isolated browser context with a persistent
    /// `about:blank` keeper page so the context survives with no client tabs.
    pub async fn create_window(&self, id_hint: &str) -> Result<WindowSession, Error> {
        let id = if id_hint.len() < 8 {
            new_session_id()
        } else {
            id_hint.to_string()
        };

        let context_id = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await?;

        let keeper = self
            .browser
            .new_page(
                CreateTargetParams::builder()
                    .url("about:blank")
                    .browser_context_id(context_id.clone())
                    .build()
                    .map_err(Error::Driver)?,
            )
            .await?;

        Ok(WindowSession {
            id,
            context_id,
            keeper,
            timeout: DEFAULT_WINDOW_TIMEOUT,
            last_used: Instant::now(),
        })
    }

    /// Dispose a window's context; all pages inside it die with it.
    pub async fn close_window(&self, window: &WindowSession) {
        if let Err(e) = self
            .browser
            .dispose_browser_context(window.context_id.clone())
            .await
        {
            tracing::warn!("Failed to dispose context of window {}: {}", window.id, e);
        }
    }

    /// Create a sibling tab under `window`. The tab's deadline never extends
    /// past what the window allows.
    pub async fn create_tab(
        &self,
        window: &WindowSession,
        timeout: Duration,
    ) -> Result<TabSession, Error> {
        let id = format!("{}_{}", window.id, new_session_id());
        let page = self
            .browser
            .new_page(
                CreateTargetParams::builder()
                    .url("about:blank")
                    .browser_context_id(window.context_id.clone())
                    .build()
                    .map_err(Error::Driver)?,
            )
            .await?;

        let effective = timeout.min(window.timeout);
        Ok(TabSession {
            id,
            page,
            deadline: Instant::now() + effective,
        })
    }

    /// Close only the tab's page; the owning window stays alive.
    pub async fn close_tab(&self, tab: TabSession) {
        if let Err(e) = tab.page.close().await {
            tracing::debug!("Failed to close tab {}: {}", tab.id, e);
        }
    }

    /// Verify the browser process still answers.
    pub async fn health_check(&self) -> Result<(), Error> {
        self.browser.version().await?;
        Ok(())
    }

    // Per-command capabilities. Each one is bounded by the tab deadline.

    pub async fn navigate(&self, tab: &TabSession, url: &str) -> Result<(), Error> {
        self.bounded(tab.deadline, tab.page.goto(url)).await?;
        let _ = self.bounded(tab.deadline, tab.page.wait_for_navigation()).await;
        Ok(())
    }

    /// Click the first matching element once it shows up.
    pub async fn click(&self, tab: &TabSession, selector: &str) -> Result<(), Error> {
        let element = self.wait_for_element(tab, selector).await?;
        self.bounded(tab.deadline, element.scroll_into_view()).await?;
        self.bounded(tab.deadline, element.click()).await?;
        Ok(())
    }

    /// Evaluate a script and return the serialized JSON result.
    pub async fn evaluate(&self, tab: &TabSession, src: &str) -> Result<String, Error> {
        let result = self.bounded(tab.deadline, tab.page.evaluate(src)).await?;
        let value = result.value().cloned().unwrap_or(serde_json::Value::Null);
        Ok(serde_json::to_string(&value)?)
    }

    /// Current document outer HTML.
    pub async fn outer_html(&self, tab: &TabSession) -> Result<String, Error> {
        self.bounded(tab.deadline, tab.page.content()).await
    }

    /// Wait until every named lifecycle event has fired at least once.
    pub async fn listen(
        &self,
        tab: &TabSession,
        events: &[String],
        session_id: &str,
    ) -> Result<(), Error> {
        let mut must: HashSet<&str> = events.iter().map(String::as_str).collect();
        let mut stream = self
            .bounded(tab.deadline, tab.page.event_listener::<EventLifecycleEvent>())
            .await?;

        while !must.is_empty() {
            let remaining = tab
                .deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::Timeout)?;
            match tokio::time::timeout(remaining, stream.next()).await {
                Ok(Some(event)) => {
                    if must.remove(event.name.as_str()) {
                        tracing::debug!(
                            "Tab event (session {}): Caught {}",
                            session_id,
                            event.name
                        );
                    } else {
                        tracing::debug!(
                            "Tab event (session {}): Ignored {}",
                            session_id,
                            event.name
                        );
                    }
                }
                Ok(None) => return Err(Error::Driver("lifecycle event stream closed".into())),
                Err(_) => return Err(Error::Timeout),
            }
        }
        Ok(())
    }

    /// Sleep inside the tab's deadline; a sleep that would overshoot it
    /// counts as a timed-out command, like any other stalled wait.
    pub async fn sleep(&self, tab: &TabSession, delay: Duration) -> Result<(), Error> {
        let remaining = tab
            .deadline
            .checked_duration_since(Instant::now())
            .ok_or(Error::Timeout)?;
        if delay > remaining {
            tokio::time::sleep(remaining).await;
            return Err(Error::Timeout);
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    pub async fn scroll_to_bottom(&self, tab: &TabSession) -> Result<(), Error> {
        self.bounded(tab.deadline, tab.page.evaluate(SCROLL_CMD)).await?;
        Ok(())
    }

    pub async fn scroll_into_view(&self, tab: &TabSession, selector: &str) -> Result<(), Error> {
        let element = self.wait_for_element(tab, selector).await?;
        self.bounded(tab.deadline, element.scroll_into_view()).await?;
        Ok(())
    }

    /// Remove every element matching the (pre-sanitized) joined selector.
    pub async fn remove_elements(&self, tab: &TabSession, selector: &str) -> Result<(), Error> {
        let cmd = format!(
            "document.querySelectorAll('{}').forEach(e => e.remove());",
            selector
        );
        self.bounded(tab.deadline, tab.page.evaluate(cmd)).await?;
        Ok(())
    }

    /// Hide (but keep) every element matching the joined selector.
    pub async fn hide_elements(&self, tab: &TabSession, selector: &str) -> Result<(), Error> {
        let cmd = format!(
            r#"document.querySelectorAll('{}').forEach(e => e.style.visibility = "hidden");"#,
            selector
        );
        self.bounded(tab.deadline, tab.page.evaluate(cmd)).await?;
        Ok(())
    }

    /// Capture a node (optionally padded first) or the full page as PNG.
    pub async fn screenshot(
        &self,
        tab: &TabSession,
        element: Option<&str>,
        padding: Option<&str>,
    ) -> Result<Vec<u8>, Error> {
        if let Some(selector) = element {
            if let Some(padding) = padding {
                let selector_json = serde_json::to_string(selector)?;
                let cmd = format!(
                    "document.querySelector({}).setAttribute('style', 'padding:{}')",
                    selector_json, padding
                );
                self.bounded(tab.deadline, tab.page.evaluate(cmd))
                    .await
                    .map_err(|e| Error::Driver(format!("failed to add padding: {}", e)))?;
            }
            let node = self.wait_for_element(tab, selector).await?;
            self.bounded(tab.deadline, node.screenshot(CaptureScreenshotFormat::Png))
                .await
                .map_err(|e| Error::Driver(format!("failed to capture screenshot: {}", e)))
        } else {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build();
            self.bounded(tab.deadline, tab.page.screenshot(params))
                .await
                .map_err(|e| Error::Driver(format!("failed to capture screenshot: {}", e)))
        }
    }

    /// Print the page to PDF with the given margins (top, right, bottom,
    /// left, in inches).
    pub async fn print_to_pdf(
        &self,
        tab: &TabSession,
        margins: [f64; 4],
    ) -> Result<Vec<u8>, Error> {
        let params = PrintToPdfParams {
            margin_top: Some(margins[0]),
            margin_right: Some(margins[1]),
            margin_bottom: Some(margins[2]),
            margin_left: Some(margins[3]),
            ..Default::default()
        };
        self.bounded(tab.deadline, tab.page.pdf(params)).await
    }

    pub async fn emulate_viewport(
        &self,
        tab: &TabSession,
        width: i64,
        height: i64,
        orientation: Option<Orientation>,
        mobile: bool,
        scale: Option<f64>,
    ) -> Result<(), Error> {
        let mut params =
            SetDeviceMetricsOverrideParams::new(width, height, scale.unwrap_or(1.0), mobile);
        params.screen_orientation = orientation.map(|o| match o {
            Orientation::Landscape => {
                ScreenOrientation::new(ScreenOrientationType::LandscapePrimary, 90)
            }
            Orientation::Portrait => {
                ScreenOrientation::new(ScreenOrientationType::PortraitPrimary, 0)
            }
        });
        self.bounded(tab.deadline, tab.page.execute(params)).await?;
        Ok(())
    }

    /// Turn on network events ahead of lifecycle listening.
    pub async fn enable_network_events(&self, tab: &TabSession) -> Result<(), Error> {
        self.bounded(tab.deadline, tab.page.execute(NetworkEnableParams::default()))
            .await?;
        Ok(())
    }

    /// Turn on page-lifecycle events for `listen` actions.
    pub async fn enable_lifecycle_events(&self, tab: &TabSession) -> Result<(), Error> {
        self.bounded(tab.deadline, tab.page.execute(PageEnableParams::default()))
            .await?;
        self.bounded(
            tab.deadline,
            tab.page.execute(SetLifecycleEventsEnabledParams::new(true)),
        )
        .await?;
        Ok(())
    }

    /// `while` probe: does the selector match anything right now?
    pub async fn element_exists(&self, tab: &TabSession, selector: &str) -> Result<bool, Error> {
        let selector_json = serde_json::to_string(selector)?;
        let cmd = format!("document.querySelector({}) !== null", selector_json);
        let result = self.bounded(tab.deadline, tab.page.evaluate(cmd)).await?;
        Ok(result.into_value()?)
    }

    /// `while` probe: does the selector match something with a box?
    pub async fn element_visible(&self, tab: &TabSession, selector: &str) -> Result<bool, Error> {
        let cmd = format!(
            "var e = document.querySelector('{}'); \
             e ? !!(e.offsetWidth || e.offsetHeight || e.getClientRects().length) : false;",
            selector
        );
        let result = self.bounded(tab.deadline, tab.page.evaluate(cmd)).await?;
        Ok(result.into_value()?)
    }

    /// Poll for an element until the tab deadline runs out.
    async fn wait_for_element(
        &self,
        tab: &TabSession,
        selector: &str,
    ) -> Result<chromiumoxide::element::Element, Error> {
        loop {
            match self.bounded(tab.deadline, tab.page.find_element(selector)).await {
                Ok(element) => return Ok(element),
                Err(Error::Timeout) => return Err(Error::Timeout),
                Err(_) => {}
            }
            if Instant::now() + POLL_INTERVAL >= tab.deadline {
                return Err(Error::Timeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Run one driver future, bounded by the tab deadline.
    async fn bounded<T, F>(&self, deadline: Instant, fut: F) -> Result<T, Error>
    where
        F: Future<Output = chromiumoxide::error::Result<T>>,
    {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(Error::Timeout)?;
        match tokio::time::timeout(remaining, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::Timeout),
        }
    }
}
