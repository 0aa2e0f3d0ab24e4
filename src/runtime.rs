//! Chromiumoxide-backed browser runtime.
//!
//! [`ChromiumSession`] launches a local Chromium, opens one page and drives
//! it through [`ChromiumoxideDriver`], the [`PageDriver`] implementation used
//! for real runs. Element work goes through the bundled page scripts; native
//! clicks and key presses are routed to the element a script has tagged with
//! [`TARGET_MARKER_ATTRIBUTE`].

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, RequestId,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde_json::{Value as JsonValue, json};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::browser::LaunchOptions;
use crate::dom_scripts::{self, TARGET_MARKER_ATTRIBUTE};
use crate::driver::{DriverError, ElementSnapshot, PageDriver, WaitUntil};
use crate::logging::PilotLogger;
use crate::selectors::Locator;
use crate::session::{ManagedSession, SessionError};

const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);
const READY_STATE_POLL: Duration = Duration::from_millis(100);
const PREVIOUS_DOCUMENT_STAMP: &str = "__searchPilotPreviousDocument";

/// [`PageDriver`] over a single chromiumoxide page.
#[derive(Debug, Clone)]
pub struct ChromiumoxideDriver {
    page: Page,
}

impl ChromiumoxideDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn evaluate_expression(&self, expression: String) -> Result<JsonValue, DriverError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(DriverError::Script)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn evaluate_on_locator(
        &self,
        body: &str,
        locator: &Locator,
        arg: JsonValue,
    ) -> Result<JsonValue, DriverError> {
        let request = dom_scripts::locator_request(locator, arg)
            .map_err(|err| DriverError::Script(err.to_string()))?;
        self.evaluate(&dom_scripts::with_located_elements(body), request)
            .await
    }

    /// Tag the first match of `locator` and return it as a CDP element handle.
    async fn marked_element(&self, locator: &Locator) -> Result<Element, DriverError> {
        let marked = self
            .evaluate_on_locator(
                dom_scripts::MARK_TARGET,
                locator,
                json!(TARGET_MARKER_ATTRIBUTE),
            )
            .await?;
        if marked.as_bool() != Some(true) {
            return Err(DriverError::ElementNotFound(locator.to_string()));
        }
        self.page
            .find_element(format!("[{TARGET_MARKER_ATTRIBUTE}]"))
            .await
            .map_err(map_cdp_error)
    }

    /// Ready state of the document that replaced the stamped one, or `None`
    /// while the previous document is still current.
    async fn fresh_ready_state(&self) -> Result<Option<String>, DriverError> {
        let probe = self
            .evaluate_expression(format!(
                "({{ state: document.readyState, stale: window.{PREVIOUS_DOCUMENT_STAMP} === true }})"
            ))
            .await?;
        if probe["stale"].as_bool().unwrap_or(false) {
            return Ok(None);
        }
        Ok(probe["state"].as_str().map(str::to_string))
    }

    async fn load_until_dom_ready(&self, url: &str) -> Result<(), DriverError> {
        // The outgoing document keeps answering readyState until the new one commits.
        match self
            .evaluate_expression(format!("window.{PREVIOUS_DOCUMENT_STAMP} = true"))
            .await
        {
            Err(err) if err.is_fatal() => return Err(err),
            _ => {}
        }

        let navigated = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(map_cdp_error)?;
        if let Some(error) = &navigated.result.error_text {
            return Err(DriverError::Navigation(format!("{url}: {error}")));
        }
        if navigated.result.loader_id.is_none() {
            // Same-document navigation: nothing new to load.
            return Ok(());
        }

        loop {
            match self.fresh_ready_state().await {
                Ok(Some(state)) if state == "interactive" || state == "complete" => return Ok(()),
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                // Evaluation fails while the new execution context is being created.
                Err(_) => {}
            }
            time::sleep(READY_STATE_POLL).await;
        }
    }

    async fn load_fully(&self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(map_cdp_error)?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumoxideDriver {
    async fn navigate(
        &self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let load = async {
            match wait {
                WaitUntil::DomContentLoaded => self.load_until_dom_ready(url).await,
                WaitUntil::Load => self.load_fully(url).await,
            }
        };
        time::timeout(timeout, load)
            .await
            .map_err(|_| DriverError::timeout(format!("navigation to {url}"), timeout))?
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<(), DriverError> {
        let mut sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(map_cdp_error)?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(map_cdp_error)?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(map_cdp_error)?;

        let deadline = time::sleep_until(Instant::now() + timeout);
        tokio::pin!(deadline);
        let mut in_flight: HashSet<RequestId> = HashSet::new();

        loop {
            let quiet = time::sleep(NETWORK_QUIET_WINDOW);
            tokio::select! {
                _ = &mut deadline => {
                    return Err(DriverError::timeout(
                        format!("network idle ({} requests in flight)", in_flight.len()),
                        timeout,
                    ));
                }
                Some(event) = sent.next() => {
                    in_flight.insert(event.request_id.clone());
                }
                Some(event) = finished.next() => {
                    in_flight.remove(&event.request_id);
                }
                Some(event) = failed.next() => {
                    in_flight.remove(&event.request_id);
                }
                _ = quiet, if in_flight.is_empty() => return Ok(()),
            }
        }
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        let described = self
            .evaluate_on_locator(dom_scripts::DESCRIBE_ELEMENTS, locator, JsonValue::Null)
            .await?;
        serde_json::from_value(described).map_err(|err| DriverError::Script(err.to_string()))
    }

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        let click = async {
            let element = self.marked_element(locator).await?;
            element.click().await.map_err(map_cdp_error)?;
            Ok(())
        };
        time::timeout(timeout, click)
            .await
            .map_err(|_| DriverError::timeout(format!("click on {locator}"), timeout))?
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), DriverError> {
        self.evaluate_on_locator(dom_scripts::FILL_ELEMENT, locator, json!(value))
            .await?;
        Ok(())
    }

    async fn press_key(&self, locator: &Locator, key: &str) -> Result<(), DriverError> {
        let element = self.marked_element(locator).await?;
        element.press_key(key).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str, arg: JsonValue) -> Result<JsonValue, DriverError> {
        let expression = dom_scripts::invocation(script, &arg)
            .map_err(|err| DriverError::Script(err.to_string()))?;
        self.evaluate_expression(expression).await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().build(), path)
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }

    async fn title(&self) -> Result<Option<String>, DriverError> {
        self.page.get_title().await.map_err(map_cdp_error)
    }

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        self.page.url().await.map_err(map_cdp_error)
    }
}

/// A launched local browser with the page the run drives.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    driver: ChromiumoxideDriver,
    logger: Arc<PilotLogger>,
    released: bool,
}

impl ChromiumSession {
    pub async fn launch(
        options: &LaunchOptions,
        logger: Arc<PilotLogger>,
    ) -> Result<Self, SessionError> {
        let config = build_config(options)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;
        let handler = spawn_handler(handler, Arc::clone(&logger));

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                return Err(SessionError::Page(err.to_string()));
            }
        };
        logger.info("Browser launched", Some("session"), None);

        Ok(Self {
            browser,
            handler,
            driver: ChromiumoxideDriver::new(page),
            logger,
            released: false,
        })
    }
}

#[async_trait]
impl ManagedSession for ChromiumSession {
    fn driver(&self) -> &dyn PageDriver {
        &self.driver
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.browser.close().await {
            self.logger
                .warn(format!("Browser did not close cleanly: {err}"), Some("session"), None);
        }
        if let Err(err) = self.browser.wait().await {
            self.logger.debug(
                format!("Browser process wait failed: {err}"),
                Some("session"),
                None,
            );
        }
        self.handler.abort();
    }
}

fn build_config(options: &LaunchOptions) -> Result<BrowserConfig, SessionError> {
    let viewport = chromiumoxide::handler::viewport::Viewport {
        width: options.viewport.width,
        height: options.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: options.viewport.width >= options.viewport.height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();

    if let Some(path) = &options.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = builder
        .viewport(viewport)
        .window_size(options.viewport.width, options.viewport.height)
        .args(options.args.clone());

    let builder = if options.headless {
        builder
    } else {
        builder.with_head()
    };

    let builder = if !options.ignore_https_errors {
        builder.respect_https_errors()
    } else {
        builder
    };

    let builder = if !options.locale.is_empty() {
        builder.arg(format!("--lang={}", options.locale))
    } else {
        builder
    };

    builder.build().map_err(SessionError::Config)
}

fn spawn_handler(
    mut handler: chromiumoxide::handler::Handler,
    logger: Arc<PilotLogger>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                logger.debug(format!("chromiumoxide handler error: {err}"), Some("cdp"), None);
            }
        }
    })
}

/// Lost transports are fatal; everything else is a per-operation failure.
fn map_cdp_error(err: CdpError) -> DriverError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            DriverError::Disconnected(err.to_string())
        }
        CdpError::NotFound => DriverError::ElementNotFound(err.to_string()),
        CdpError::JavascriptException(_) => DriverError::Script(err.to_string()),
        CdpError::Timeout => DriverError::timeout("cdp request", Duration::ZERO),
        other => DriverError::Message(other.to_string()),
    }
}
