#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use search_pilot::config::Pacing;
use search_pilot::context::RunContext;
use search_pilot::decision::{DecisionError, DecisionRequest, DecisionResponse, DecisionService};
use search_pilot::dom_scripts;
use search_pilot::driver::{DriverError, ElementSnapshot, PageDriver, WaitUntil};
use search_pilot::logging::{LogConfig, PilotLogRecord, PilotLogger};
use search_pilot::overlay::StatusOverlay;
use search_pilot::selectors::Locator;
use search_pilot::session::ManagedSession;
use search_pilot::snapshots::SnapshotRecorder;
use search_pilot::Verbosity;

/// Visible `<input name="q">` inside a form, as on most search engines.
pub fn search_box() -> ElementSnapshot {
    let mut input = ElementSnapshot::new("INPUT")
        .with_attributes(&[("name", "q"), ("type", "search")])
        .visible(true);
    input.ancestors = vec!["form".into(), "body".into(), "html".into()];
    input
}

pub fn submit_button() -> ElementSnapshot {
    let mut button = ElementSnapshot::new("BUTTON")
        .with_attributes(&[("type", "submit")])
        .with_text("Search")
        .visible(true);
    button.ancestors = vec!["form".into(), "body".into(), "html".into()];
    button
}

#[derive(Debug, Default)]
struct PageState {
    elements: Vec<ElementSnapshot>,
    failing_navigations: Vec<(String, Option<WaitUntil>)>,
    idle_failures_left: u32,
    fail_key_press: bool,
    failing_clicks: Vec<String>,
    form_present: bool,
    heuristic_result: Option<JsonValue>,
    disconnected: bool,
    url: Option<String>,
    title: Option<String>,
    calls: Vec<String>,
    overlays: Vec<String>,
    screenshots: Vec<PathBuf>,
}

/// In-memory page. Locators are resolved with [`Locator::matches`] over the
/// configured elements; screenshots are written as small placeholder files.
#[derive(Debug)]
pub struct FakePage {
    state: Mutex<PageState>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FakePage {
    pub fn new(elements: Vec<ElementSnapshot>) -> Self {
        Self {
            state: Mutex::new(PageState {
                elements,
                form_present: true,
                ..PageState::default()
            }),
        }
    }

    pub fn search_engine() -> Self {
        Self::new(vec![search_box(), submit_button()])
    }

    pub fn fail_navigation(self, url: &str, wait: Option<WaitUntil>) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_navigations
            .push((url.to_string(), wait));
        self
    }

    pub fn fail_network_idle(self, times: u32) -> Self {
        self.state.lock().unwrap().idle_failures_left = times;
        self
    }

    pub fn fail_key_press(self) -> Self {
        self.state.lock().unwrap().fail_key_press = true;
        self
    }

    pub fn fail_click_on(self, locator: &Locator) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_clicks
            .push(locator.to_string());
        self
    }

    pub fn without_form(self) -> Self {
        self.state.lock().unwrap().form_present = false;
        self
    }

    pub fn with_heuristic_result(self, result: JsonValue) -> Self {
        self.state.lock().unwrap().heuristic_result = Some(result);
        self
    }

    pub fn disconnect(&self) {
        self.state.lock().unwrap().disconnected = true;
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = Some(url.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn overlays(&self) -> Vec<String> {
        self.state.lock().unwrap().overlays.clone()
    }

    /// Snapshot file names in capture order.
    pub fn screenshots(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .screenshots
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }

    fn record(&self, call: String) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.disconnected {
            return Err(DriverError::Disconnected("page closed".into()));
        }
        Ok(())
    }

    fn resolve(&self, locator: &Locator) -> Vec<ElementSnapshot> {
        let state = self.state.lock().unwrap();
        state
            .elements
            .iter()
            .filter(|element| locator.matches(element))
            .cloned()
            .enumerate()
            .map(|(index, mut element)| {
                element.index = index;
                element
            })
            .collect()
    }

    fn first_visible(&self, locator: &Locator) -> Result<ElementSnapshot, DriverError> {
        let first = self
            .resolve(locator)
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::ElementNotFound(locator.to_string()))?;
        if !first.visible {
            return Err(DriverError::NotVisible(locator.to_string()));
        }
        Ok(first)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(
        &self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        self.record(format!("navigate {url} {wait:?}"))?;
        let mut state = self.state.lock().unwrap();
        let fails = state
            .failing_navigations
            .iter()
            .any(|(failing, on)| failing == url && on.map(|on| on == wait).unwrap_or(true));
        if fails {
            return Err(DriverError::timeout(format!("navigation to {url}"), timeout));
        }
        state.url = Some(url.to_string());
        state.title = Some("Search".to_string());
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<(), DriverError> {
        self.record("network_idle".to_string())?;
        let mut state = self.state.lock().unwrap();
        if state.idle_failures_left > 0 {
            state.idle_failures_left -= 1;
            return Err(DriverError::timeout("network idle", timeout));
        }
        Ok(())
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        self.record(format!("query {locator}"))?;
        Ok(self.resolve(locator))
    }

    async fn click(&self, locator: &Locator, _timeout: Duration) -> Result<(), DriverError> {
        self.record(format!("click {locator}"))?;
        self.first_visible(locator)?;
        let failing = self
            .state
            .lock()
            .unwrap()
            .failing_clicks
            .contains(&locator.to_string());
        if failing {
            return Err(DriverError::Message(format!("click intercepted on {locator}")));
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), DriverError> {
        self.record(format!("fill {locator} '{value}'"))?;
        self.resolve(locator)
            .into_iter()
            .next()
            .map(|_| ())
            .ok_or_else(|| DriverError::Script("no element to fill".into()))
    }

    async fn press_key(&self, locator: &Locator, key: &str) -> Result<(), DriverError> {
        self.record(format!("press {locator} {key}"))?;
        self.first_visible(locator)?;
        if self.state.lock().unwrap().fail_key_press {
            return Err(DriverError::Message("key press was swallowed".into()));
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str, arg: JsonValue) -> Result<JsonValue, DriverError> {
        if script == dom_scripts::STATUS_OVERLAY {
            self.record("overlay".to_string())?;
            let message = arg.as_str().unwrap_or_default().to_string();
            self.state.lock().unwrap().overlays.push(message);
            return Ok(JsonValue::Bool(true));
        }
        if script == dom_scripts::HEURISTIC_FILL {
            self.record("evaluate heuristic_fill".to_string())?;
            let state = self.state.lock().unwrap();
            return Ok(state
                .heuristic_result
                .clone()
                .unwrap_or_else(|| json!({ "filled": false, "submitScheduled": false })));
        }
        if script.contains(dom_scripts::SUBMIT_ENCLOSING_FORM) {
            self.record("evaluate submit_enclosing_form".to_string())?;
            return Ok(JsonValue::Bool(self.state.lock().unwrap().form_present));
        }
        if script.contains(dom_scripts::HIGHLIGHT_ELEMENT) {
            self.record("evaluate highlight".to_string())?;
            return Ok(JsonValue::Bool(true));
        }
        self.record("evaluate other".to_string())?;
        Ok(JsonValue::Null)
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.record(format!("screenshot {}", path.display()))?;
        std::fs::write(path, b"png")?;
        self.state.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn title(&self) -> Result<Option<String>, DriverError> {
        self.record("title".to_string())?;
        Ok(self.state.lock().unwrap().title.clone())
    }

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        self.record("current_url".to_string())?;
        Ok(self.state.lock().unwrap().url.clone())
    }
}

/// One scripted reply, optionally moving the page somewhere first.
pub struct Step {
    pub reply: Result<DecisionResponse, DecisionError>,
    pub url_after: Option<String>,
    pub page_lost: bool,
}

pub fn message_output(text: &str) -> DecisionResponse {
    DecisionResponse::from_output(vec![json!({
        "type": "message",
        "content": [{ "type": "output_text", "text": text }]
    })])
}

pub fn reply(text: &str) -> Step {
    Step {
        reply: Ok(message_output(text)),
        url_after: None,
        page_lost: false,
    }
}

pub fn reply_and_go(text: &str, url: &str) -> Step {
    Step {
        reply: Ok(message_output(text)),
        url_after: Some(url.to_string()),
        page_lost: false,
    }
}

/// Replies normally, but the browser goes away while the call is in flight.
pub fn reply_after_crash(text: &str) -> Step {
    Step {
        page_lost: true,
        ..reply(text)
    }
}

pub fn failure(status: u16) -> Step {
    Step {
        reply: Err(DecisionError::Status {
            status,
            body: "service unavailable".into(),
        }),
        url_after: None,
        page_lost: false,
    }
}

/// Decision service that replays [`Step`]s in order, then answers with an
/// empty output.
pub struct ScriptedDecisionService {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<DecisionRequest>>,
    page: Option<Arc<FakePage>>,
}

impl ScriptedDecisionService {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            page: None,
        }
    }

    pub fn driving(mut self, page: Arc<FakePage>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionService for ScriptedDecisionService {
    async fn decide(&self, request: DecisionRequest) -> Result<DecisionResponse, DecisionError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                if let (Some(url), Some(page)) = (&step.url_after, &self.page) {
                    page.set_url(url);
                }
                if let (true, Some(page)) = (step.page_lost, &self.page) {
                    page.disconnect();
                }
                step.reply
            }
            None => Ok(DecisionResponse::from_output(Vec::new())),
        }
    }
}

/// Session over a shared [`FakePage`] that counts releases.
pub struct CountingSession {
    page: Arc<FakePage>,
    releases: Arc<AtomicU32>,
}

impl CountingSession {
    pub fn new(page: Arc<FakePage>) -> (Self, Arc<AtomicU32>) {
        let releases = Arc::new(AtomicU32::new(0));
        (
            Self {
                page,
                releases: Arc::clone(&releases),
            },
            releases,
        )
    }
}

#[async_trait]
impl ManagedSession for CountingSession {
    fn driver(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    async fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Logger that keeps every record in memory and prints nothing.
pub fn capture_logger() -> (Arc<PilotLogger>, Arc<Mutex<Vec<PilotLogRecord>>>) {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    let mut config = LogConfig::new(Verbosity::Detailed);
    config.external_logger = Some(Arc::new(move |record: &PilotLogRecord| {
        sink.lock().unwrap().push(record.clone());
    }));
    (Arc::new(PilotLogger::with_config(config)), records)
}

pub fn messages(records: &Mutex<Vec<PilotLogRecord>>) -> Vec<String> {
    records
        .lock()
        .unwrap()
        .iter()
        .map(|record| record.message.clone())
        .collect()
}

/// Context over `page` with no pauses and snapshots under `dir`.
pub fn context<'a>(page: &'a FakePage, logger: Arc<PilotLogger>, dir: &Path) -> RunContext<'a> {
    let snapshots = Arc::new(SnapshotRecorder::new(dir, Arc::clone(&logger)));
    RunContext::new(page, logger, StatusOverlay::new(true), snapshots, Pacing::None)
}
