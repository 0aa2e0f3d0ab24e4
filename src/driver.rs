//! Browser-driver seam.
//!
//! The workflow only talks to a page through [`PageDriver`]. The production
//! implementation lives in [`crate::runtime`]; tests substitute an in-memory
//! page.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::selectors::Locator;

/// Page lifecycle milestone a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
}

/// What the driver reports about one element matched by a locator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementSnapshot {
    /// Position within the locator's matches, in document order.
    pub index: usize,
    pub tag: String,
    pub visible: bool,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    /// Lower-cased tag names from the parent up to the root.
    pub ancestors: Vec<String>,
}

impl ElementSnapshot {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attributes(mut self, attributes: &[(&str, &str)]) -> Self {
        self.attributes.extend(
            attributes
                .iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string())),
        );
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Effective `type` of an input; browsers treat a missing or empty type as `text`.
    pub fn input_type(&self) -> String {
        match self.attribute("type").map(str::trim) {
            Some(value) if !value.is_empty() => value.to_ascii_lowercase(),
            _ => "text".to_string(),
        }
    }

    pub fn accessible_name(&self) -> String {
        ["aria-label", "title", "value", "placeholder"]
            .iter()
            .filter_map(|key| self.attribute(key))
            .chain(std::iter::once(self.text.as_str()))
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {after:?} during {operation}")]
    Timeout { operation: String, after: Duration },
    #[error("no element matches {0}")]
    ElementNotFound(String),
    #[error("element {0} is not visible")]
    NotVisible(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("browser session lost: {0}")]
    Disconnected(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("browser driver error: {0}")]
    Message(String),
}

impl DriverError {
    /// Fatal errors mean the page or browser is gone and nothing else can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Disconnected(_))
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        DriverError::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

/// Capabilities the workflow needs from a live page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, wait: WaitUntil, timeout: Duration)
    -> Result<(), DriverError>;

    /// Resolve once no network request has been in flight for a short quiet window.
    ///
    /// Only requests that start after the call are tracked, so a request
    /// already in flight when waiting begins does not hold idle back.
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Every element the locator matches, in document order.
    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError>;

    /// Whether the first element the locator matches is rendered.
    async fn is_visible(&self, locator: &Locator) -> Result<bool, DriverError> {
        let matches = self.query_all(locator).await?;
        Ok(matches.first().map(|element| element.visible).unwrap_or(false))
    }

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError>;

    /// Replace the value of the first matched element and fire input/change events.
    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), DriverError>;

    async fn press_key(&self, locator: &Locator, key: &str) -> Result<(), DriverError>;

    /// Call `script` (a JavaScript function expression) with `arg` and return its result.
    async fn evaluate(&self, script: &str, arg: JsonValue) -> Result<JsonValue, DriverError>;

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;

    async fn title(&self) -> Result<Option<String>, DriverError>;

    async fn current_url(&self) -> Result<Option<String>, DriverError>;
}

#[async_trait]
impl<T> PageDriver for Arc<T>
where
    T: PageDriver + ?Sized,
{
    async fn navigate(
        &self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        (**self).navigate(url, wait, timeout).await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<(), DriverError> {
        (**self).wait_for_network_idle(timeout).await
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        (**self).query_all(locator).await
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, DriverError> {
        (**self).is_visible(locator).await
    }

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        (**self).click(locator, timeout).await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), DriverError> {
        (**self).fill(locator, value).await
    }

    async fn press_key(&self, locator: &Locator, key: &str) -> Result<(), DriverError> {
        (**self).press_key(locator, key).await
    }

    async fn evaluate(&self, script: &str, arg: JsonValue) -> Result<JsonValue, DriverError> {
        (**self).evaluate(script, arg).await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        (**self).screenshot(path).await
    }

    async fn title(&self) -> Result<Option<String>, DriverError> {
        (**self).title().await
    }

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        (**self).current_url().await
    }
}
