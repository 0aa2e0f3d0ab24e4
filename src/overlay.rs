//! On-page status banner for whoever is watching the browser.

use serde_json::Value as JsonValue;

use crate::dom_scripts;
use crate::driver::PageDriver;
use crate::logging::PilotLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOverlay {
    enabled: bool,
}

impl Default for StatusOverlay {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl StatusOverlay {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Best-effort: failures are logged at warn level and swallowed.
    pub async fn show(&self, driver: &dyn PageDriver, logger: &PilotLogger, message: &str) {
        if !self.enabled {
            return;
        }
        let arg = JsonValue::String(message.to_string());
        if let Err(err) = driver.evaluate(dom_scripts::STATUS_OVERLAY, arg).await {
            logger.warn(format!("Could not show overlay: {err}"), Some("overlay"), None);
        }
    }
}

/// Shorten `message` to at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    let mut shortened: String = message.chars().take(limit).collect();
    shortened.push_str("...");
    shortened
}
