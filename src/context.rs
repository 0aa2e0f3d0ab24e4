//! Shared handles passed to each workflow component for one run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Pacing;
use crate::driver::{DriverError, PageDriver};
use crate::logging::PilotLogger;
use crate::overlay::StatusOverlay;
use crate::snapshots::SnapshotRecorder;

/// Everything a component needs besides its own settings: the page, the
/// logger, the observer-facing overlay and snapshots, and the pacing policy.
#[derive(Clone)]
pub struct RunContext<'a> {
    driver: &'a dyn PageDriver,
    logger: Arc<PilotLogger>,
    overlay: StatusOverlay,
    snapshots: Arc<SnapshotRecorder>,
    pacing: Pacing,
}

impl<'a> RunContext<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        logger: Arc<PilotLogger>,
        overlay: StatusOverlay,
        snapshots: Arc<SnapshotRecorder>,
        pacing: Pacing,
    ) -> Self {
        Self {
            driver,
            logger,
            overlay,
            snapshots,
            pacing,
        }
    }

    pub fn driver(&self) -> &'a dyn PageDriver {
        self.driver
    }

    pub fn logger(&self) -> &PilotLogger {
        &self.logger
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub async fn status(&self, message: &str) {
        self.overlay.show(self.driver, &self.logger, message).await;
    }

    pub async fn snapshot(&self, label: &str) -> Option<PathBuf> {
        self.snapshots.capture(self.driver, label).await
    }

    pub async fn pause(&self, base: Duration) {
        self.pacing.pause(base).await;
    }

    /// Page title, or `None` when it cannot be read.
    pub async fn title(&self) -> Option<String> {
        match self.driver.title().await {
            Ok(title) => title,
            Err(err) => {
                self.logger
                    .warn(format!("Could not get page title: {err}"), None, None);
                None
            }
        }
    }

    /// Current URL, or `None` when it cannot be read.
    pub async fn current_url(&self) -> Option<String> {
        match self.try_current_url().await {
            Ok(url) => url,
            Err(err) => {
                self.logger
                    .warn(format!("Could not read current URL: {err}"), None, None);
                None
            }
        }
    }

    /// Like [`RunContext::current_url`], but a lost page is returned as an error.
    pub async fn try_current_url(&self) -> Result<Option<String>, DriverError> {
        match self.driver.current_url().await {
            Ok(url) => Ok(url),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.logger
                    .warn(format!("Could not read current URL: {err}"), None, None);
                Ok(None)
            }
        }
    }
}
