//! Scoped ownership of the browser session.
//!
//! A run borrows the session's page for its whole body; once the body
//! finishes, whether it returned a value or an error, the session is
//! released exactly once. Errors get an observer-facing report (log, snapshot,
//! overlay banner) before the release.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::Pacing;
use crate::driver::PageDriver;
use crate::logging::PilotLogger;
use crate::overlay::{StatusOverlay, truncate_message};
use crate::snapshots::SnapshotRecorder;

const ERROR_BANNER_LIMIT: usize = 100;
const ERROR_LINGER: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid browser configuration: {0}")]
    Config(String),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to open page: {0}")]
    Page(String),
}

/// A live browser session with one page to drive.
#[async_trait]
pub trait ManagedSession: Send + Sync {
    fn driver(&self) -> &dyn PageDriver;

    /// Close the browser. Called once per session; must not fail loudly.
    async fn release(&mut self);
}

/// Runs a body against a session and guarantees the release afterwards.
#[derive(Clone)]
pub struct SessionLifecycle {
    logger: Arc<PilotLogger>,
    snapshots: Arc<SnapshotRecorder>,
    overlay: StatusOverlay,
    pacing: Pacing,
}

impl SessionLifecycle {
    pub fn new(
        logger: Arc<PilotLogger>,
        snapshots: Arc<SnapshotRecorder>,
        overlay: StatusOverlay,
        pacing: Pacing,
    ) -> Self {
        Self {
            logger,
            snapshots,
            overlay,
            pacing,
        }
    }

    pub async fn scoped<S, T, E, F>(&self, mut session: S, body: F) -> Result<T, E>
    where
        S: ManagedSession,
        E: Display,
        F: for<'s> FnOnce(&'s S) -> BoxFuture<'s, Result<T, E>>,
    {
        let outcome = body(&session).await;

        if let Err(err) = &outcome {
            self.report_failure(session.driver(), err).await;
        }

        self.logger.info("Closing browser", Some("session"), None);
        session.release().await;
        outcome
    }

    async fn report_failure(&self, driver: &dyn PageDriver, err: &dyn Display) {
        let message = err.to_string();
        self.logger.error(
            format!("A browser error occurred: {message}"),
            Some("session"),
            None,
        );
        self.snapshots.capture(driver, "error_state").await;
        self.overlay
            .show(
                driver,
                &self.logger,
                &format!("ERROR: {}", truncate_message(&message, ERROR_BANNER_LIMIT)),
            )
            .await;
        self.pacing.pause(ERROR_LINGER).await;
    }
}
