//! Top-level run: reach the search page, prefill the query, then hand the
//! browser to the agent loop.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::agent::{AgentLoop, AgentSettings, AgentSummary};
use crate::browser::LaunchOptions;
use crate::config::PilotConfig;
use crate::context::RunContext;
use crate::decision::{DecisionError, DecisionService, ResponsesApiClient};
use crate::discovery::ElementDiscoveryEngine;
use crate::driver::{DriverError, PageDriver};
use crate::interaction::{HeuristicFill, InteractionExecutor, InteractionOutcome};
use crate::logging::{LogConfig, PilotLogger};
use crate::navigation::{NavigationController, NavigationError, NavigationPlan, NavigationResult};
use crate::overlay::StatusOverlay;
use crate::runtime::ChromiumSession;
use crate::selectors::{ElementRole, SelectorCatalog};
use crate::session::{ManagedSession, SessionError, SessionLifecycle};
use crate::snapshots::SnapshotRecorder;

const POST_SUBMIT_IDLE: Duration = Duration::from_secs(10);
const POST_SUBMIT_SETTLE: Duration = Duration::from_secs(2);
const FINAL_LINGER: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PilotError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Launch(#[from] SessionError),
    #[error(transparent)]
    Session(#[from] DriverError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub navigation: NavigationResult,
    pub interaction: InteractionOutcome,
    pub heuristic: Option<HeuristicFill>,
    pub agent: AgentSummary,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.agent.succeeded()
    }
}

pub struct SearchPilot {
    config: PilotConfig,
    logger: Arc<PilotLogger>,
    service: Arc<dyn DecisionService>,
    catalog: SelectorCatalog,
}

impl SearchPilot {
    pub fn new(config: PilotConfig, service: Arc<dyn DecisionService>) -> Self {
        let logger = Arc::new(PilotLogger::with_config(LogConfig::from_pilot_config(&config)));
        Self {
            config,
            logger,
            service,
            catalog: SelectorCatalog::search_engine_default(),
        }
    }

    /// Pilot backed by the Responses API client the configuration describes.
    pub fn from_config(config: PilotConfig) -> Result<Self, PilotError> {
        let service = ResponsesApiClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(service)))
    }

    pub fn with_logger(mut self, logger: Arc<PilotLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_catalog(mut self, catalog: SelectorCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn logger(&self) -> Arc<PilotLogger> {
        Arc::clone(&self.logger)
    }

    /// Launch a local browser and run against it.
    pub async fn launch_and_run(self) -> Result<RunReport, PilotError> {
        let options = LaunchOptions::from_config(&self.config);
        self.logger.info(
            format!(
                "Launching browser (headless: {}, viewport {}x{})",
                options.headless, options.viewport.width, options.viewport.height
            ),
            Some("pilot"),
            None,
        );
        let session = ChromiumSession::launch(&options, self.logger()).await?;
        self.run(session).await
    }

    /// Run against an already open session. The session is released before
    /// this returns, whatever the outcome.
    pub async fn run<S: ManagedSession>(self, session: S) -> Result<RunReport, PilotError> {
        let snapshots = Arc::new(SnapshotRecorder::new(
            self.config.artifact_dir.clone(),
            self.logger(),
        ));
        let lifecycle = SessionLifecycle::new(
            self.logger(),
            Arc::clone(&snapshots),
            self.overlay(),
            self.config.pacing,
        );

        lifecycle
            .scoped(session, move |session| {
                Box::pin(async move { self.drive(session.driver(), snapshots).await })
            })
            .await
    }

    fn overlay(&self) -> StatusOverlay {
        StatusOverlay::new(self.config.show_overlay)
    }

    async fn drive(
        &self,
        driver: &dyn PageDriver,
        snapshots: Arc<SnapshotRecorder>,
    ) -> Result<RunReport, PilotError> {
        let logger = self.logger.as_ref();
        let ctx = RunContext::new(
            driver,
            self.logger(),
            self.overlay(),
            snapshots,
            self.config.pacing,
        );
        logger.info(
            "Starting search pilot",
            Some("pilot"),
            Some(json!({
                "target_url": self.config.target_url,
                "search_text": self.config.search_text,
                "max_iterations": self.config.max_iterations,
                "pacing": self.config.pacing,
            })),
        );

        let plan = NavigationPlan::default()
            .with_alternate_path(self.config.alternate_path.clone())
            .with_settle_delay(self.config.settle_delay());
        let navigation = NavigationController::new(ctx.clone(), plan)
            .reach(&self.config.target_url)
            .await?;

        let discovery = ElementDiscoveryEngine::new(ctx.clone(), &self.catalog);
        discovery.discover_all(ElementRole::SearchInput).await?;
        discovery.discover_all(ElementRole::SubmitControl).await?;

        let executor = InteractionExecutor::new(ctx.clone(), &self.catalog);
        let interaction = executor.prefill_and_submit(&self.config.search_text).await?;
        let heuristic = if interaction.filled() {
            None
        } else {
            Some(executor.heuristic_fill(&self.config.search_text).await?)
        };

        let submitted = interaction.success
            || heuristic
                .as_ref()
                .map(|fill| fill.submit_scheduled)
                .unwrap_or(false);
        if submitted {
            match driver.wait_for_network_idle(POST_SUBMIT_IDLE).await {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => logger.warn(
                    format!("Results page did not go idle: {err}"),
                    Some("pilot"),
                    None,
                ),
            }
            ctx.pause(POST_SUBMIT_SETTLE).await;
            let url = ctx.try_current_url().await?;
            let title = ctx.title().await;
            logger.info(
                format!(
                    "After submission: {} ({})",
                    url.as_deref().unwrap_or("unknown URL"),
                    title.as_deref().unwrap_or("untitled")
                ),
                Some("pilot"),
                Some(json!({ "url": url, "title": title })),
            );
        }

        ctx.snapshot("initial_state").await;

        let mut agent = AgentLoop::new(
            ctx.clone(),
            self.service.as_ref(),
            AgentSettings::from_config(&self.config),
        );
        let summary = agent.run().await?;

        logger.info(
            format!("Process completed after {} iterations", summary.iterations_run),
            Some("pilot"),
            None,
        );
        logger.info(
            format!("Total estimated cost: ${:.4}", summary.total_cost),
            Some("pilot"),
            None,
        );
        logger.info(
            format!("Task completed successfully: {}", summary.succeeded()),
            Some("pilot"),
            None,
        );

        ctx.try_current_url().await?;
        ctx.snapshot("final_state").await;
        ctx.status(&format!(
            "Process completed! Iterations: {}, Cost: ${:.4}, Success: {}",
            summary.iterations_run,
            summary.total_cost,
            summary.succeeded()
        ))
        .await;
        ctx.pause(FINAL_LINGER).await;

        Ok(RunReport {
            navigation,
            interaction,
            heuristic,
            agent: summary,
        })
    }
}
