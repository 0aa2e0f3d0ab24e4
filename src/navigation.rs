//! Reaching the target page through an ordered chain of load strategies.
//!
//! Search engines regularly stall on a cold load, so the controller tries a
//! strict sequence: the target itself with full waits, the same origin on an
//! alternate path, and finally a single long best-effort load. The first one
//! that completes wins. If none does, the run cannot continue.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::context::RunContext;
use crate::driver::{DriverError, WaitUntil};

/// One way of loading the page, with the waits that define "loaded".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationStrategy {
    pub label: &'static str,
    pub url: String,
    pub wait: WaitUntil,
    pub timeout: Duration,
    /// Extra wait for network quiet after the load milestone, if any.
    pub network_idle: Option<Duration>,
}

/// Timeouts and delays for each strategy in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationPlan {
    pub alternate_path: String,
    pub direct_timeout: Duration,
    pub alternate_timeout: Duration,
    pub idle_timeout: Duration,
    pub best_effort_timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for NavigationPlan {
    fn default() -> Self {
        Self {
            alternate_path: "/search".to_string(),
            direct_timeout: Duration::from_secs(60),
            alternate_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30),
            best_effort_timeout: Duration::from_secs(90),
            settle_delay: Duration::from_secs(3),
        }
    }
}

impl NavigationPlan {
    pub fn with_alternate_path(mut self, path: impl Into<String>) -> Self {
        self.alternate_path = path.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// The three strategies for `target`, in the order they must be tried.
    pub fn strategies_for(&self, target: &str) -> Result<Vec<NavigationStrategy>, NavigationError> {
        let parsed = Url::parse(target).map_err(|source| NavigationError::InvalidTarget {
            url: target.to_string(),
            source,
        })?;
        let alternate = parsed
            .join(&self.alternate_path)
            .map_err(|source| NavigationError::InvalidTarget {
                url: format!("{target} + {}", self.alternate_path),
                source,
            })?;

        Ok(vec![
            NavigationStrategy {
                label: "direct",
                url: target.to_string(),
                wait: WaitUntil::DomContentLoaded,
                timeout: self.direct_timeout,
                network_idle: Some(self.idle_timeout),
            },
            NavigationStrategy {
                label: "alternate-path",
                url: alternate.to_string(),
                wait: WaitUntil::DomContentLoaded,
                timeout: self.alternate_timeout,
                network_idle: Some(self.idle_timeout),
            },
            NavigationStrategy {
                label: "best-effort",
                url: target.to_string(),
                wait: WaitUntil::Load,
                timeout: self.best_effort_timeout,
                network_idle: None,
            },
        ])
    }
}

/// Record of one strategy that was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationAttempt {
    pub label: &'static str,
    pub url: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationResult {
    pub reached_url: String,
    pub strategy: &'static str,
    /// True when the page was reached by anything other than the direct load.
    pub degraded: bool,
    pub attempts: Vec<NavigationAttempt>,
    pub title: Option<String>,
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("invalid target url '{url}': {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("all {} navigation strategies failed", .attempts.len())]
    Exhausted { attempts: Vec<NavigationAttempt> },
}

pub struct NavigationController<'a> {
    ctx: RunContext<'a>,
    plan: NavigationPlan,
}

impl<'a> NavigationController<'a> {
    pub fn new(ctx: RunContext<'a>, plan: NavigationPlan) -> Self {
        Self { ctx, plan }
    }

    pub async fn reach(&self, target: &str) -> Result<NavigationResult, NavigationError> {
        let strategies = self.plan.strategies_for(target)?;
        let logger = self.ctx.logger();
        let mut attempts = Vec::with_capacity(strategies.len());

        self.ctx.status(&format!("Navigating to {target}...")).await;

        for (position, strategy) in strategies.iter().enumerate() {
            logger.info(
                format!(
                    "Navigating to {} ({} strategy, timeout {}s)",
                    strategy.url,
                    strategy.label,
                    strategy.timeout.as_secs()
                ),
                Some("navigation"),
                None,
            );

            match self.attempt(strategy).await {
                Ok(()) => {
                    attempts.push(NavigationAttempt {
                        label: strategy.label,
                        url: strategy.url.clone(),
                        error: None,
                    });
                    return Ok(self.finish(strategy, position > 0, attempts).await);
                }
                Err(err) => {
                    logger.warn(
                        format!("{} navigation failed: {err}", strategy.label),
                        Some("navigation"),
                        None,
                    );
                    attempts.push(NavigationAttempt {
                        label: strategy.label,
                        url: strategy.url.clone(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        logger.error(
            format!("Could not load {target} after {} attempts", attempts.len()),
            Some("navigation"),
            None,
        );
        Err(NavigationError::Exhausted { attempts })
    }

    async fn attempt(&self, strategy: &NavigationStrategy) -> Result<(), DriverError> {
        let driver = self.ctx.driver();
        driver
            .navigate(&strategy.url, strategy.wait, strategy.timeout)
            .await?;
        if let Some(idle) = strategy.network_idle {
            driver.wait_for_network_idle(idle).await?;
        }
        Ok(())
    }

    async fn finish(
        &self,
        strategy: &NavigationStrategy,
        degraded: bool,
        attempts: Vec<NavigationAttempt>,
    ) -> NavigationResult {
        let logger = self.ctx.logger();
        if degraded {
            logger.warn(
                format!("Reached page via {} strategy", strategy.label),
                Some("navigation"),
                None,
            );
        }

        logger.info("Letting page settle", Some("navigation"), None);
        self.ctx.pause(self.plan.settle_delay).await;

        let reached_url = self
            .ctx
            .current_url()
            .await
            .unwrap_or_else(|| strategy.url.clone());
        let title = self.ctx.title().await;
        match &title {
            Some(title) => {
                logger.info(format!("Page title: {title}"), Some("navigation"), None);
                self.ctx.status(&format!("Loaded page: {title}")).await;
            }
            None => self.ctx.status("Page loaded").await,
        }

        NavigationResult {
            reached_url,
            strategy: strategy.label,
            degraded,
            attempts,
            title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_follow_fixed_order_and_waits() {
        let plan = NavigationPlan::default();
        let strategies = plan
            .strategies_for("https://www.bing.com")
            .expect("valid target");

        let labels: Vec<&str> = strategies.iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["direct", "alternate-path", "best-effort"]);

        assert_eq!(strategies[0].url, "https://www.bing.com");
        assert_eq!(strategies[0].wait, WaitUntil::DomContentLoaded);
        assert_eq!(strategies[0].timeout, Duration::from_secs(60));
        assert_eq!(strategies[0].network_idle, Some(Duration::from_secs(30)));

        assert_eq!(strategies[1].url, "https://www.bing.com/search");

        assert_eq!(strategies[2].wait, WaitUntil::Load);
        assert_eq!(strategies[2].timeout, Duration::from_secs(90));
        assert!(strategies[2].network_idle.is_none());
    }

    #[test]
    fn alternate_path_replaces_target_path() {
        let plan = NavigationPlan::default().with_alternate_path("/search");
        let strategies = plan
            .strategies_for("https://duckduckgo.com/html/?q=x")
            .expect("valid target");
        assert_eq!(strategies[1].url, "https://duckduckgo.com/search");
    }

    #[test]
    fn invalid_targets_are_rejected() {
        let err = NavigationPlan::default()
            .strategies_for("not a url")
            .expect_err("invalid url");
        assert!(matches!(err, NavigationError::InvalidTarget { .. }));
    }
}
