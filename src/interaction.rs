//! One-shot prefill of the search box and submission of the query.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::context::RunContext;
use crate::discovery::{DiscoveredElement, ElementDiscoveryEngine};
use crate::dom_scripts;
use crate::driver::{DriverError, ElementSnapshot};
use crate::selectors::{ElementRole, Locator, SelectorCandidate, SelectorCatalog};

pub const CLICK_TIMEOUT: Duration = Duration::from_secs(5);
pub const SUBMIT_KEY: &str = "Enter";
const HEURISTIC_SUBMIT_DELAY_MS: u64 = 500;
const AFTER_SUBMIT_PAUSE: Duration = Duration::from_secs(2);

/// Ways of submitting the filled query, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTier {
    KeyPress,
    ButtonClick,
    ScriptSubmit,
}

impl SubmitTier {
    pub const ORDER: [SubmitTier; 3] = [
        SubmitTier::KeyPress,
        SubmitTier::ButtonClick,
        SubmitTier::ScriptSubmit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SubmitTier::KeyPress => "Enter key",
            SubmitTier::ButtonClick => "submit button click",
            SubmitTier::ScriptSubmit => "script form submit",
        }
    }

    fn snapshot_label(self) -> &'static str {
        match self {
            SubmitTier::KeyPress => "after_enter_press",
            SubmitTier::ButtonClick => "after_button_click",
            SubmitTier::ScriptSubmit => "after_js_submit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum TierResult {
    Submitted,
    Failed(String),
    /// The tier had nothing to act on.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionOutcome {
    /// True only when an input was filled and one tier submitted it.
    pub success: bool,
    pub selector_used: Option<SelectorCandidate>,
    pub failure_reason: Option<String>,
    pub submission: Option<SubmitTier>,
    pub tiers: Vec<(SubmitTier, TierResult)>,
}

impl InteractionOutcome {
    fn input_not_found() -> Self {
        Self {
            success: false,
            selector_used: None,
            failure_reason: Some("no visible search input matched the catalog".to_string()),
            submission: None,
            tiers: Vec::new(),
        }
    }

    pub fn filled(&self) -> bool {
        self.selector_used.is_some()
    }
}

/// Result of the last-resort script fill. Nothing here is verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeuristicFill {
    pub input_index: Option<usize>,
    pub filled: bool,
    pub submit_scheduled: bool,
}

/// Whether an `<input>` looks like it accepts a search query.
pub fn looks_like_search_input(element: &ElementSnapshot) -> bool {
    if !element.tag.eq_ignore_ascii_case("input") {
        return false;
    }
    let input_type = element.input_type();
    if input_type == "text" || input_type == "search" {
        return true;
    }
    if element.attribute("name") == Some("q") {
        return true;
    }
    ["placeholder", "aria-label"]
        .iter()
        .filter_map(|key| element.attribute(key))
        .any(|value| value.to_lowercase().contains("search"))
}

pub struct InteractionExecutor<'a> {
    ctx: RunContext<'a>,
    discovery: ElementDiscoveryEngine<'a>,
    click_timeout: Duration,
}

impl<'a> InteractionExecutor<'a> {
    pub fn new(ctx: RunContext<'a>, catalog: &'a SelectorCatalog) -> Self {
        let discovery = ElementDiscoveryEngine::new(ctx.clone(), catalog);
        Self {
            ctx,
            discovery,
            click_timeout: CLICK_TIMEOUT,
        }
    }

    /// Fill the first usable search input with `value` and submit it.
    ///
    /// Per-candidate and per-tier failures are absorbed into the outcome; only
    /// a lost page is returned as an error.
    pub async fn prefill_and_submit(&self, value: &str) -> Result<InteractionOutcome, DriverError> {
        let logger = self.ctx.logger();
        self.ctx
            .status(&format!("Looking for search box to prefill '{value}'..."))
            .await;

        let submit_control = self.discovery.discover(ElementRole::SubmitControl).await?;
        self.ctx.snapshot("before_search_prefill").await;

        let Some(input) = self.fill_first_usable(value).await? else {
            logger.warn("Search box not found for prefilling", Some("interaction"), None);
            self.ctx.status("Search box not found for prefilling").await;
            self.ctx.snapshot("search_box_not_found").await;
            return Ok(InteractionOutcome::input_not_found());
        };

        self.highlight(&input.locator).await;
        self.ctx
            .status(&format!("Found and filled search box with '{value}'"))
            .await;
        self.ctx.pause(AFTER_SUBMIT_PAUSE).await;
        self.ctx.snapshot("prefilled_search_highlighted").await;

        let mut tiers = Vec::with_capacity(SubmitTier::ORDER.len());
        for tier in SubmitTier::ORDER {
            let result = self
                .attempt_tier(tier, &input, submit_control.as_ref())
                .await?;
            match &result {
                TierResult::Submitted => logger.info(
                    format!("Search submitted via {}", tier.label()),
                    Some("interaction"),
                    None,
                ),
                TierResult::Failed(reason) => logger.warn(
                    format!("{} failed: {reason}", tier.label()),
                    Some("interaction"),
                    None,
                ),
                TierResult::Unavailable(reason) => logger.info(
                    format!("{} unavailable: {reason}", tier.label()),
                    Some("interaction"),
                    None,
                ),
            }

            let submitted = result == TierResult::Submitted;
            tiers.push((tier, result));
            if submitted {
                self.ctx.pause(AFTER_SUBMIT_PAUSE).await;
                self.ctx.snapshot(tier.snapshot_label()).await;
                return Ok(InteractionOutcome {
                    success: true,
                    selector_used: Some(input),
                    failure_reason: None,
                    submission: Some(tier),
                    tiers,
                });
            }
        }

        logger.warn(
            "Search box was filled but every submission tier failed",
            Some("interaction"),
            None,
        );
        Ok(InteractionOutcome {
            success: false,
            selector_used: Some(input),
            failure_reason: Some("submission failed at every tier".to_string()),
            submission: None,
            tiers,
        })
    }

    /// Last resort when the catalog found nothing: pick a search-like input by
    /// its attributes, set its value in page context and schedule a form submit.
    pub async fn heuristic_fill(&self, value: &str) -> Result<HeuristicFill, DriverError> {
        let logger = self.ctx.logger();
        let driver = self.ctx.driver();
        logger.info("Trying direct JavaScript approach for search", Some("interaction"), None);

        let inputs = match driver.query_all(&Locator::ByTag { tag: "input" }).await {
            Ok(inputs) => inputs,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                logger.warn(
                    format!("Could not list page inputs: {err}"),
                    Some("interaction"),
                    None,
                );
                return Ok(HeuristicFill::default());
            }
        };

        let Some(target) = inputs.iter().find(|input| looks_like_search_input(input)) else {
            logger.warn(
                format!("None of {} inputs looks like a search box", inputs.len()),
                Some("interaction"),
                None,
            );
            return Ok(HeuristicFill::default());
        };

        let request = json!({
            "index": target.index,
            "value": value,
            "delayMs": HEURISTIC_SUBMIT_DELAY_MS,
        });
        let mut report = HeuristicFill {
            input_index: Some(target.index),
            ..HeuristicFill::default()
        };
        match driver.evaluate(dom_scripts::HEURISTIC_FILL, request).await {
            Ok(result) => {
                report.filled = result
                    .get("filled")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false);
                report.submit_scheduled = result
                    .get("submitScheduled")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false);
                logger.info(
                    "JavaScript search result",
                    Some("interaction"),
                    Some(result),
                );
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                logger.warn(
                    format!("JavaScript search attempt failed: {err}"),
                    Some("interaction"),
                    None,
                );
            }
        }

        self.ctx.pause(AFTER_SUBMIT_PAUSE).await;
        self.ctx.snapshot("javascript_search_attempt").await;
        Ok(report)
    }

    async fn fill_first_usable(&self, value: &str) -> Result<Option<SelectorCandidate>, DriverError> {
        let logger = self.ctx.logger();
        for candidate in self.discovery.catalog().candidates(ElementRole::SearchInput) {
            let probe = self.discovery.probe(candidate).await?;
            logger.debug(
                format!(
                    "SEARCH BOX CHECK: '{}' - present: {}, visible: {}",
                    candidate.locator, probe.present, probe.visible
                ),
                Some("interaction"),
                None,
            );
            if !probe.is_usable() {
                continue;
            }

            match self.fill_candidate(&candidate.locator, value).await {
                Ok(()) => {
                    logger.info(
                        format!("Filled search box '{}' with '{value}'", candidate.locator),
                        Some("interaction"),
                        None,
                    );
                    return Ok(Some(candidate.clone()));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => logger.warn(
                    format!("Error with selector {}: {err}", candidate.locator),
                    Some("interaction"),
                    None,
                ),
            }
        }
        Ok(None)
    }

    async fn fill_candidate(&self, locator: &Locator, value: &str) -> Result<(), DriverError> {
        let driver = self.ctx.driver();
        driver.click(locator, self.click_timeout).await?;
        driver.fill(locator, "").await?;
        driver.fill(locator, value).await?;
        self.ctx
            .snapshot(&format!("filled_search_with_{locator}"))
            .await;
        Ok(())
    }

    async fn highlight(&self, locator: &Locator) {
        let script = dom_scripts::with_located_elements(dom_scripts::HIGHLIGHT_ELEMENT);
        let outcome = match dom_scripts::locator_request(locator, JsonValue::Null) {
            Ok(request) => self.ctx.driver().evaluate(&script, request).await.map(|_| ()),
            Err(err) => Err(DriverError::Script(err.to_string())),
        };
        if let Err(err) = outcome {
            self.ctx.logger().warn(
                format!("Could not highlight search box: {err}"),
                Some("interaction"),
                None,
            );
        }
    }

    async fn attempt_tier(
        &self,
        tier: SubmitTier,
        input: &SelectorCandidate,
        submit_control: Option<&DiscoveredElement>,
    ) -> Result<TierResult, DriverError> {
        let driver = self.ctx.driver();
        let attempt = match tier {
            SubmitTier::KeyPress => driver.press_key(&input.locator, SUBMIT_KEY).await,
            SubmitTier::ButtonClick => match submit_control {
                Some(control) => {
                    driver
                        .click(&control.candidate.locator, self.click_timeout)
                        .await
                }
                None => {
                    return Ok(TierResult::Unavailable(
                        "no visible submit control was discovered".to_string(),
                    ));
                }
            },
            SubmitTier::ScriptSubmit => self.submit_enclosing_form(&input.locator).await,
        };

        match attempt {
            Ok(()) => Ok(TierResult::Submitted),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => Ok(TierResult::Failed(err.to_string())),
        }
    }

    async fn submit_enclosing_form(&self, locator: &Locator) -> Result<(), DriverError> {
        let script = dom_scripts::with_located_elements(dom_scripts::SUBMIT_ENCLOSING_FORM);
        let request = dom_scripts::locator_request(locator, JsonValue::Null)
            .map_err(|err| DriverError::Script(err.to_string()))?;
        let result = self.ctx.driver().evaluate(&script, request).await?;
        if result == JsonValue::Bool(false) {
            self.ctx.logger().warn(
                format!("No enclosing form found for {locator}; submission unconfirmed"),
                Some("interaction"),
                None,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(attrs: &[(&str, &str)]) -> ElementSnapshot {
        ElementSnapshot::new("INPUT").with_attributes(attrs)
    }

    #[test]
    fn search_like_inputs_are_recognised() {
        assert!(looks_like_search_input(&input(&[])));
        assert!(looks_like_search_input(&input(&[("type", "search")])));
        assert!(looks_like_search_input(&input(&[("type", "hidden"), ("name", "q")])));
        assert!(looks_like_search_input(&input(&[
            ("type", "email"),
            ("placeholder", "Search the web")
        ])));
        assert!(looks_like_search_input(&input(&[
            ("type", "url"),
            ("aria-label", "SEARCH")
        ])));
    }

    #[test]
    fn other_inputs_are_ignored() {
        assert!(!looks_like_search_input(&input(&[("type", "hidden"), ("name", "form")])));
        assert!(!looks_like_search_input(&input(&[("type", "checkbox")])));
        assert!(!looks_like_search_input(
            &ElementSnapshot::new("TEXTAREA").with_attributes(&[("name", "q")])
        ));
    }

    #[test]
    fn tiers_are_ordered() {
        assert_eq!(
            SubmitTier::ORDER,
            [
                SubmitTier::KeyPress,
                SubmitTier::ButtonClick,
                SubmitTier::ScriptSubmit
            ]
        );
        assert_eq!(SubmitTier::ButtonClick.snapshot_label(), "after_button_click");
    }
}
