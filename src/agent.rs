//! Bounded agent loop that hands the browser to the decision service.
//!
//! Each iteration sends a prompt (chosen by iteration index) together with
//! the computer-use tool descriptor, charges the call to the [`CostLedger`]
//! and checks the response for completion. The loop ends at the first
//! completion or after `max_iterations` dispatches, whichever comes first. A
//! failed call is logged and the next iteration proceeds; a lost page ends
//! the loop with an error before anything else is dispatched.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::config::PilotConfig;
use crate::context::RunContext;
use crate::decision::{DecisionRequest, DecisionService};
use crate::driver::DriverError;
use crate::metrics::{CostLedger, get_inference_time_ms, start_inference_timer};
use crate::overlay::truncate_message;
use crate::prompts::prompt_for_iteration;

/// Words in the response text that count as completion from iteration 2 onwards.
pub const COMPLETION_KEYWORDS: [&str; 3] = ["article", "clicked", "news"];
/// Markers in the current URL that count as completion on any iteration.
pub const URL_MARKERS: [&str; 2] = ["news", "article"];
const TEXT_SIGNAL_FROM_ITERATION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Init,
    Iterating { index: u32 },
    Succeeded { iteration: u32 },
    Exhausted { iterations: u32 },
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Succeeded { .. } | AgentState::Exhausted { .. }
        )
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, AgentState::Succeeded { .. })
    }
}

/// Which heuristics judged the task done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionSignal {
    pub by_text: bool,
    pub by_url: bool,
}

impl CompletionSignal {
    pub fn fired(&self) -> bool {
        self.by_text || self.by_url
    }
}

/// Completion heuristic for a 1-based iteration.
///
/// The text check is deliberately coarse: "news" appears in almost any
/// response about the query, so from iteration 2 onwards it nearly always
/// fires. The URL check applies on every iteration. Both are
/// case-insensitive.
pub fn evaluate_completion(
    index: u32,
    response_text: &str,
    current_url: Option<&str>,
) -> CompletionSignal {
    let text = response_text.to_lowercase();
    let by_text = index >= TEXT_SIGNAL_FROM_ITERATION
        && COMPLETION_KEYWORDS.iter().any(|keyword| text.contains(keyword));
    let by_url = current_url
        .map(str::to_lowercase)
        .map(|url| URL_MARKERS.iter().any(|marker| url.contains(marker)))
        .unwrap_or(false);
    CompletionSignal { by_text, by_url }
}

/// Record of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentIteration {
    pub index: u32,
    pub prompt_text: String,
    pub raw_response: Option<String>,
    pub error: Option<String>,
    pub completion_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    pub state: AgentState,
    pub iterations_run: u32,
    pub calls_dispatched: u32,
    pub total_cost: f64,
    pub inference_time_ms: u64,
    pub iterations: Vec<AgentIteration>,
}

impl AgentSummary {
    pub fn succeeded(&self) -> bool {
        self.state.succeeded()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub query: String,
    pub max_iterations: u32,
    pub cost_per_call: f64,
    pub display_width: u32,
    pub display_height: u32,
}

impl AgentSettings {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            model: config.model.clone(),
            query: config.search_text.clone(),
            max_iterations: config.max_iterations,
            cost_per_call: config.cost_per_call,
            display_width: config.viewport_width,
            display_height: config.viewport_height,
        }
    }
}

pub struct AgentLoop<'a> {
    ctx: RunContext<'a>,
    service: &'a dyn DecisionService,
    settings: AgentSettings,
    ledger: CostLedger,
    state: AgentState,
}

impl<'a> AgentLoop<'a> {
    pub fn new(ctx: RunContext<'a>, service: &'a dyn DecisionService, settings: AgentSettings) -> Self {
        let ledger = CostLedger::new(settings.cost_per_call);
        Self {
            ctx,
            service,
            settings,
            ledger,
            state: AgentState::Init,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub async fn run(&mut self) -> Result<AgentSummary, DriverError> {
        let max = self.settings.max_iterations;
        let mut iterations = Vec::new();

        for index in 1..=max {
            self.state = AgentState::Iterating { index };
            let record = self.iterate(index, max).await?;
            let done = record.completion_detected;
            iterations.push(record);
            if done {
                self.state = AgentState::Succeeded { iteration: index };
                break;
            }
        }

        if !self.state.succeeded() {
            self.state = AgentState::Exhausted { iterations: max };
        }

        let summary = AgentSummary {
            state: self.state,
            iterations_run: iterations.len() as u32,
            calls_dispatched: self.ledger.calls_attempted(),
            total_cost: self.ledger.total(),
            inference_time_ms: self.ledger.inference_time_ms(),
            iterations,
        };

        self.ctx.logger().info(
            format!(
                "Agent finished after {} iterations (success: {})",
                summary.iterations_run,
                summary.succeeded()
            ),
            Some("agent"),
            Some(json!({
                "iterations": summary
                    .iterations
                    .iter()
                    .map(|record| json!({
                        "index": record.index,
                        "completion_detected": record.completion_detected,
                        "error": record.error,
                    }))
                    .collect::<Vec<JsonValue>>(),
                "total_cost": summary.total_cost,
            })),
        );
        Ok(summary)
    }

    async fn iterate(&mut self, index: u32, max: u32) -> Result<AgentIteration, DriverError> {
        self.ctx.try_current_url().await?;
        let logger = self.ctx.logger();
        logger.info(format!("Starting iteration {index}/{max}"), Some("agent"), None);
        self.ctx
            .status(&format!("Starting iteration {index}/{max}..."))
            .await;
        self.ctx.pause(Duration::from_secs(1)).await;

        let prompt = prompt_for_iteration(index, &self.settings.query);
        let request = DecisionRequest::computer_use(
            self.settings.model.clone(),
            prompt.clone(),
            self.settings.display_width,
            self.settings.display_height,
        );

        logger.info(
            format!("Sending request to {} (iteration {index})", self.settings.model),
            Some("agent"),
            None,
        );
        self.ctx
            .status(&format!(
                "Iteration {index}/{max}: Sending request to Computer Use agent..."
            ))
            .await;
        self.ctx.pause(Duration::from_secs(2)).await;
        self.ctx
            .status(&format!(
                "Iteration {index}/{max}: Agent is analyzing and controlling the browser..."
            ))
            .await;

        let timer = start_inference_timer();
        let outcome = self.service.decide(request).await;
        let running_total = self.ledger.record_dispatch();
        self.ledger.record_inference_time(get_inference_time_ms(timer));
        logger.debug(
            format!(
                "Decision calls so far: {}, estimated cost ${running_total:.4}",
                self.ledger.calls_attempted()
            ),
            Some("agent"),
            None,
        );

        let mut record = AgentIteration {
            index,
            prompt_text: prompt,
            raw_response: None,
            error: None,
            completion_detected: false,
        };

        match outcome {
            Ok(response) => {
                let text = response.text();
                logger.info(
                    format!("Response received successfully (iteration {index})"),
                    Some("agent"),
                    None,
                );
                logger.debug(format!("Output: {text}"), Some("agent"), None);
                for action in response.proposed_actions() {
                    logger.info(
                        format!("Proposed computer action: {action:?}"),
                        Some("agent"),
                        None,
                    );
                }

                self.ctx
                    .status(&format!(
                        "Iteration {index}/{max}: Agent response received! Processing..."
                    ))
                    .await;
                self.ctx.pause(Duration::from_secs(2)).await;
                self.ctx
                    .snapshot(&format!("state_after_iteration_{index}"))
                    .await;

                let url = self.ctx.try_current_url().await?;
                if let Some(url) = &url {
                    logger.info(format!("Current URL: {url}"), Some("agent"), None);
                }
                let signal = evaluate_completion(index, &text, url.as_deref());
                record.completion_detected = signal.fired();
                record.raw_response = Some(text);

                if signal.by_text {
                    logger.info(
                        "Task completed successfully - response reports an opened article",
                        Some("agent"),
                        None,
                    );
                }
                if signal.by_url {
                    logger.info(
                        "URL indicates successful navigation to a news article",
                        Some("agent"),
                        None,
                    );
                }

                if signal.fired() {
                    self.ctx.status("SUCCESS! News article page detected!").await;
                } else if index == max {
                    logger.info(
                        "Maximum iterations reached without completion",
                        Some("agent"),
                        None,
                    );
                    self.ctx
                        .status("Maximum iterations reached. Task may not be complete.")
                        .await;
                } else {
                    self.ctx
                        .status(&format!("Iteration {index} complete. Continuing search..."))
                        .await;
                }
            }
            Err(err) => {
                let message = err.to_string();
                logger.error(
                    format!("An error occurred in iteration {index}: {message}"),
                    Some("agent"),
                    None,
                );
                self.ctx
                    .status(&format!(
                        "ERROR in iteration {index}: {}",
                        truncate_message(&message, 50)
                    ))
                    .await;
                self.ctx
                    .snapshot(&format!("error_state_iteration_{index}"))
                    .await;
                record.error = Some(message);
            }
        }

        self.ctx.pause(Duration::from_secs(3)).await;
        Ok(record)
    }
}
