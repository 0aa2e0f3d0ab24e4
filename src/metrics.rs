//! Cost accounting for decision-service calls plus lightweight timing helpers
//! for inference latency measurements.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Running estimate of what the decision service has cost this run.
///
/// Every dispatched call is charged, whether or not it produced a usable
/// response, so the total is always `calls_attempted * per_call`.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CostLedger {
    per_call: f64,
    calls_attempted: u32,
    inference_time_ms: u64,
}

impl CostLedger {
    /// Negative and non-finite rates are clamped to zero.
    pub fn new(per_call: f64) -> Self {
        let per_call = if per_call.is_finite() { per_call.max(0.0) } else { 0.0 };
        Self {
            per_call,
            calls_attempted: 0,
            inference_time_ms: 0,
        }
    }

    /// Charge one dispatched call and return the new running total.
    pub fn record_dispatch(&mut self) -> f64 {
        self.calls_attempted = self.calls_attempted.saturating_add(1);
        self.total()
    }

    pub fn record_inference_time(&mut self, elapsed_ms: u64) {
        self.inference_time_ms = self.inference_time_ms.saturating_add(elapsed_ms);
    }

    pub fn per_call(&self) -> f64 {
        self.per_call
    }

    pub fn calls_attempted(&self) -> u32 {
        self.calls_attempted
    }

    pub fn total(&self) -> f64 {
        f64::from(self.calls_attempted) * self.per_call
    }

    pub fn inference_time_ms(&self) -> u64 {
        self.inference_time_ms
    }
}

/// Start an inference timer using [`Instant::now`].
pub fn start_inference_timer() -> Instant {
    Instant::now()
}

/// Return the elapsed milliseconds since the provided start instant.
pub fn get_inference_time_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
