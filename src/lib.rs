//! Search pilot: reach a search engine, prefill a query, then let a
//! computer-use decision service drive the browser to a news article.

pub mod agent;
pub mod browser;
pub mod config;
pub mod context;
pub mod decision;
pub mod discovery;
pub mod dom_scripts;
pub mod driver;
pub mod interaction;
pub mod logging;
pub mod metrics;
pub mod navigation;
pub mod overlay;
pub mod pilot;
pub mod prompts;
pub mod runtime;
pub mod selectors;
pub mod session;
pub mod snapshots;

pub use config::{Pacing, PilotConfig, PilotConfigOverrides, Verbosity};
pub use pilot::{PilotError, RunReport, SearchPilot};
