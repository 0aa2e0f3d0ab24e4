//! Strongly-typed configuration for a search-pilot run.
//!
//! Values start from defaults, can be loaded from environment variables (with
//! optional `.env` support) and merged with explicit overrides coming from the
//! command line.

use std::env;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use thiserror::Error;
use tokio::time;

/// Page the pilot opens when nothing else is configured.
pub const DEFAULT_TARGET_URL: &str = "https://www.bing.com";
/// Path tried against the target origin when the direct load fails.
pub const DEFAULT_ALTERNATE_PATH: &str = "/search";
/// Query typed into the search box before the agent takes over.
pub const DEFAULT_SEARCH_TEXT: &str = "AI news";
/// Model name sent to the decision service.
pub const DEFAULT_MODEL: &str = "computer-use-preview";
/// Azure OpenAI API version used when `OPENAI_API_VERSION` is not set.
pub const DEFAULT_AZURE_API_VERSION: &str = "2025-03-01-preview";

/// Verbosity level for pilot logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// How long the human-observer pauses between steps last.
///
/// The workflow sleeps between most steps so that a person watching the
/// browser can follow along. `Interactive` keeps the full delays, `Fast`
/// shortens them to a tenth and `None` removes them entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveSerialize, DeriveDeserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    Interactive,
    Fast,
    None,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Interactive
    }
}

impl Pacing {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "interactive" => Some(Pacing::Interactive),
            "fast" => Some(Pacing::Fast),
            "none" | "off" => Some(Pacing::None),
            _ => None,
        }
    }

    pub fn factor(self) -> f64 {
        match self {
            Pacing::Interactive => 1.0,
            Pacing::Fast => 0.1,
            Pacing::None => 0.0,
        }
    }

    pub fn scaled(self, base: Duration) -> Duration {
        base.mul_f64(self.factor())
    }

    pub async fn pause(self, base: Duration) {
        let delay = self.scaled(base);
        if !delay.is_zero() {
            time::sleep(delay).await;
        }
    }
}

/// Configuration values for one pilot run.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct PilotConfig {
    pub target_url: String,
    pub alternate_path: String,
    pub search_text: String,
    pub cost_per_call: f64,
    pub max_iterations: u32,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub pacing: Pacing,
    pub settle_delay_ms: u64,
    pub artifact_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub verbose: Verbosity,
    pub show_overlay: bool,
    pub model: String,
    pub decision_timeout_secs: u64,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_api_version: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        PilotConfig {
            target_url: DEFAULT_TARGET_URL.to_string(),
            alternate_path: DEFAULT_ALTERNATE_PATH.to_string(),
            search_text: DEFAULT_SEARCH_TEXT.to_string(),
            cost_per_call: 0.0,
            max_iterations: 3,
            headless: false,
            chrome_executable: None,
            viewport_width: 1024,
            viewport_height: 768,
            pacing: Pacing::default(),
            settle_delay_ms: 3_000,
            artifact_dir: PathBuf::from("."),
            log_file: Some(PathBuf::from("log.txt")),
            verbose: Verbosity::default(),
            show_overlay: true,
            model: DEFAULT_MODEL.to_string(),
            decision_timeout_secs: 120,
            azure_endpoint: None,
            azure_api_key: None,
            azure_api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            openai_api_key: None,
            openai_base_url: None,
        }
    }
}

impl PilotConfig {
    /// Construct a configuration by reading relevant environment variables, after
    /// loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = PilotConfig::default();

        if let Some(value) = env_var("ESTIMATED_COST_PER_CALL") {
            config.cost_per_call = parse_cost("ESTIMATED_COST_PER_CALL", &value)?;
        }

        if let Some(value) = env_var("PILOT_TARGET_URL") {
            config.target_url = value;
        }

        if let Some(value) = env_var("PILOT_ALTERNATE_PATH") {
            config.alternate_path = value;
        }

        if let Some(value) = env_var("PILOT_SEARCH_TEXT") {
            config.search_text = value;
        }

        if let Some(value) = env_var("PILOT_MAX_ITERATIONS") {
            config.max_iterations = parse_u32("PILOT_MAX_ITERATIONS", &value)?;
        }

        if let Some(value) = env_var("PILOT_HEADLESS") {
            config.headless = parse_bool("PILOT_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("PILOT_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("PILOT_PACING") {
            config.pacing = Pacing::parse(&value)
                .ok_or_else(|| ConfigError::invalid_enum("PILOT_PACING", value.clone()))?;
        }

        if let Some(value) = env_var("PILOT_SETTLE_DELAY_MS") {
            config.settle_delay_ms = parse_u64("PILOT_SETTLE_DELAY_MS", &value)?;
        }

        if let Some(value) = env_var("PILOT_ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(value);
        }

        if let Some(value) = env_var("PILOT_LOG_FILE") {
            config.log_file = match value.to_ascii_lowercase().as_str() {
                "none" | "off" => None,
                _ => Some(PathBuf::from(value)),
            };
        }

        if let Some(value) = env_var("PILOT_VERBOSE") {
            let parsed = parse_u8("PILOT_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed)
                .ok_or_else(|| ConfigError::invalid_enum("PILOT_VERBOSE", parsed.to_string()))?;
        }

        if let Some(value) = env_var("PILOT_SHOW_OVERLAY") {
            config.show_overlay = parse_bool("PILOT_SHOW_OVERLAY", &value)?;
        }

        if let Some(value) = env_var("PILOT_MODEL") {
            config.model = value;
        }

        if let Some(value) = env_var("PILOT_DECISION_TIMEOUT_SECS") {
            config.decision_timeout_secs = parse_u64("PILOT_DECISION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = env_var("AZURE_OPENAI_ENDPOINT") {
            config.azure_endpoint = Some(value);
        }

        if let Some(value) = env_var("AZURE_OPENAI_API_KEY") {
            config.azure_api_key = Some(value);
        }

        if let Some(value) = env_var("OPENAI_API_VERSION") {
            config.azure_api_version = value;
        }

        if let Some(value) = env_var("OPENAI_API_KEY") {
            config.openai_api_key = Some(value);
        }

        if let Some(value) = env_var("OPENAI_BASE_URL") {
            config.openai_base_url = Some(value);
        }

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: PilotConfigOverrides) -> PilotConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.target_url {
            next.target_url = value;
        }
        if let Some(value) = overrides.search_text {
            next.search_text = value;
        }
        if let Some(value) = overrides.max_iterations {
            next.max_iterations = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.pacing {
            next.pacing = value;
        }
        if let Some(value) = overrides.artifact_dir {
            next.artifact_dir = value;
        }
        if let Some(value) = overrides.log_file {
            next.log_file = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }

        next
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// True when the Azure endpoint is configured; the OpenAI provider is used otherwise.
    pub fn uses_azure(&self) -> bool {
        self.azure_endpoint.is_some()
    }
}

/// Field-level overrides for [`PilotConfig::with_overrides`].
#[derive(Debug, Default, Clone)]
pub struct PilotConfigOverrides {
    pub target_url: Option<String>,
    pub search_text: Option<String>,
    pub max_iterations: Option<u32>,
    pub headless: Option<bool>,
    pub pacing: Option<Pacing>,
    pub artifact_dir: Option<PathBuf>,
    pub log_file: Option<Option<PathBuf>>,
    pub verbose: Option<Verbosity>,
}

impl PilotConfigOverrides {
    /// Builder-style helper to set the `target_url` override.
    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    /// Builder-style helper to set the `pacing` override.
    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = Some(pacing);
        self
    }
}

impl fmt::Debug for PilotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PilotConfig")
            .field("target_url", &self.target_url)
            .field("alternate_path", &self.alternate_path)
            .field("search_text", &self.search_text)
            .field("cost_per_call", &self.cost_per_call)
            .field("max_iterations", &self.max_iterations)
            .field("headless", &self.headless)
            .field("chrome_executable", &self.chrome_executable)
            .field("viewport", &(self.viewport_width, self.viewport_height))
            .field("pacing", &self.pacing)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("artifact_dir", &self.artifact_dir)
            .field("log_file", &self.log_file)
            .field("verbose", &self.verbose)
            .field("show_overlay", &self.show_overlay)
            .field("model", &self.model)
            .field("decision_timeout_secs", &self.decision_timeout_secs)
            .field("azure_endpoint", &self.azure_endpoint)
            .field("azure_api_key_present", &self.azure_api_key.is_some())
            .field("azure_api_version", &self.azure_api_version)
            .field("openai_api_key_present", &self.openai_api_key.is_some())
            .field("openai_base_url", &self.openai_base_url)
            .finish()
    }
}

/// Errors that can arise while constructing a [`PilotConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid decimal '{value}' for {field}: {source}")]
    InvalidFloat {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("{field} must be a finite, non-negative amount (got {value})")]
    NegativeAmount { field: &'static str, value: String },
}

impl ConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        ConfigError::InvalidEnumVariant { field, value }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_cost(field: &'static str, value: &str) -> Result<f64, ConfigError> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|source| ConfigError::InvalidFloat {
            field,
            value: value.to_string(),
            source,
        })?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(ConfigError::NegativeAmount {
            field,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}
