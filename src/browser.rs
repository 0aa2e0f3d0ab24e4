//! Local browser launch options derived from the pilot configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::PilotConfig;

pub const DEFAULT_LAUNCH_ARGS: [&str; 1] = ["--disable-blink-features=AutomationControlled"];

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1024,
            height: 768,
        }
    }
}

/// How the local Chromium is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub args: Vec<String>,
    pub viewport: Viewport,
    pub locale: String,
    #[serde(rename = "ignoreHTTPSErrors")]
    pub ignore_https_errors: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        LaunchOptions {
            headless: false,
            chrome_executable: None,
            args: DEFAULT_LAUNCH_ARGS.iter().map(|arg| arg.to_string()).collect(),
            viewport: Viewport::default(),
            locale: "en-US".to_string(),
            ignore_https_errors: true,
        }
    }
}

impl LaunchOptions {
    pub fn from_config(config: &PilotConfig) -> Self {
        LaunchOptions {
            headless: config.headless,
            chrome_executable: config.chrome_executable.clone(),
            viewport: Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
            ..LaunchOptions::default()
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}
