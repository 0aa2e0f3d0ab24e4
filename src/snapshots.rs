//! Numbered screenshot artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::fs;

use crate::driver::PageDriver;
use crate::logging::PilotLogger;

/// Writes `{dir}/{NN}_{label}.png` through the page driver.
///
/// Capture failures are logged and never propagate: a missing artifact must
/// not change how a run ends.
#[derive(Debug)]
pub struct SnapshotRecorder {
    dir: PathBuf,
    counter: AtomicU32,
    logger: Arc<PilotLogger>,
}

impl SnapshotRecorder {
    pub fn new(dir: impl Into<PathBuf>, logger: Arc<PilotLogger>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU32::new(0),
            logger,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn capture(&self, driver: &dyn PageDriver, label: &str) -> Option<PathBuf> {
        if let Err(err) = fs::create_dir_all(&self.dir).await {
            self.logger.warn(
                format!(
                    "Failed to create artifact directory {}: {err}",
                    self.dir.display()
                ),
                Some("snapshot"),
                None,
            );
            return None;
        }

        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self
            .dir
            .join(format!("{sequence:02}_{}.png", sanitize_label(label)));

        match driver.screenshot(&path).await {
            Ok(()) => {
                self.logger.info(
                    format!("Screenshot saved: {}", path.display()),
                    Some("snapshot"),
                    None,
                );
                Some(path)
            }
            Err(err) => {
                self.logger.warn(
                    format!("Failed to take screenshot '{label}': {err}"),
                    Some("snapshot"),
                    None,
                );
                None
            }
        }
    }
}

/// Reduce a label to characters that are safe in file names.
pub fn sanitize_label(label: &str) -> String {
    let mut sanitized = String::with_capacity(label.len());
    let mut last_was_separator = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            sanitized.push(ch);
            last_was_separator = false;
        } else if !last_was_separator {
            sanitized.push('_');
            last_was_separator = true;
        }
    }
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "snapshot".to_string()
    } else {
        trimmed.to_string()
    }
}
