use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the decision-service layer.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("missing decision service credentials; set AZURE_OPENAI_API_KEY or OPENAI_API_KEY")]
    MissingApiKey,
    #[error("decision service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decision service timed out after {0:?}")]
    Timeout(Duration),
    #[error("decision service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed decision service response: {0}")]
    MalformedResponse(String),
}
