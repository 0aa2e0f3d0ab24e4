use async_trait::async_trait;

use super::error::DecisionError;
use super::types::{DecisionRequest, DecisionResponse};

/// Abstraction over the computer-use decision service so the agent loop can
/// be tested without performing real HTTP requests.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, request: DecisionRequest) -> Result<DecisionResponse, DecisionError>;
}
