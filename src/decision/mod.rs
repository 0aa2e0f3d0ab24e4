//! Decision-service abstractions.
//!
//! The agent loop hands a prompt plus the computer-use tool descriptor to a
//! [`DecisionService`] and reads back the raw output items. The default
//! service speaks the OpenAI / Azure OpenAI Responses API.

pub mod error;
pub mod provider;
pub mod responses;
pub mod types;

pub use error::DecisionError;
pub use provider::DecisionService;
pub use responses::ResponsesApiClient;
pub use types::{ComputerAction, DecisionRequest, DecisionResponse, ToolDescriptor};
