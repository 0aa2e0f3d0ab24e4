use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::error::DecisionError;

/// Surface the computer-use tool operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSurface {
    Browser,
    Mac,
    Windows,
    Ubuntu,
}

/// Declares the computer-use capability and the display it controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(rename = "type")]
    pub capability: String,
    pub display_width: u32,
    pub display_height: u32,
    pub environment: OperatingSurface,
}

impl ToolDescriptor {
    pub fn computer_use(display_width: u32, display_height: u32) -> Self {
        Self {
            capability: "computer_use_preview".to_string(),
            display_width,
            display_height,
            environment: OperatingSurface::Browser,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    Concise,
    Detailed,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningOptions {
    pub generate_summary: SummaryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truncation {
    Auto,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Body of one `POST /responses` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub model: String,
    pub input: Vec<InputMessage>,
    pub tools: Vec<ToolDescriptor>,
    pub reasoning: ReasoningOptions,
    pub truncation: Truncation,
}

impl DecisionRequest {
    /// A single user prompt with the computer-use tool for the given display.
    pub fn computer_use(
        model: impl Into<String>,
        prompt: impl Into<String>,
        display_width: u32,
        display_height: u32,
    ) -> Self {
        Self {
            model: model.into(),
            input: vec![InputMessage {
                role: MessageRole::User,
                content: prompt.into(),
            }],
            tools: vec![ToolDescriptor::computer_use(display_width, display_height)],
            reasoning: ReasoningOptions {
                generate_summary: SummaryMode::Concise,
            },
            truncation: Truncation::Auto,
        }
    }

    pub fn prompt(&self) -> &str {
        self.input
            .first()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }
}

/// The parts of a Responses API reply the pilot reads. Output items are kept
/// as raw JSON so unknown item types survive untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub output: Vec<JsonValue>,
    #[serde(default)]
    pub usage: Option<JsonValue>,
}

impl DecisionResponse {
    pub fn from_output(output: Vec<JsonValue>) -> Self {
        Self {
            id: None,
            output,
            usage: None,
        }
    }

    pub fn from_json(body: JsonValue) -> Result<Self, DecisionError> {
        if !body.get("output").map(JsonValue::is_array).unwrap_or(false) {
            return Err(DecisionError::MalformedResponse(
                "response body has no `output` array".to_string(),
            ));
        }
        serde_json::from_value(body).map_err(|err| DecisionError::MalformedResponse(err.to_string()))
    }

    /// Flat rendering of every output item, used for logging and completion checks.
    pub fn text(&self) -> String {
        JsonValue::Array(self.output.clone()).to_string()
    }

    /// Computer actions the agent proposed, in output order.
    pub fn proposed_actions(&self) -> Vec<ComputerAction> {
        self.output
            .iter()
            .filter(|item| item.get("type").and_then(JsonValue::as_str) == Some("computer_call"))
            .filter_map(|item| item.get("action"))
            .map(|action| {
                serde_json::from_value(action.clone()).unwrap_or(ComputerAction::Unrecognized)
            })
            .collect()
    }

    /// Assistant message text, concatenated.
    pub fn message_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.get("type").and_then(JsonValue::as_str) == Some("message"))
            .filter_map(|item| item.get("content").and_then(JsonValue::as_array))
            .flatten()
            .filter_map(|part| part.get("text").and_then(JsonValue::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Action carried by a `computer_call` output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputerAction {
    Click {
        x: i32,
        y: i32,
        #[serde(default)]
        button: Option<String>,
    },
    DoubleClick {
        x: i32,
        y: i32,
    },
    Type {
        text: String,
    },
    Keypress {
        keys: Vec<String>,
    },
    Scroll {
        x: i32,
        y: i32,
        #[serde(default)]
        scroll_x: Option<i32>,
        #[serde(default)]
        scroll_y: Option<i32>,
    },
    Drag {
        path: Vec<Point>,
    },
    Move {
        x: i32,
        y: i32,
    },
    Wait,
    Screenshot,
    #[serde(other)]
    Unrecognized,
}
