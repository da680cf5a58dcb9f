use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Body of /agent/run and /agent/stream.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    /// Natural-language instruction for the agent
    pub instruction: String,

    /// CDP endpoint of the browser to drive
    #[serde(default = "default_cdp_url")]
    pub cdp_url: String,

    /// Target (tab) id for direct commands
    #[serde(default)]
    pub target_id: Option<String>,

    /// Model API key override for this request
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_cdp_url() -> String {
    "http://127.0.0.1:9222".to_string()
}

/// Classifier verdict for one instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

impl Intent {
    pub fn url(&self) -> Option<&str> {
        self.params.get("url").and_then(Value::as_str)
    }
}

/// One moment of task progress, pushed over the event channel and framed as
/// an SSE `data:` message. The tag set is the wire contract with clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Classifying {
        instruction: String,
    },
    Classified {
        action: String,
        params: Value,
    },
    FastAction {
        action: String,
        url: String,
    },
    AgentStarting,
    Step {
        step: u32,
        next_goal: Option<String>,
        /// Best-effort action summary; omitted entirely when the step payload
        /// could not be introspected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actions: Option<Vec<Value>>,
    },
    Done {
        result: String,
    },
    Stopped {
        result: String,
    },
    Error {
        message: String,
    },
}

impl AgentEvent {
    /// Terminal events end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentEvent::Done { .. } | AgentEvent::Stopped { .. } | AgentEvent::Error { .. }
        )
    }
}

/// Actions the pipeline can execute against the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    /// Navigate to a URL
    Navigate { url: String },
    /// Click an element
    Click { selector: String },
    /// Type text into an element
    Type { selector: String, text: String },
    /// Press a key
    PressKey { key: String },
    /// Scroll the page
    Scroll {
        direction: ScrollDirection,
        amount: u32,
    },
    /// Wait for an element or time
    Wait {
        duration_ms: Option<u64>,
        selector: Option<String>,
    },
    /// Extract data from the page
    Extract { selectors: HashMap<String, String> },
    /// Go back in history
    GoBack,
    /// No action needed (task complete or waiting)
    None,
}

/// Scroll direction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Result of executing a single action
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

/// One model decision, parsed from a completion.
///
/// `raw` keeps the model's JSON payload untouched; the step callback hands it
/// downstream where the summary is built best-effort, since the payload shape
/// is model-controlled.
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: AgentAction,
    pub reasoning: String,
    pub is_complete: bool,
    pub next_goal: Option<String>,
    pub result: Option<Value>,
    pub raw: Value,
}

/// Chat message for the model loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// DOM element info for model context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomElement {
    /// Tag name
    pub tag: String,
    /// CSS selector
    pub selector: String,
    /// Visible text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Input type (for inputs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    /// Placeholder text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// aria-label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    /// Is element visible
    pub visible: bool,
    /// Is element clickable
    pub clickable: bool,
}

/// Simplified page snapshot handed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomContext {
    /// Current URL
    pub url: String,
    /// Page title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Interactive elements
    pub elements: Vec<DomElement>,
}
