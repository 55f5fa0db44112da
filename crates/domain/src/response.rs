//! Agent execution results and the wire-facing response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::JsonMap;

/// A follow-up the UI can offer the shopper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub label: String,
    pub action: String,
}

impl SuggestedAction {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// What one agent produced for one action.
///
/// Business failures come back as `success: false` with a `data.code`
/// (e.g. `CLARIFICATION_REQUIRED`); agents never surface errors for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: JsonMap,
    #[serde(default)]
    pub next_actions: Vec<SuggestedAction>,
}

impl AgentExecutionResult {
    pub fn ok(message: impl Into<String>, data: JsonMap) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            next_actions: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>, data: JsonMap) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
            next_actions: Vec::new(),
        }
    }

    pub fn with_next_actions(mut self, next_actions: Vec<SuggestedAction>) -> Self {
        self.next_actions = next_actions;
        self
    }

    /// Shorthand for a clarification result: `success=false` with
    /// `data.code = "CLARIFICATION_REQUIRED"` and the given options.
    pub fn clarification(question: impl Into<String>, options: Vec<Value>) -> Self {
        let mut data = JsonMap::new();
        data.insert("code".into(), Value::String("CLARIFICATION_REQUIRED".into()));
        data.insert("options".into(), Value::Array(options));
        Self::failure(question, data)
    }
}

/// The aggregated response before transport shaping: message, owning
/// agent, merged data, suggestions, and execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub message: String,
    pub agent: String,
    pub success: bool,
    #[serde(default)]
    pub data: JsonMap,
    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,
    #[serde(default)]
    pub metadata: JsonMap,
}

impl AgentResponse {
    /// Shape the camelCase transport payload consumed by HTTP and WS.
    pub fn to_transport(&self) -> Value {
        serde_json::json!({
            "message": self.message,
            "agent": self.agent,
            "success": self.success,
            "data": self.data,
            "suggestedActions": self.suggested_actions,
            "metadata": self.metadata,
        })
    }
}
