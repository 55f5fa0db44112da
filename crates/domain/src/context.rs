//! Per-request execution context handed to agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commerce::{Cart, MemorySnapshot, Preferences, SessionRecord};

/// One persisted conversational turn: what the shopper said, how it was
/// classified, and the transport payload that went back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub message: String,
    pub intent: String,
    pub agent: String,
    pub response: Value,
    pub timestamp: DateTime<Utc>,
}

/// Everything an agent may read while executing one action. Immutable for
/// the duration of a single request.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: String,
    pub user_id: Option<String>,
    pub channel: String,
    pub session: SessionRecord,
    pub cart: Option<Cart>,
    pub preferences: Option<Preferences>,
    pub memory: Option<MemorySnapshot>,
    /// Most recent last.
    pub recent_messages: Vec<InteractionRecord>,
}
