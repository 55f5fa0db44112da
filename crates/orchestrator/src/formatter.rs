//! Shapes one agent execution result into the response envelope.

use oc_domain::intent::IntentResult;
use oc_domain::response::{AgentExecutionResult, AgentResponse};
use oc_domain::JsonMap;

pub fn format_response(
    result: AgentExecutionResult,
    intent: &IntentResult,
    agent_name: &str,
) -> AgentResponse {
    let mut metadata = JsonMap::new();
    metadata.insert("intent".into(), serde_json::json!(intent.name.as_str()));
    metadata.insert(
        "intentConfidence".into(),
        serde_json::json!(intent.confidence),
    );

    AgentResponse {
        message: result.message,
        agent: agent_name.to_owned(),
        success: result.success,
        data: result.data,
        suggested_actions: result.next_actions,
        metadata,
    }
}
