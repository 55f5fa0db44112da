//! Memory agent: shows, saves, forgets, and clears shopper preferences.

use serde_json::{json, Value};
use std::sync::Arc;

use oc_commerce::MemoryService;
use oc_domain::action::{ActionName, AgentAction, AgentName};
use oc_domain::context::AgentContext;
use oc_domain::response::{AgentExecutionResult, SuggestedAction};
use oc_domain::JsonMap;

use crate::params::str_param;
use crate::Agent;

pub struct MemoryAgent {
    memory: Arc<MemoryService>,
}

impl MemoryAgent {
    pub fn new(memory: Arc<MemoryService>) -> Self {
        Self { memory }
    }

    fn require_user(context: &AgentContext) -> Result<&str, AgentExecutionResult> {
        match context.user_id.as_deref() {
            Some(user_id) => Ok(user_id),
            None => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("AUTH_REQUIRED"));
                Err(AgentExecutionResult::failure(
                    "Sign in and I'll remember your preferences across visits.",
                    data,
                ))
            }
        }
    }

    fn show_memory(&self, context: &AgentContext) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        let (preferences, highlights, recent) = self.memory.summarize_memory(user_id);
        let mut data = JsonMap::new();
        data.insert("preferences".into(), json!(preferences));
        data.insert("highlights".into(), json!(highlights));
        data.insert("recentInteractions".into(), json!(recent));
        AgentExecutionResult::ok(highlights.join(" "), data).with_next_actions(vec![
            SuggestedAction::new("Clear memory", "clear memory"),
            SuggestedAction::new("Search products", "search:running shoes"),
        ])
    }

    fn save_preference(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        let Some(updates) = params.get("updates").and_then(Value::as_object) else {
            return AgentExecutionResult::failure(
                "Tell me what to remember, for example: remember my size is M.",
                JsonMap::new(),
            );
        };
        let preferences = self.memory.save_preference_updates(user_id, updates);
        let mut data = JsonMap::new();
        data.insert("preferences".into(), json!(preferences));
        AgentExecutionResult::ok("Saved. I'll use that preference from now on.", data)
    }

    fn forget_preference(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        let key = str_param(params, "key");
        let value = str_param(params, "value");
        if key.is_empty() && value.is_empty() {
            return AgentExecutionResult::failure(
                "Tell me which preference to forget, for example: forget my size.",
                JsonMap::new(),
            );
        }
        let preferences = self.memory.forget_preference(
            user_id,
            if key.is_empty() { None } else { Some(&key) },
            if value.is_empty() { None } else { Some(&value) },
        );
        let mut data = JsonMap::new();
        data.insert("preferences".into(), json!(preferences));
        AgentExecutionResult::ok("Done, I've forgotten that.", data)
    }

    fn clear_memory(&self, context: &AgentContext) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        self.memory.clear_memory(user_id);
        AgentExecutionResult::ok(
            "I've cleared everything I remembered about you.",
            JsonMap::new(),
        )
    }
}

impl Agent for MemoryAgent {
    fn name(&self) -> AgentName {
        AgentName::Memory
    }

    fn execute(&self, action: &AgentAction, context: &AgentContext) -> AgentExecutionResult {
        match action.name {
            ActionName::ShowMemory => self.show_memory(context),
            ActionName::SavePreference => self.save_preference(&action.params, context),
            ActionName::ForgetPreference => self.forget_preference(&action.params, context),
            ActionName::ClearMemory => self.clear_memory(context),
            other => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("UNSUPPORTED_ACTION"));
                AgentExecutionResult::failure(
                    format!("The memory agent can't handle {other}."),
                    data,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oc_domain::commerce::{ConversationState, SessionRecord};
    use oc_store::Store;

    fn agent() -> MemoryAgent {
        MemoryAgent::new(Arc::new(MemoryService::new(Arc::new(Store::new()))))
    }

    fn context(user_id: Option<&str>) -> AgentContext {
        let now = Utc::now();
        AgentContext {
            session_id: "sess-1".into(),
            user_id: user_id.map(str::to_owned),
            channel: "web".into(),
            session: SessionRecord {
                session_id: "sess-1".into(),
                user_id: user_id.map(str::to_owned),
                channel: "web".into(),
                conversation: ConversationState::default(),
                created_at: now,
                last_activity: now,
            },
            cart: None,
            preferences: None,
            memory: None,
            recent_messages: vec![],
        }
    }

    fn run(agent: &MemoryAgent, ctx: &AgentContext, name: ActionName, params: Value) -> AgentExecutionResult {
        agent.execute(
            &AgentAction::new(name, params.as_object().cloned().unwrap_or_default()),
            ctx,
        )
    }

    #[test]
    fn guest_cannot_use_memory() {
        let agent = agent();
        let result = run(&agent, &context(None), ActionName::ShowMemory, json!({}));
        assert!(!result.success);
        assert_eq!(result.data["code"], "AUTH_REQUIRED");
    }

    #[test]
    fn save_then_show_round_trips() {
        let agent = agent();
        let ctx = context(Some("user_1"));
        let result = run(
            &agent,
            &ctx,
            ActionName::SavePreference,
            json!({"updates": {"size": "M", "categories": ["shoes"]}}),
        );
        assert!(result.success);
        let shown = run(&agent, &ctx, ActionName::ShowMemory, json!({}));
        assert!(shown.message.contains("Saved size: M"));
        assert!(shown.message.contains("shoes"));
    }

    #[test]
    fn forget_key_then_show_is_empty() {
        let agent = agent();
        let ctx = context(Some("user_1"));
        run(
            &agent,
            &ctx,
            ActionName::SavePreference,
            json!({"updates": {"size": "M"}}),
        );
        run(&agent, &ctx, ActionName::ForgetPreference, json!({"key": "size"}));
        let shown = run(&agent, &ctx, ActionName::ShowMemory, json!({}));
        assert!(shown.message.contains("No explicit preferences"));
    }

    #[test]
    fn forget_without_target_asks_for_one() {
        let agent = agent();
        let result = run(
            &agent,
            &context(Some("user_1")),
            ActionName::ForgetPreference,
            json!({}),
        );
        assert!(!result.success);
    }

    #[test]
    fn clear_memory_resets_everything() {
        let agent = agent();
        let ctx = context(Some("user_1"));
        run(
            &agent,
            &ctx,
            ActionName::SavePreference,
            json!({"updates": {"size": "M"}}),
        );
        run(&agent, &ctx, ActionName::ClearMemory, json!({}));
        let shown = run(&agent, &ctx, ActionName::ShowMemory, json!({}));
        assert!(shown.message.contains("No explicit preferences"));
    }
}
