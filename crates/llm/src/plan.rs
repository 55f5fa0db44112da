//! Action-plan validation.
//!
//! Planner output is untrusted input: action names are checked against the
//! closed vocabulary, params against the per-action allow-list, and every
//! value is normalized under hard caps. Nothing outside the allow-lists
//! survives to an agent.

use serde_json::Value;

use oc_domain::action::{ActionName, AgentName};
use oc_domain::JsonMap;

pub const MAX_PLAN_ACTIONS: usize = 5;
pub const PLAN_CONFIDENCE_FLOOR: f64 = 0.55;

const MAX_STRING_LEN: usize = 300;
const MAX_LIST_LEN: usize = 8;
const MAX_NESTED_KEYS: usize = 12;
const MAX_KEY_LEN: usize = 80;
const MAX_VALUE_DEPTH: u32 = 3;

const GENERIC_CLARIFICATION: &str =
    "Could you share a bit more detail so I can do that safely?";

/// One validated planner action.
#[derive(Debug, Clone)]
pub struct PlanAction {
    pub name: ActionName,
    pub target_agent: AgentName,
    pub params: JsonMap,
}

/// A validated plan. `needs_clarification` plans carry zero actions and a
/// non-empty question.
#[derive(Debug, Clone)]
pub struct ActionPlan {
    pub actions: Vec<PlanAction>,
    pub confidence: f64,
    pub needs_clarification: bool,
    pub clarification_question: String,
}

/// Validate raw planner JSON into an [`ActionPlan`].
///
/// Returns `None` when the payload is unusable: no actions survive
/// filtering and no clarification was requested, or confidence falls
/// below `min_confidence`.
pub fn validate_plan(raw: &Value, min_confidence: f64) -> Option<ActionPlan> {
    let object = raw.as_object()?;

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let needs_clarification = object
        .get("needsClarification")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if needs_clarification {
        let question = object
            .get("clarificationQuestion")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(GENERIC_CLARIFICATION);
        return Some(ActionPlan {
            actions: Vec::new(),
            confidence,
            needs_clarification: true,
            clarification_question: truncate(question),
        });
    }

    let mut actions = Vec::new();
    if let Some(raw_actions) = object.get("actions").and_then(Value::as_array) {
        for raw_action in raw_actions {
            if let Some(action) = validate_action(raw_action) {
                actions.push(action);
            }
            if actions.len() >= MAX_PLAN_ACTIONS {
                break;
            }
        }
    }

    if actions.is_empty() || confidence < min_confidence {
        return None;
    }

    Some(ActionPlan {
        actions,
        confidence,
        needs_clarification: false,
        clarification_question: String::new(),
    })
}

fn validate_action(raw: &Value) -> Option<PlanAction> {
    let object = raw.as_object()?;
    let name = ActionName::parse(object.get("name")?.as_str()?)?;

    // The planner may route to any real agent; anything else (including
    // "orchestrator", which owns no actions) falls back to the action's
    // canonical owner.
    let target_agent = object
        .get("targetAgent")
        .and_then(Value::as_str)
        .and_then(AgentName::parse)
        .filter(|agent| *agent != AgentName::Orchestrator)
        .unwrap_or_else(|| name.canonical_target());

    let allowed = name.allowed_params();
    let mut params = JsonMap::new();
    if let Some(raw_params) = object.get("params").and_then(Value::as_object) {
        for (key, value) in raw_params {
            if !allowed.contains(&key.as_str()) {
                continue;
            }
            if let Some(normalized) = normalize_value(value, 0) {
                params.insert(key.clone(), normalized);
            }
        }
    }

    Some(PlanAction {
        name,
        target_agent,
        params,
    })
}

/// Normalize one untrusted value: scalars pass through (strings truncated
/// to 300 chars), lists cap at 8 elements, objects cap at 12 keys of ≤80
/// chars, depth bounded.
fn normalize_value(value: &Value, depth: u32) -> Option<Value> {
    if depth > MAX_VALUE_DEPTH {
        return None;
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => Some(value.clone()),
        Value::String(s) => Some(Value::String(truncate(s))),
        Value::Array(items) => {
            let normalized: Vec<Value> = items
                .iter()
                .take(MAX_LIST_LEN)
                .filter_map(|item| normalize_value(item, depth + 1))
                .collect();
            Some(Value::Array(normalized))
        }
        Value::Object(map) => {
            let mut normalized = JsonMap::new();
            for (key, item) in map {
                if normalized.len() >= MAX_NESTED_KEYS {
                    break;
                }
                if key.chars().count() > MAX_KEY_LEN {
                    continue;
                }
                if let Some(item) = normalize_value(item, depth + 1) {
                    normalized.insert(key.clone(), item);
                }
            }
            Some(Value::Object(normalized))
        }
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_STRING_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_action_names_are_dropped() {
        let raw = json!({
            "actions": [
                {"name": "drop_database", "params": {}},
                {"name": "get_cart", "params": {}},
            ],
            "confidence": 0.9,
            "needsClarification": false,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].name, ActionName::GetCart);
    }

    #[test]
    fn params_outside_allow_list_are_dropped() {
        let raw = json!({
            "actions": [{
                "name": "search_products",
                "targetAgent": "product",
                "params": {
                    "query": "running shoes",
                    "maxPrice": 150,
                    "__proto__": "evil",
                    "sqlInjection": "drop table"
                }
            }],
            "confidence": 0.8,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        let params = &plan.actions[0].params;
        assert_eq!(params.len(), 2);
        assert!(params.contains_key("query"));
        assert!(params.contains_key("maxPrice"));
    }

    #[test]
    fn allow_list_closure_over_adversarial_payload() {
        // Every action in a hostile plan must end up with only legal keys.
        let raw = json!({
            "actions": [
                {"name": "add_item", "params": {"productId": "prod_1", "rm": "-rf", "variantId": "var_1"}},
                {"name": "apply_discount", "params": {"code": "SAVE20", "amountOverride": 9999}},
                {"name": "cancel_order", "params": {"orderId": "order_1", "force": true}},
            ],
            "confidence": 0.99,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        for action in &plan.actions {
            let allowed = action.name.allowed_params();
            for key in action.params.keys() {
                assert!(allowed.contains(&key.as_str()), "illegal key {key}");
            }
        }
    }

    #[test]
    fn strings_truncated_to_300_chars() {
        let long = "x".repeat(1000);
        let raw = json!({
            "actions": [{"name": "search_products", "params": {"query": long}}],
            "confidence": 0.8,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert_eq!(
            plan.actions[0].params["query"].as_str().unwrap().len(),
            300
        );
    }

    #[test]
    fn lists_capped_at_eight() {
        let items: Vec<_> = (0..20).map(|i| json!({"query": format!("item {i}")})).collect();
        let raw = json!({
            "actions": [{"name": "add_multiple_items", "params": {"items": items}}],
            "confidence": 0.8,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert_eq!(
            plan.actions[0].params["items"].as_array().unwrap().len(),
            8
        );
    }

    #[test]
    fn nested_objects_capped_at_twelve_short_keys() {
        let mut nested = serde_json::Map::new();
        for i in 0..30 {
            nested.insert(format!("key{i}"), json!(i));
        }
        nested.insert("k".repeat(200), json!("too long"));
        let raw = json!({
            "actions": [{"name": "save_preference", "params": {"updates": nested}}],
            "confidence": 0.8,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        let updates = plan.actions[0].params["updates"].as_object().unwrap();
        assert!(updates.len() <= 12);
        assert!(updates.keys().all(|k| k.chars().count() <= 80));
    }

    #[test]
    fn plan_capped_at_five_actions() {
        let actions: Vec<_> = (0..9).map(|_| json!({"name": "get_cart", "params": {}})).collect();
        let raw = json!({"actions": actions, "confidence": 0.9});
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert_eq!(plan.actions.len(), MAX_PLAN_ACTIONS);
    }

    #[test]
    fn clarification_returns_zero_actions_and_question() {
        let raw = json!({
            "actions": [{"name": "add_item", "params": {}}],
            "confidence": 0.4,
            "needsClarification": true,
            "clarificationQuestion": "Which size?"
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert!(plan.needs_clarification);
        assert!(plan.actions.is_empty());
        assert_eq!(plan.clarification_question, "Which size?");
    }

    #[test]
    fn blank_clarification_question_gets_generic_fallback() {
        let raw = json!({"needsClarification": true, "clarificationQuestion": "  "});
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert!(!plan.clarification_question.is_empty());
    }

    #[test]
    fn low_confidence_plan_is_rejected() {
        let raw = json!({
            "actions": [{"name": "get_cart", "params": {}}],
            "confidence": 0.3,
        });
        assert!(validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).is_none());
    }

    #[test]
    fn empty_plan_is_rejected() {
        let raw = json!({"actions": [], "confidence": 0.9});
        assert!(validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).is_none());
    }

    #[test]
    fn orchestrator_target_falls_back_to_canonical() {
        let raw = json!({
            "actions": [{"name": "get_cart", "targetAgent": "orchestrator", "params": {}}],
            "confidence": 0.9,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert_eq!(plan.actions[0].target_agent, AgentName::Cart);
    }

    #[test]
    fn unknown_target_falls_back_to_canonical() {
        let raw = json!({
            "actions": [{"name": "search_products", "targetAgent": "warehouse", "params": {}}],
            "confidence": 0.9,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert_eq!(plan.actions[0].target_agent, AgentName::Product);
    }

    #[test]
    fn explicit_target_is_honored() {
        let raw = json!({
            "actions": [{"name": "create_ticket", "targetAgent": "support", "params": {"query": "help"}}],
            "confidence": 0.9,
        });
        let plan = validate_plan(&raw, PLAN_CONFIDENCE_FLOOR).unwrap();
        assert_eq!(plan.actions[0].target_agent, AgentName::Support);
    }
}
