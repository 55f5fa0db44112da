//! Orchestrator core: the single entry point that turns one utterance
//! into agent executions and a transport payload.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use oc_agents::AgentRegistry;
use oc_commerce::{InteractionService, MemoryService, SessionService};
use oc_domain::action::{AgentAction, AgentName};
use oc_domain::config::Config;
use oc_domain::context::{AgentContext, InteractionRecord};
use oc_domain::intent::IntentResult;
use oc_domain::response::{AgentExecutionResult, SuggestedAction};
use oc_domain::JsonMap;
use oc_llm::{ActionPlan, LanguagePlanner, RecentTurn};

use crate::classifier::{IntentClassifier, RecentContext, RecentTurnSummary};
use crate::context::ContextBuilder;
use crate::extractor::extract_actions;
use crate::formatter::format_response;
use crate::router::route_intent;

const RECENT_LIMIT: usize = 12;
const MAX_SUGGESTED_ACTIONS: usize = 6;

/// Everything the orchestrator needs, wired at the composition root.
pub struct OrchestratorDeps {
    pub config: Config,
    pub classifier: IntentClassifier,
    pub context_builder: ContextBuilder,
    pub interactions: Arc<InteractionService>,
    pub sessions: Arc<SessionService>,
    pub memory: Arc<MemoryService>,
    pub agents: AgentRegistry,
    pub planner: Option<Arc<dyn LanguagePlanner>>,
}

pub struct Orchestrator {
    deps: OrchestratorDeps,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self { deps }
    }

    /// Process one shopper message end to end and return the transport
    /// payload. Never fails for LLM trouble; the worst case is the
    /// deterministic path.
    pub async fn process_message(
        &self,
        message: &str,
        session_id: &str,
        user_id: Option<&str>,
        channel: &str,
    ) -> Value {
        let mut recent = self.deps.interactions.recent(session_id, RECENT_LIMIT);
        if recent.is_empty() {
            if let Some(user_id) = user_id {
                recent = self.recent_from_memory(user_id, RECENT_LIMIT);
            }
        }

        let decision_policy = self.decision_policy();
        let planner_enabled_for_request = self.planner_enabled_for_request(user_id, session_id);
        let allow_classifier_llm = decision_policy == "classifier_first" && !planner_enabled_for_request;

        let recent_context = RecentContext {
            recent: recent
                .iter()
                .map(|record| RecentTurnSummary {
                    intent: record.intent.clone(),
                    agent: record.agent.clone(),
                    message: record.message.clone(),
                })
                .collect(),
        };
        let intent = self
            .deps
            .classifier
            .classify(message, Some(&recent_context), allow_classifier_llm)
            .await;

        let context =
            self.deps
                .context_builder
                .build(session_id, user_id, channel, recent.clone());

        let mut actions = extract_actions(&intent);
        let mut route_agent = route_intent(intent.name);

        let planner_attempted = planner_enabled_for_request
            && (decision_policy == "planner_first" || actions.len() > 1);
        let plan = if planner_attempted {
            self.build_action_plan(message, &recent, &intent).await
        } else {
            None
        };

        let action_limit = self.max_actions_per_request();
        let mut truncated_action_count = apply_action_limit(&mut actions, action_limit);
        let mut planner_used = false;
        let mut planner_steps: Vec<Value> = Vec::new();

        let (result, agent_name) = match &plan {
            Some(plan) if plan.needs_clarification => {
                planner_used = true;
                planner_steps.push(json!({
                    "index": 1,
                    "action": "clarification",
                    "targetAgent": "orchestrator",
                    "success": false,
                    "message": plan.clarification_question,
                }));
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("CLARIFICATION_REQUIRED"));
                (
                    AgentExecutionResult::failure(plan.clarification_question.clone(), data),
                    AgentName::Orchestrator.as_str().to_owned(),
                )
            }
            _ => {
                if let Some(plan) = &plan {
                    if !plan.actions.is_empty() {
                        let mut plan_actions: Vec<AgentAction> = plan
                            .actions
                            .iter()
                            .map(|action| AgentAction {
                                name: action.name,
                                params: action.params.clone(),
                                target_agent: Some(action.target_agent),
                            })
                            .collect();
                        truncated_action_count =
                            apply_action_limit(&mut plan_actions, action_limit);
                        if let Some(first) = plan_actions.first() {
                            route_agent = first.target_agent.unwrap_or(route_agent);
                        }
                        actions = plan_actions;
                        planner_used = true;
                    }
                }

                if planner_used && !actions.is_empty() {
                    let (result, agent, steps) =
                        self.execute_planned_actions(route_agent, &actions, &context);
                    planner_steps = steps;
                    (result, agent)
                } else if actions.len() == 1 {
                    let action = &actions[0];
                    let agent_name = action.target_agent.unwrap_or(route_agent);
                    (
                        self.execute_on_agent(agent_name, action, &context),
                        agent_name.as_str().to_owned(),
                    )
                } else {
                    self.execute_multi_action(route_agent, &actions, &context, &intent)
                        .await
                }
            }
        };

        let mut response = format_response(result, &intent, &agent_name);
        response.metadata.insert(
            "executionPolicy".into(),
            json!({
                "decisionPolicy": decision_policy,
                "plannerEnabled": planner_enabled_for_request,
                "plannerAttempted": planner_attempted,
                "mode": self.planner_execution_mode(),
                "maxActions": action_limit,
                "truncatedActionCount": truncated_action_count,
            }),
        );
        if let Some(plan) = &plan {
            response.metadata.insert(
                "planner".into(),
                json!({
                    "used": planner_used,
                    "confidence": plan.confidence,
                    "needsClarification": plan.needs_clarification,
                    "actionCount": plan.actions.len(),
                    "executionMode": self.planner_execution_mode(),
                    "stepCount": planner_steps.len(),
                    "steps": planner_steps,
                }),
            );
        } else if planner_attempted {
            response.metadata.insert(
                "planner".into(),
                json!({
                    "used": false,
                    "confidence": 0.0,
                    "needsClarification": false,
                    "actionCount": 0,
                    "executionMode": self.planner_execution_mode(),
                    "stepCount": 0,
                    "steps": [],
                }),
            );
        }

        let payload = response.to_transport();

        self.deps.interactions.record(
            session_id,
            user_id,
            message,
            intent.name.as_str(),
            &agent_name,
            payload.clone(),
        );
        self.deps.sessions.update_conversation(
            session_id,
            intent.name.as_str(),
            &agent_name,
            message,
            intent.entities.clone(),
        );

        // Fire-and-forget memory write-back.
        let memory = self.deps.memory.clone();
        let user_id_owned = user_id.map(str::to_owned);
        let intent_name = intent.name.as_str().to_owned();
        let message_owned = message.to_owned();
        let payload_clone = payload.clone();
        tokio::spawn(async move {
            memory.record_interaction(
                user_id_owned.as_deref(),
                &intent_name,
                &message_owned,
                &payload_clone,
            );
        });

        payload
    }

    // ── Policy ────────────────────────────────────────────────────

    fn decision_policy(&self) -> &str {
        match self.deps.config.llm_decision_policy.as_str() {
            policy @ ("planner_first" | "classifier_first") => policy,
            _ => "planner_first",
        }
    }

    fn planner_execution_mode(&self) -> &str {
        match self.deps.config.llm_planner_execution_mode.as_str() {
            "strict" | "atomic" => "atomic",
            _ => "partial",
        }
    }

    /// Deterministic canary bucketing: a pure function of
    /// `(user|anonymous, session, percent)`.
    pub fn planner_enabled_for_request(&self, user_id: Option<&str>, session_id: &str) -> bool {
        if self.deps.planner.is_none() {
            return false;
        }
        let config = &self.deps.config;
        if !config.planner_feature_enabled || !config.llm_planner_enabled {
            return false;
        }
        let percent = config.planner_canary_percent;
        if percent <= 0 {
            return false;
        }
        if percent >= 100 {
            return true;
        }
        canary_bucket(user_id, session_id) < percent as u32
    }

    fn max_actions_per_request(&self) -> usize {
        (self.deps.config.orchestrator_max_actions_per_request as usize).clamp(1, 10)
    }

    async fn build_action_plan(
        &self,
        message: &str,
        recent: &[InteractionRecord],
        intent: &IntentResult,
    ) -> Option<ActionPlan> {
        let planner = self.deps.planner.as_ref()?;
        let turns: Vec<RecentTurn> = recent
            .iter()
            .map(|record| RecentTurn {
                message: record.message.clone(),
                intent: record.intent.clone(),
                agent: record.agent.clone(),
            })
            .collect();
        planner.plan_actions(message, &turns, intent.name).await
    }

    // ── Execution ─────────────────────────────────────────────────

    fn execute_on_agent(
        &self,
        agent_name: AgentName,
        action: &AgentAction,
        context: &AgentContext,
    ) -> AgentExecutionResult {
        match self.deps.agents.get(agent_name) {
            Some(agent) => agent.execute(action, context),
            None => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("AGENT_UNAVAILABLE"));
                AgentExecutionResult::failure(
                    format!("No agent is registered for {agent_name}."),
                    data,
                )
            }
        }
    }

    /// Sequential planner-driven execution with per-step records.
    /// Atomic mode stops at the first failure and marks the rest
    /// `SKIPPED_ATOMIC_MODE`; partial mode runs everything and flags
    /// `data.partialFailure`.
    fn execute_planned_actions(
        &self,
        route_agent: AgentName,
        actions: &[AgentAction],
        context: &AgentContext,
    ) -> (AgentExecutionResult, String, Vec<Value>) {
        let atomic = self.planner_execution_mode() == "atomic";
        let mut combined_data = JsonMap::new();
        let mut messages: Vec<String> = Vec::new();
        let mut suggested: Vec<SuggestedAction> = Vec::new();
        let mut steps: Vec<Value> = Vec::new();
        let mut any_success = false;
        let mut all_success = true;

        for (index, action) in actions.iter().enumerate() {
            let agent_name = action.target_agent.unwrap_or(route_agent);
            let result = self.execute_on_agent(agent_name, action, context);

            merge_agent_data(&mut combined_data, agent_name.as_str(), result.data.clone());
            messages.push(result.message.clone());
            suggested.extend(result.next_actions.clone());
            any_success = any_success || result.success;
            all_success = all_success && result.success;

            let error = if result.success {
                Value::Null
            } else {
                let code = result
                    .data
                    .get("code")
                    .and_then(Value::as_str)
                    .filter(|code| !code.trim().is_empty())
                    .unwrap_or("ACTION_FAILED");
                json!({"code": code, "message": result.message})
            };
            steps.push(json!({
                "index": index + 1,
                "action": action.name.as_str(),
                "targetAgent": agent_name.as_str(),
                "success": result.success,
                "message": result.message,
                "error": error,
            }));

            if atomic && !result.success {
                for (skipped_index, skipped) in actions.iter().enumerate().skip(index + 1) {
                    let target = skipped.target_agent.unwrap_or(route_agent);
                    steps.push(json!({
                        "index": skipped_index + 1,
                        "action": skipped.name.as_str(),
                        "targetAgent": target.as_str(),
                        "success": false,
                        "message": "Skipped due to previous failure in atomic mode.",
                        "error": {
                            "code": "SKIPPED_ATOMIC_MODE",
                            "message": "Skipped due to previous failure in atomic mode.",
                        },
                    }));
                }
                break;
            }
        }

        let overall_success = if atomic { all_success } else { any_success };
        if messages.is_empty() {
            messages.push("I couldn't execute the requested action plan.".into());
        }
        if !all_success && !atomic {
            combined_data.insert("partialFailure".into(), json!(true));
        }

        suggested.truncate(MAX_SUGGESTED_ACTIONS);
        (
            AgentExecutionResult {
                success: overall_success,
                message: messages.join(" "),
                data: combined_data,
                next_actions: suggested,
            },
            AgentName::Orchestrator.as_str().to_owned(),
            steps,
        )
    }

    /// Non-planner multi-action execution: search-and-add runs as a
    /// back-filling sequence, atomic mode runs serially with fail-fast,
    /// anything else fans out in parallel.
    async fn execute_multi_action(
        &self,
        route_agent: AgentName,
        actions: &[AgentAction],
        context: &AgentContext,
        intent: &IntentResult,
    ) -> (AgentExecutionResult, String) {
        if intent.name == oc_domain::intent::SupportedIntent::SearchAndAddToCart {
            return self.execute_search_add_sequence(route_agent, actions, context);
        }

        let atomic = self.planner_execution_mode() == "atomic";
        let mut combined_data = JsonMap::new();
        let mut messages: Vec<String> = Vec::new();
        let mut suggested: Vec<SuggestedAction> = Vec::new();
        let mut success = true;

        if atomic {
            for action in actions {
                let agent_name = action.target_agent.unwrap_or(route_agent);
                let result = self.execute_on_agent(agent_name, action, context);
                combined_data.insert(agent_name.as_str().into(), Value::Object(result.data));
                messages.push(result.message);
                suggested.extend(result.next_actions);
                success = success && result.success;
                if !success {
                    break;
                }
            }
        } else {
            // Parallel fan-out, one future per action (≤ the action cap).
            let futures = actions.iter().map(|action| {
                let agent_name = action.target_agent.unwrap_or(route_agent);
                async move { (agent_name, self.execute_on_agent(agent_name, action, context)) }
            });
            let pairs = futures_util::future::join_all(futures).await;
            for (agent_name, result) in pairs {
                combined_data.insert(agent_name.as_str().into(), Value::Object(result.data));
                messages.push(result.message);
                suggested.extend(result.next_actions);
                success = success && result.success;
            }
        }

        suggested.truncate(MAX_SUGGESTED_ACTIONS);
        (
            AgentExecutionResult {
                success,
                message: messages.join(" "),
                data: combined_data,
                next_actions: suggested,
            },
            AgentName::Orchestrator.as_str().to_owned(),
        )
    }

    /// Sequential search-then-add: after each product search, the first
    /// result's first variant back-fills the following add when the
    /// planner or utterance named none.
    fn execute_search_add_sequence(
        &self,
        route_agent: AgentName,
        actions: &[AgentAction],
        context: &AgentContext,
    ) -> (AgentExecutionResult, String) {
        let mut combined_data = JsonMap::new();
        let mut messages: Vec<String> = Vec::new();
        let mut suggested: Vec<SuggestedAction> = Vec::new();
        let mut success = true;
        let mut previous_result: Option<AgentExecutionResult> = None;

        for action in actions {
            let mut effective = action.clone();
            if action.name == oc_domain::action::ActionName::AddItem {
                if let Some((product_id, variant_id)) =
                    infer_product_selection(previous_result.as_ref())
                {
                    if !effective.params.contains_key("productId")
                        || effective.params["productId"].is_null()
                    {
                        effective
                            .params
                            .insert("productId".into(), json!(product_id));
                    }
                    if !effective.params.contains_key("variantId")
                        || effective.params["variantId"].is_null()
                    {
                        effective
                            .params
                            .insert("variantId".into(), json!(variant_id));
                    }
                }
                if !effective.params.contains_key("quantity")
                    || effective.params["quantity"].is_null()
                {
                    effective.params.insert("quantity".into(), json!(1));
                }
            }

            let agent_name = effective.target_agent.unwrap_or(route_agent);
            let result = self.execute_on_agent(agent_name, &effective, context);
            previous_result = Some(result.clone());

            combined_data.insert(agent_name.as_str().into(), Value::Object(result.data));
            messages.push(result.message);
            suggested.extend(result.next_actions);
            success = success && result.success;
        }

        suggested.truncate(MAX_SUGGESTED_ACTIONS);
        (
            AgentExecutionResult {
                success,
                message: messages.join(" "),
                data: combined_data,
                next_actions: suggested,
            },
            AgentName::Orchestrator.as_str().to_owned(),
        )
    }

    /// When a session has no transcript yet, rebuild `recent` from the
    /// user's long-term memory history.
    fn recent_from_memory(&self, user_id: &str, limit: usize) -> Vec<InteractionRecord> {
        let history = self.deps.memory.get_history(user_id, limit);
        let mut recovered = Vec::new();
        for row in history {
            let query = row.summary.query.trim().to_owned();
            let response_text = row.summary.response.trim().to_owned();
            if query.is_empty() && response_text.is_empty() {
                continue;
            }
            recovered.push(InteractionRecord {
                id: format!("memory_{}", recovered.len() + 1),
                session_id: "memory".into(),
                user_id: Some(user_id.to_owned()),
                message: query,
                intent: row.kind.clone(),
                agent: "memory".into(),
                response: json!({"message": response_text, "agent": "memory"}),
                timestamp: row.timestamp,
            });
        }
        if recovered.len() > limit {
            recovered.split_off(recovered.len() - limit)
        } else {
            recovered
        }
    }
}

// ── Free helpers ────────────────────────────────────────────────────

/// Truncate in place; returns how many actions fell off.
fn apply_action_limit(actions: &mut Vec<AgentAction>, limit: usize) -> usize {
    if actions.len() <= limit {
        return 0;
    }
    let dropped = actions.len() - limit;
    actions.truncate(limit);
    dropped
}

/// First 8 hex chars of `sha256("{user|anonymous}:{session}")` mod 100.
pub fn canary_bucket(user_id: Option<&str>, session_id: &str) -> u32 {
    let seed = format!("{}:{}", user_id.unwrap_or("anonymous"), session_id);
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    u32::from_str_radix(&digest[..8], 16).unwrap_or(0) % 100
}

/// Merge one agent's data under its name; repeated agents collect into
/// an array.
fn merge_agent_data(combined: &mut JsonMap, agent_name: &str, data: JsonMap) {
    match combined.entry(agent_name.to_owned()) {
        serde_json::map::Entry::Occupied(mut occupied) => {
            let existing = occupied.get_mut();
            if let Value::Array(items) = existing {
                items.push(Value::Object(data));
            } else {
                let prior = existing.take();
                *existing = Value::Array(vec![prior, Value::Object(data)]);
            }
        }
        serde_json::map::Entry::Vacant(vacant) => {
            vacant.insert(Value::Object(data));
        }
    }
}

fn infer_product_selection(result: Option<&AgentExecutionResult>) -> Option<(String, String)> {
    let result = result?;
    let products = result.data.get("products")?.as_array()?;
    let first = products.first()?.as_object()?;
    let product_id = first.get("id")?.as_str()?.trim();
    let variant_id = first
        .get("variants")?
        .as_array()?
        .first()?
        .as_object()?
        .get("id")?
        .as_str()?
        .trim();
    if product_id.is_empty() || variant_id.is_empty() {
        return None;
    }
    Some((product_id.to_owned(), variant_id.to_owned()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oc_agents::{Agent, CartAgent, MemoryAgent, OrderAgent, ProductAgent, SupportAgent};
    use oc_commerce::{
        CartService, NotificationService, OrderService, ProductService, SupportService,
    };
    use oc_domain::commerce::{Product, Variant};
    use oc_domain::intent::SupportedIntent;
    use oc_llm::{IntentPrediction, PlanAction};
    use oc_store::Store;

    /// Planner stub returning a fixed plan.
    struct FixedPlanner {
        plan: Option<ActionPlan>,
    }

    #[async_trait]
    impl LanguagePlanner for FixedPlanner {
        async fn classify_intent(
            &self,
            _message: &str,
            _recent: &[RecentTurn],
        ) -> Option<IntentPrediction> {
            None
        }

        async fn plan_actions(
            &self,
            _message: &str,
            _recent: &[RecentTurn],
            _inferred_intent: SupportedIntent,
        ) -> Option<ActionPlan> {
            self.plan.clone()
        }
    }

    fn seed_catalog(store: &Arc<Store>) {
        let catalog = [
            ("prod_1", "Trail Runner X", "shoes", "StrideForge", 129.0, vec![("var_1", "9", "black"), ("var_2", "10", "blue")]),
            ("prod_2", "Road Runner Lite", "shoes", "PeakRoute", 89.0, vec![("var_3", "9", "white")]),
            ("prod_3", "Fleece Hoodie", "clothing", "AeroThread", 59.0, vec![("var_4", "m", "gray")]),
        ];
        for (id, name, category, brand, price, variants) in catalog {
            store.upsert_product(Product {
                id: id.into(),
                name: name.into(),
                description: String::new(),
                category: category.into(),
                brand: brand.into(),
                price,
                rating: 4.0,
                images: vec![],
                variants: variants
                    .into_iter()
                    .map(|(vid, size, color)| Variant {
                        id: vid.into(),
                        size: size.into(),
                        color: color.into(),
                        in_stock: true,
                    })
                    .collect(),
            });
        }
    }

    fn build(
        store: Arc<Store>,
        config: Config,
        planner: Option<Arc<dyn LanguagePlanner>>,
    ) -> Orchestrator {
        let carts = Arc::new(CartService::new(store.clone(), &config));
        let products = Arc::new(ProductService::new(store.clone()));
        let sessions = Arc::new(SessionService::new(store.clone()));
        let interactions = Arc::new(InteractionService::new(store.clone()));
        let memory = Arc::new(MemoryService::new(store.clone()));
        let support = Arc::new(SupportService::new(store.clone()));
        let notifications = Arc::new(NotificationService::new(store.clone()));
        let orders = Arc::new(OrderService::new(
            store.clone(),
            carts.clone(),
            notifications,
        ));

        let agents = AgentRegistry::new(vec![
            Arc::new(ProductAgent::new(products.clone())) as Arc<dyn Agent>,
            Arc::new(CartAgent::new(carts.clone(), products.clone())),
            Arc::new(OrderAgent::new(orders, carts.clone())),
            Arc::new(SupportAgent::new(support)),
            Arc::new(MemoryAgent::new(memory.clone())),
        ]);

        Orchestrator::new(OrchestratorDeps {
            config,
            classifier: IntentClassifier::new(None),
            context_builder: ContextBuilder::new(sessions.clone(), carts, memory.clone()),
            interactions,
            sessions,
            memory,
            agents,
            planner,
        })
    }

    fn no_planner_config() -> Config {
        let mut config = Config::default();
        config.planner_feature_enabled = false;
        config
    }

    #[tokio::test]
    async fn guest_add_with_ambiguous_query_asks_for_clarification() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let orchestrator = build(store, no_planner_config(), None);
        let payload = orchestrator
            .process_message("add shoes to cart", "sess-1", None, "web")
            .await;
        assert_eq!(payload["agent"], "cart");
        assert_eq!(payload["data"]["code"], "CLARIFICATION_REQUIRED");
        assert!(payload["data"]["options"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn multi_status_fans_out_to_cart_and_order() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let config = no_planner_config();
        let carts = CartService::new(store.clone(), &config);
        let notifications = Arc::new(NotificationService::new(store.clone()));
        let orders = OrderService::new(
            store.clone(),
            Arc::new(CartService::new(store.clone(), &config)),
            notifications,
        );
        carts
            .add_item(Some("user_1"), "sess-1", "prod_1", "var_1", 1)
            .unwrap();
        orders.create_order("user_1", None, "idem-1").unwrap();
        // Order creation converts the cart; put one item back.
        carts
            .add_item(Some("user_1"), "sess-1", "prod_1", "var_1", 1)
            .unwrap();

        let orchestrator = build(store, config, None);
        let payload = orchestrator
            .process_message(
                "show my cart and order status",
                "sess-1",
                Some("user_1"),
                "web",
            )
            .await;
        assert_eq!(payload["agent"], "orchestrator");
        assert!(payload["data"]["cart"].is_object(), "{payload}");
        assert!(payload["data"]["order"].is_object(), "{payload}");
    }

    #[tokio::test]
    async fn planner_clarification_short_circuits() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let planner = Arc::new(FixedPlanner {
            plan: Some(ActionPlan {
                actions: vec![],
                confidence: 0.9,
                needs_clarification: true,
                clarification_question: "Which size?".into(),
            }),
        });
        let orchestrator = build(store, Config::default(), Some(planner));
        let payload = orchestrator
            .process_message("add shoes", "sess-1", None, "web")
            .await;
        assert_eq!(payload["success"], false);
        assert_eq!(payload["data"]["code"], "CLARIFICATION_REQUIRED");
        assert_eq!(payload["message"], "Which size?");
        assert_eq!(payload["agent"], "orchestrator");
        assert_eq!(payload["metadata"]["planner"]["used"], true);
    }

    #[tokio::test]
    async fn planner_actions_replace_deterministic_ones() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let planner = Arc::new(FixedPlanner {
            plan: Some(ActionPlan {
                actions: vec![PlanAction {
                    name: oc_domain::action::ActionName::GetCart,
                    target_agent: AgentName::Cart,
                    params: JsonMap::new(),
                }],
                confidence: 0.9,
                needs_clarification: false,
                clarification_question: String::new(),
            }),
        });
        let orchestrator = build(store, Config::default(), Some(planner));
        let payload = orchestrator
            .process_message("hello there", "sess-1", None, "web")
            .await;
        assert_eq!(payload["agent"], "orchestrator");
        assert_eq!(payload["metadata"]["planner"]["used"], true);
        assert_eq!(payload["metadata"]["planner"]["actionCount"], 1);
        assert!(payload["data"]["cart"].is_object());
    }

    #[tokio::test]
    async fn atomic_mode_skips_after_first_failure() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let mut config = Config::default();
        config.llm_planner_execution_mode = "atomic".into();
        let planner = Arc::new(FixedPlanner {
            plan: Some(ActionPlan {
                actions: vec![
                    PlanAction {
                        name: oc_domain::action::ActionName::CancelOrder,
                        target_agent: AgentName::Order,
                        params: JsonMap::new(),
                    },
                    PlanAction {
                        name: oc_domain::action::ActionName::GetCart,
                        target_agent: AgentName::Cart,
                        params: JsonMap::new(),
                    },
                ],
                confidence: 0.9,
                needs_clarification: false,
                clarification_question: String::new(),
            }),
        });
        let orchestrator = build(store, config, Some(planner));
        // Guest cancel fails (auth required) and the cart step is skipped.
        let payload = orchestrator
            .process_message("cancel and show cart", "sess-1", None, "web")
            .await;
        assert_eq!(payload["success"], false);
        let steps = payload["metadata"]["planner"]["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1]["error"]["code"], "SKIPPED_ATOMIC_MODE");
    }

    #[tokio::test]
    async fn partial_mode_runs_everything_and_flags_partial_failure() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let planner = Arc::new(FixedPlanner {
            plan: Some(ActionPlan {
                actions: vec![
                    PlanAction {
                        name: oc_domain::action::ActionName::CancelOrder,
                        target_agent: AgentName::Order,
                        params: JsonMap::new(),
                    },
                    PlanAction {
                        name: oc_domain::action::ActionName::GetCart,
                        target_agent: AgentName::Cart,
                        params: JsonMap::new(),
                    },
                ],
                confidence: 0.9,
                needs_clarification: false,
                clarification_question: String::new(),
            }),
        });
        let orchestrator = build(store, Config::default(), Some(planner));
        let payload = orchestrator
            .process_message("cancel and show cart", "sess-1", None, "web")
            .await;
        // Partial: the cart step succeeded, so the run counts as success.
        assert_eq!(payload["success"], true);
        assert_eq!(payload["data"]["partialFailure"], true);
        let steps = payload["metadata"]["planner"]["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1]["success"], true);
    }

    #[tokio::test]
    async fn search_and_add_backfills_variant_from_search() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let orchestrator = build(store, no_planner_config(), None);
        let payload = orchestrator
            .process_message(
                "find fleece hoodie and add to cart",
                "sess-1",
                None,
                "web",
            )
            .await;
        assert_eq!(payload["agent"], "orchestrator", "{payload}");
        let cart = &payload["data"]["cart"]["cart"];
        assert_eq!(cart["items"][0]["productId"], "prod_3", "{payload}");
        assert_eq!(cart["items"][0]["variantId"], "var_4");
    }

    #[tokio::test]
    async fn interaction_is_recorded_and_observable_next_turn() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let orchestrator = build(store, no_planner_config(), None);
        orchestrator
            .process_message("find running shoes", "sess-1", None, "web")
            .await;
        let payload = orchestrator
            .process_message("under 100", "sess-1", None, "web")
            .await;
        // Price refinement continues the product search.
        assert_eq!(payload["metadata"]["intent"], "product_search");
        let products = payload["data"]["products"].as_array().unwrap();
        assert!(products.iter().all(|p| p["price"].as_f64().unwrap() <= 100.0));
    }

    #[tokio::test]
    async fn planner_metadata_present_when_attempt_returns_nothing() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let planner = Arc::new(FixedPlanner { plan: None });
        let orchestrator = build(store, Config::default(), Some(planner));
        let payload = orchestrator
            .process_message("find running shoes", "sess-1", None, "web")
            .await;
        assert_eq!(payload["metadata"]["planner"]["used"], false);
        assert_eq!(payload["metadata"]["executionPolicy"]["plannerAttempted"], true);
    }

    // ── Canary determinism ──────────────────────────────────────────

    #[test]
    fn canary_bucket_is_pure() {
        let a = canary_bucket(Some("user_1"), "sess-1");
        let b = canary_bucket(Some("user_1"), "sess-1");
        assert_eq!(a, b);
        assert!(a < 100);
        // Anonymous bucketing keys on the session alone.
        assert_eq!(
            canary_bucket(None, "sess-1"),
            canary_bucket(None, "sess-1")
        );
    }

    #[tokio::test]
    async fn canary_zero_disables_and_hundred_enables() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let planner: Arc<dyn LanguagePlanner> = Arc::new(FixedPlanner { plan: None });

        let mut config = Config::default();
        config.planner_canary_percent = 0;
        let orchestrator = build(store.clone(), config, Some(planner.clone()));
        assert!(!orchestrator.planner_enabled_for_request(Some("user_1"), "sess-1"));

        let mut config = Config::default();
        config.planner_canary_percent = 100;
        let orchestrator = build(store, config, Some(planner));
        assert!(orchestrator.planner_enabled_for_request(Some("user_1"), "sess-1"));
    }

    #[tokio::test]
    async fn canary_partial_follows_bucket() {
        let store = Arc::new(Store::new());
        seed_catalog(&store);
        let planner: Arc<dyn LanguagePlanner> = Arc::new(FixedPlanner { plan: None });
        let bucket = canary_bucket(Some("user_1"), "sess-1");

        let mut config = Config::default();
        config.planner_canary_percent = (bucket + 1) as i32;
        let orchestrator = build(store.clone(), config, Some(planner.clone()));
        assert!(orchestrator.planner_enabled_for_request(Some("user_1"), "sess-1"));

        let mut config = Config::default();
        config.planner_canary_percent = bucket.max(1) as i32;
        let orchestrator = build(store, config, Some(planner));
        // percent == bucket means the strict `<` check excludes this pair
        // (unless bucket is 0, which the max(1) guard cannot represent).
        if bucket >= 1 {
            assert!(!orchestrator.planner_enabled_for_request(Some("user_1"), "sess-1"));
        }
    }
}
