//! The LLM client: enablement, compact request payloads, and the two
//! typed calls. All failures collapse to `None` so callers degrade to the
//! deterministic path.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use oc_domain::action::ActionName;
use oc_domain::config::Config;
use oc_domain::intent::SupportedIntent;
use oc_domain::JsonMap;

use crate::breaker::CircuitBreaker;
use crate::parse::try_parse_json_object;
use crate::plan::{validate_plan, ActionPlan};
use crate::prompts::{ACTION_PLANNING_PROMPT, INTENT_CLASSIFICATION_PROMPT};
use crate::providers;

const MAX_MESSAGE_CHARS: usize = 2000;
const MAX_RECENT_TURNS: usize = 6;
const MAX_RECENT_MESSAGE_CHARS: usize = 200;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request/response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One compact prior turn shipped to the model for context.
#[derive(Debug, Clone, Serialize)]
pub struct RecentTurn {
    pub message: String,
    pub intent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent: String,
}

/// A model-predicted intent that already passed the closed-set check.
#[derive(Debug, Clone)]
pub struct IntentPrediction {
    pub intent: SupportedIntent,
    pub confidence: f64,
    pub entities: JsonMap,
}

/// Seam between the orchestrator and the model. The production impl is
/// [`LlmClient`]; tests use stubs.
#[async_trait]
pub trait LanguagePlanner: Send + Sync {
    async fn classify_intent(
        &self,
        message: &str,
        recent: &[RecentTurn],
    ) -> Option<IntentPrediction>;

    async fn plan_actions(
        &self,
        message: &str,
        recent: &[RecentTurn],
        inferred_intent: SupportedIntent,
    ) -> Option<ActionPlan>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LlmClient {
    config: Config,
    breaker: CircuitBreaker,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: Config) -> Self {
        let breaker = CircuitBreaker::new(
            config.llm_circuit_breaker_failure_threshold,
            Duration::from_secs_f64(config.llm_circuit_breaker_timeout_seconds.max(0.0)),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.llm_timeout_seconds.max(0.1)))
            .build()
            .unwrap_or_default();
        Self {
            config,
            breaker,
            http,
        }
    }

    /// Enabled iff the feature flag is on and the active provider has a
    /// credential.
    pub fn enabled(&self) -> bool {
        if !self.config.llm_enabled {
            return false;
        }
        match self.config.llm_provider.as_str() {
            "openai" => !self.config.openai_api_key.is_empty(),
            "anthropic" => !self.config.anthropic_api_key.is_empty(),
            _ => false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One breaker-guarded model call. Any failure records on the breaker
    /// and surfaces as `None` upstream.
    async fn call_model(&self, system_prompt: &str, user_prompt: &str) -> Option<String> {
        if self.breaker.acquire().is_err() {
            tracing::debug!("llm call skipped: circuit open");
            return None;
        }
        let outcome = match self.config.llm_provider.as_str() {
            "openai" => {
                providers::call_openai(&self.http, &self.config, system_prompt, user_prompt).await
            }
            "anthropic" => {
                providers::call_anthropic(&self.http, &self.config, system_prompt, user_prompt)
                    .await
            }
            other => {
                tracing::warn!(provider = other, "unsupported llm provider");
                return None;
            }
        };
        match outcome {
            Ok(text) => {
                self.breaker.record_success();
                Some(text)
            }
            Err(err) => {
                self.breaker.record_failure();
                tracing::debug!(error = %err, "llm call failed");
                None
            }
        }
    }

    fn compact_recent(recent: &[RecentTurn]) -> Vec<serde_json::Value> {
        recent
            .iter()
            .rev()
            .take(MAX_RECENT_TURNS)
            .rev()
            .filter(|turn| !turn.message.trim().is_empty())
            .map(|turn| {
                serde_json::json!({
                    "message": turn.message.chars().take(MAX_RECENT_MESSAGE_CHARS).collect::<String>(),
                    "intent": turn.intent,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LanguagePlanner for LlmClient {
    async fn classify_intent(
        &self,
        message: &str,
        recent: &[RecentTurn],
    ) -> Option<IntentPrediction> {
        if !self.enabled() {
            return None;
        }
        let user_prompt = serde_json::json!({
            "message": message.trim().chars().take(MAX_MESSAGE_CHARS).collect::<String>(),
            "recent": Self::compact_recent(recent),
        })
        .to_string();

        let raw = self
            .call_model(INTENT_CLASSIFICATION_PROMPT, &user_prompt)
            .await?;
        let payload = try_parse_json_object(&raw)?;

        let intent = SupportedIntent::parse(payload.get("intent")?.as_str()?)?;
        let confidence = payload
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let entities = payload
            .get("entities")
            .and_then(serde_json::Value::as_object)
            .cloned()
            .unwrap_or_default();

        Some(IntentPrediction {
            intent,
            confidence,
            entities,
        })
    }

    async fn plan_actions(
        &self,
        message: &str,
        recent: &[RecentTurn],
        inferred_intent: SupportedIntent,
    ) -> Option<ActionPlan> {
        if !self.enabled() || !self.config.llm_planner_enabled {
            return None;
        }
        let allowed: Vec<&str> = ActionName::ALL.iter().map(|a| a.as_str()).collect();
        let user_prompt = serde_json::json!({
            "message": message.trim().chars().take(MAX_MESSAGE_CHARS).collect::<String>(),
            "inferredIntent": inferred_intent.as_str(),
            "allowedActions": allowed,
            "recent": Self::compact_recent(recent),
        })
        .to_string();

        let raw = self.call_model(ACTION_PLANNING_PROMPT, &user_prompt).await?;
        let payload = try_parse_json_object(&raw)?;
        validate_plan(&payload, self.config.llm_planner_min_confidence)
    }
}
