//! Rule-first intent classification with an optional LLM override.

mod entities;
mod rules;

use std::sync::Arc;

use oc_domain::intent::IntentResult;
use oc_llm::{LanguagePlanner, RecentTurn};

pub use rules::classify_rules;

/// One summarized prior turn, most recent last.
#[derive(Debug, Clone)]
pub struct RecentTurnSummary {
    pub intent: String,
    pub agent: String,
    pub message: String,
}

/// Conversation context the classifier may consult.
#[derive(Debug, Clone, Default)]
pub struct RecentContext {
    pub recent: Vec<RecentTurnSummary>,
}

pub struct IntentClassifier {
    llm: Option<Arc<dyn LanguagePlanner>>,
}

impl IntentClassifier {
    pub fn new(llm: Option<Arc<dyn LanguagePlanner>>) -> Self {
        Self { llm }
    }

    /// Classify one utterance. The rule result stands unless an enabled
    /// LLM predicts a supported intent at confidence
    /// `>= max(0.7, rule confidence)`.
    pub async fn classify(
        &self,
        message: &str,
        context: Option<&RecentContext>,
        allow_llm: bool,
    ) -> IntentResult {
        let rule_result = classify_rules(message, context);
        if !allow_llm {
            return rule_result;
        }
        let Some(llm) = &self.llm else {
            return rule_result;
        };

        let recent: Vec<RecentTurn> = context
            .map(|ctx| {
                ctx.recent
                    .iter()
                    .map(|turn| RecentTurn {
                        message: turn.message.clone(),
                        intent: turn.intent.clone(),
                        agent: turn.agent.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        match llm.classify_intent(message, &recent).await {
            Some(prediction) if prediction.confidence >= rule_result.confidence.max(0.7) => {
                tracing::debug!(
                    intent = prediction.intent.as_str(),
                    confidence = prediction.confidence,
                    "llm prediction overrides rule classifier"
                );
                IntentResult::new(prediction.intent, prediction.confidence, prediction.entities)
            }
            _ => rule_result,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
