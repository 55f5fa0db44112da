//! The conversational orchestrator: rule-first intent classification,
//! deterministic action extraction, optional LLM planning with canary
//! rollout, agent dispatch, and response aggregation.

pub mod classifier;
mod context;
mod core;
mod extractor;
mod formatter;
mod router;

pub use classifier::IntentClassifier;
pub use context::ContextBuilder;
pub use core::{Orchestrator, OrchestratorDeps};
pub use extractor::extract_actions;
pub use formatter::format_response;
pub use router::route_intent;
