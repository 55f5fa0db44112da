//! Shared domain types for the omnichannel commerce backend.
//!
//! Everything the other crates agree on lives here: the closed intent and
//! action vocabularies, the commerce and voice record types, the shared
//! error enum, and the environment-driven configuration.

pub mod action;
pub mod commerce;
pub mod config;
pub mod context;
pub mod error;
pub mod intent;
pub mod rate_limit;
pub mod response;
pub mod voice;

/// Heterogeneous payload map used for utterance entities, action params,
/// and agent data. The per-action allow-list in [`action`] stays the
/// authority on which keys are legal where.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
