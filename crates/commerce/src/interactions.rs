//! Per-session interaction transcript: the `recent` window the classifier
//! and context builder read.

use serde_json::Value;
use std::sync::Arc;

use oc_domain::context::InteractionRecord;
use oc_store::Store;

pub struct InteractionService {
    store: Arc<Store>,
}

impl InteractionService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Persist one turn. Appended in arrival order; observable through
    /// [`recent`] before the next message classifies.
    ///
    /// [`recent`]: InteractionService::recent
    pub fn record(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        message: &str,
        intent: &str,
        agent: &str,
        response: Value,
    ) -> InteractionRecord {
        let record = InteractionRecord {
            id: self.store.ids.next("msg"),
            session_id: session_id.to_owned(),
            user_id: user_id.map(str::to_owned),
            message: message.to_owned(),
            intent: intent.to_owned(),
            agent: agent.to_owned(),
            response,
            timestamp: self.store.now(),
        };
        self.store.append_interaction(record.clone());
        record
    }

    /// The last `limit` turns for a session, oldest first.
    pub fn recent(&self, session_id: &str, limit: usize) -> Vec<InteractionRecord> {
        self.store.recent_interactions(session_id, limit)
    }
}
