//! Session records and rolling conversation state.

use std::sync::Arc;

use oc_domain::commerce::{ConversationState, SessionRecord};
use oc_domain::JsonMap;
use oc_store::Store;

pub struct SessionService {
    store: Arc<Store>,
}

impl SessionService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Fetch the session, creating it on first contact.
    pub fn ensure_session(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        channel: &str,
    ) -> SessionRecord {
        if let Some(mut session) = self.store.get_session(session_id) {
            // A session started as guest adopts the user on login.
            if session.user_id.is_none() && user_id.is_some() {
                session.user_id = user_id.map(str::to_owned);
                self.store.upsert_session(session.clone());
            }
            return session;
        }
        let now = self.store.now();
        let session = SessionRecord {
            session_id: session_id.to_owned(),
            user_id: user_id.map(str::to_owned),
            channel: channel.to_owned(),
            conversation: ConversationState::default(),
            created_at: now,
            last_activity: now,
        };
        self.store.upsert_session(session.clone());
        session
    }

    pub fn update_conversation(
        &self,
        session_id: &str,
        last_intent: &str,
        last_agent: &str,
        last_message: &str,
        entities: JsonMap,
    ) {
        let Some(mut session) = self.store.get_session(session_id) else {
            return;
        };
        session.conversation = ConversationState {
            last_intent: last_intent.to_owned(),
            last_agent: last_agent.to_owned(),
            last_message: last_message.to_owned(),
            entities,
        };
        session.last_activity = self.store.now();
        self.store.upsert_session(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_session_creates_then_reuses() {
        let service = SessionService::new(Arc::new(Store::new()));
        let first = service.ensure_session("sess-1", None, "web");
        let second = service.ensure_session("sess-1", None, "web");
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn guest_session_adopts_user_on_login() {
        let service = SessionService::new(Arc::new(Store::new()));
        service.ensure_session("sess-1", None, "web");
        let adopted = service.ensure_session("sess-1", Some("user_1"), "web");
        assert_eq!(adopted.user_id.as_deref(), Some("user_1"));
    }

    #[test]
    fn conversation_state_is_replaced_each_turn() {
        let service = SessionService::new(Arc::new(Store::new()));
        service.ensure_session("sess-1", None, "web");
        service.update_conversation("sess-1", "view_cart", "cart", "show cart", JsonMap::new());
        service.update_conversation(
            "sess-1",
            "checkout",
            "order",
            "checkout now",
            JsonMap::new(),
        );
        let session = service.ensure_session("sess-1", None, "web");
        assert_eq!(session.conversation.last_intent, "checkout");
        assert_eq!(session.conversation.last_agent, "order");
    }
}
