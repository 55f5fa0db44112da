//! Assembles the immutable per-request [`AgentContext`] from session,
//! cart snapshot, saved preferences, memory, and the recent transcript.

use std::sync::Arc;

use oc_commerce::{CartService, MemoryService, SessionService};
use oc_domain::context::{AgentContext, InteractionRecord};

pub struct ContextBuilder {
    sessions: Arc<SessionService>,
    carts: Arc<CartService>,
    memory: Arc<MemoryService>,
}

impl ContextBuilder {
    pub fn new(
        sessions: Arc<SessionService>,
        carts: Arc<CartService>,
        memory: Arc<MemoryService>,
    ) -> Self {
        Self {
            sessions,
            carts,
            memory,
        }
    }

    pub fn build(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        channel: &str,
        recent_messages: Vec<InteractionRecord>,
    ) -> AgentContext {
        let session = self.sessions.ensure_session(session_id, user_id, channel);
        let cart = Some(self.carts.get_cart(user_id, session_id));
        let (preferences, memory) = match user_id {
            Some(user_id) => {
                let snapshot = self.memory.get_memory_snapshot(user_id);
                (Some(snapshot.preferences.clone()), Some(snapshot))
            }
            None => (None, None),
        };

        AgentContext {
            session_id: session_id.to_owned(),
            user_id: user_id.map(str::to_owned),
            channel: channel.to_owned(),
            session,
            cart,
            preferences,
            memory,
            recent_messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_domain::config::Config;
    use oc_store::Store;

    fn builder() -> ContextBuilder {
        let store = Arc::new(Store::new());
        ContextBuilder::new(
            Arc::new(SessionService::new(store.clone())),
            Arc::new(CartService::new(store.clone(), &Config::default())),
            Arc::new(MemoryService::new(store)),
        )
    }

    #[test]
    fn guest_context_has_no_memory() {
        let context = builder().build("sess-1", None, "web", vec![]);
        assert!(context.memory.is_none());
        assert!(context.preferences.is_none());
        assert!(context.cart.is_some());
        assert_eq!(context.session.session_id, "sess-1");
    }

    #[test]
    fn known_user_context_carries_preferences() {
        let context = builder().build("sess-1", Some("user_1"), "web", vec![]);
        assert!(context.memory.is_some());
        assert!(context.preferences.is_some());
        assert_eq!(context.user_id.as_deref(), Some("user_1"));
    }
}
