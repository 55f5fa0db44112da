//! Outcome-driven follow-ups, applied at most once per call (guarded by
//! `followupApplied` on the terminal transition).

use oc_domain::voice::{VoiceCall, VoiceCallStatus};

impl super::recovery::VoiceRecoveryService {
    /// | outcome | action |
    /// |---|---|
    /// | do_not_call / opt_out / dnc | suppress the user |
    /// | requested_callback / needs_help / agent_handoff | support ticket + notification |
    /// | converted / checkout_intent / interested | notification |
    /// | failed call, any other outcome | notification |
    pub(crate) fn apply_outcome_actions(&self, call: &VoiceCall) {
        let user_id = call.user_id.trim();
        if user_id.is_empty() {
            return;
        }
        let session_id = if call.session_id.trim().is_empty() {
            "voice-session"
        } else {
            call.session_id.trim()
        };
        let outcome = call.outcome.trim().to_lowercase();

        match outcome.as_str() {
            "do_not_call" | "opt_out" | "dnc" => {
                self.suppress_user(user_id, "voice_opt_out");
            }
            "requested_callback" | "needs_help" | "agent_handoff" => {
                self.support.create_ticket(
                    Some(user_id),
                    session_id,
                    &format!("Voice recovery callback requested for cart {}", call.cart_id),
                    "general",
                    "normal",
                    "voice",
                );
                self.notifications.send_voice_recovery_followup(
                    user_id,
                    &call.id,
                    "We received your callback request and a support agent will reach out.",
                    "callback_requested",
                );
            }
            "converted" | "checkout_intent" | "interested" => {
                self.notifications.send_voice_recovery_followup(
                    user_id,
                    &call.id,
                    "Your cart is still available. Continue checkout when ready.",
                    "conversion_intent",
                );
            }
            _ => {
                if call.status == VoiceCallStatus::Failed {
                    self.notifications.send_voice_recovery_followup(
                        user_id,
                        &call.id,
                        "We could not complete your call. Your cart remains available.",
                        "call_failed",
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use oc_commerce::{NotificationService, SupportService};
    use oc_domain::config::Config;
    use oc_domain::voice::{VoiceCall, VoiceCallStatus};
    use oc_store::Store;
    use serde_json::json;
    use std::sync::Arc;

    use crate::recovery::VoiceRecoveryService;
    use crate::superu::VoiceProvider;

    struct NullProvider;

    #[async_trait::async_trait]
    impl VoiceProvider for NullProvider {
        fn enabled(&self) -> bool {
            false
        }
        async fn start_outbound_call(
            &self,
            _to: &str,
            _assistant: &str,
            _from: &str,
            _metadata: serde_json::Value,
        ) -> oc_domain::error::Result<serde_json::Value> {
            Ok(json!({}))
        }
        async fn fetch_call_logs(
            &self,
            _call_id: &str,
            _limit: usize,
        ) -> oc_domain::error::Result<Vec<serde_json::Value>> {
            Ok(vec![])
        }
    }

    fn service(store: Arc<Store>) -> VoiceRecoveryService {
        VoiceRecoveryService::new(
            store.clone(),
            &Config::default(),
            Arc::new(NullProvider),
            Arc::new(SupportService::new(store.clone())),
            Arc::new(NotificationService::new(store)),
        )
    }

    fn call(outcome: &str, status: VoiceCallStatus) -> VoiceCall {
        let now = Utc::now();
        VoiceCall {
            id: "vcall_1".into(),
            recovery_key: "cart_1::snap".into(),
            user_id: "user_1".into(),
            session_id: "sess-1".into(),
            cart_id: "cart_1".into(),
            status,
            attempt_count: 1,
            attempts: vec![],
            provider: "superu".into(),
            provider_call_id: Some("superu_call_001".into()),
            provider_event_keys: vec![],
            provider_events: vec![],
            provider_payload: None,
            script_version: "v1".into(),
            campaign: json!({}),
            outcome: outcome.into(),
            followup_applied: false,
            estimated_cost_usd: 0.7,
            next_retry_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn opt_out_outcomes_suppress_the_user() {
        for outcome in ["do_not_call", "opt_out", "dnc"] {
            let store = Arc::new(Store::new());
            let service = service(store.clone());
            service.apply_outcome_actions(&call(outcome, VoiceCallStatus::Completed));
            assert!(store.is_suppressed("user_1"), "outcome {outcome}");
        }
    }

    #[test]
    fn callback_request_opens_ticket_and_notifies() {
        let store = Arc::new(Store::new());
        let service = service(store.clone());
        service.apply_outcome_actions(&call("requested_callback", VoiceCallStatus::Completed));
        let tickets = store.list_tickets(Some("user_1"), None, None, 10);
        assert_eq!(tickets.len(), 1);
        assert!(tickets[0].issue.contains("cart_1"));
        let notifications = store.list_notifications_for_user("user_1");
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].disposition.as_deref(),
            Some("callback_requested")
        );
    }

    #[test]
    fn conversion_intent_notifies_only() {
        let store = Arc::new(Store::new());
        let service = service(store.clone());
        service.apply_outcome_actions(&call("checkout_intent", VoiceCallStatus::Completed));
        assert!(store.list_tickets(Some("user_1"), None, None, 10).is_empty());
        let notifications = store.list_notifications_for_user("user_1");
        assert_eq!(
            notifications[0].disposition.as_deref(),
            Some("conversion_intent")
        );
    }

    #[test]
    fn failed_call_with_unknown_outcome_notifies() {
        let store = Arc::new(Store::new());
        let service = service(store.clone());
        service.apply_outcome_actions(&call("busy", VoiceCallStatus::Failed));
        let notifications = store.list_notifications_for_user("user_1");
        assert_eq!(notifications[0].disposition.as_deref(), Some("call_failed"));
    }

    #[test]
    fn completed_call_with_unknown_outcome_is_silent() {
        let store = Arc::new(Store::new());
        let service = service(store.clone());
        service.apply_outcome_actions(&call("chatted", VoiceCallStatus::Completed));
        assert!(store.list_notifications_for_user("user_1").is_empty());
    }

    #[test]
    fn anonymous_call_is_ignored() {
        let store = Arc::new(Store::new());
        let service = service(store.clone());
        let mut anonymous = call("converted", VoiceCallStatus::Completed);
        anonymous.user_id = String::new();
        service.apply_outcome_actions(&anonymous);
        assert!(store.list_notifications_for_user("").is_empty());
    }
}
