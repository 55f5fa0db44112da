//! Webhook ingestion: match the call by provider id, dedupe by event
//! key, and advance the call state. The route layer verifies the HMAC
//! signature before this code runs.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use oc_domain::voice::{ProviderEvent, VoiceCall};

use crate::recovery::{
    extract_outcome, extract_provider_call_id, normalize_provider_status, VoiceRecoveryService,
};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
    pub accepted: bool,
    pub matched: bool,
    pub idempotent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VoiceRecoveryService {
    /// Ingest one provider callback payload. Redeliveries of the same
    /// event are acknowledged without reapplying anything.
    pub fn ingest_provider_callback(&self, payload: &Value) -> CallbackResult {
        let Some(provider_call_id) = extract_provider_call_id(payload) else {
            return CallbackResult {
                accepted: false,
                reason: Some("missing_provider_call_id".into()),
                ..CallbackResult::default()
            };
        };

        let Some(call) = self.store.find_voice_call_by_provider_id(&provider_call_id) else {
            return CallbackResult {
                accepted: true,
                matched: false,
                provider_call_id: Some(provider_call_id),
                reason: Some("call_not_found".into()),
                ..CallbackResult::default()
            };
        };

        let event_key = event_key(payload);
        if call.provider_event_keys.contains(&event_key) {
            return CallbackResult {
                accepted: true,
                matched: true,
                idempotent: true,
                call_id: Some(call.id.clone()),
                provider_call_id: Some(provider_call_id),
                status: Some(call.status.as_str().to_owned()),
                outcome: Some(call.outcome.clone()),
                ..CallbackResult::default()
            };
        }

        let now = self.store.now();
        let status = normalize_provider_status(payload);
        let outcome = extract_outcome(payload);
        if status.is_terminal() {
            self.update_call_terminal(&call.id, status, &outcome, payload.clone(), now);
        } else {
            self.update_call_progress(&call.id, status, payload.clone(), now);
        }
        self.append_event(&call.id, &event_key, status.as_str(), &outcome);

        CallbackResult {
            accepted: true,
            matched: true,
            idempotent: false,
            call_id: Some(call.id),
            provider_call_id: Some(provider_call_id),
            status: Some(status.as_str().to_owned()),
            outcome: Some(outcome),
            ..CallbackResult::default()
        }
    }

    fn append_event(&self, call_id: &str, event_key: &str, status: &str, outcome: &str) {
        let Some(mut call) = self.store.get_voice_call(call_id) else {
            return;
        };
        call.provider_event_keys.push(event_key.to_owned());
        call.provider_events.push(ProviderEvent {
            key: event_key.to_owned(),
            status: status.to_owned(),
            outcome: outcome.to_owned(),
            received_at: self.store.now(),
        });
        let cap = VoiceCall::EVENT_RING_CAPACITY;
        if call.provider_event_keys.len() > cap {
            let overflow = call.provider_event_keys.len() - cap;
            call.provider_event_keys.drain(..overflow);
        }
        if call.provider_events.len() > cap {
            let overflow = call.provider_events.len() - cap;
            call.provider_events.drain(..overflow);
        }
        call.updated_at = self.store.now();
        self.store.update_voice_call(call);
    }
}

/// Stable key per provider event: an explicit event id when present,
/// else a digest over the normalized status and outcome. Providers vary
/// telemetry fields across redeliveries; those must still collide.
fn event_key(payload: &Value) -> String {
    for key in ["event_id", "eventId", "id", "sequence", "timestamp"] {
        if let Some(value) = payload.get(key) {
            match value {
                Value::String(s) if !s.trim().is_empty() => return format!("{key}:{}", s.trim()),
                Value::Number(n) => return format!("{key}:{n}"),
                _ => {}
            }
        }
    }
    let status = normalize_provider_status(payload);
    let outcome = extract_outcome(payload);
    let digest = hex::encode(Sha256::digest(
        format!("{}|{}", status.as_str(), outcome).as_bytes(),
    ));
    format!("digest:{}", &digest[..32])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use oc_commerce::{NotificationService, SupportService};
    use oc_domain::commerce::{Cart, CartItem, User};
    use oc_domain::config::Config;
    use oc_domain::error::Result;
    use oc_domain::voice::VoiceCallStatus;
    use oc_store::Store;
    use serde_json::json;
    use std::sync::Arc;

    use crate::superu::VoiceProvider;

    struct OkProvider;

    #[async_trait]
    impl VoiceProvider for OkProvider {
        fn enabled(&self) -> bool {
            true
        }
        async fn start_outbound_call(
            &self,
            _to: &str,
            _assistant: &str,
            _from: &str,
            _metadata: Value,
        ) -> Result<Value> {
            Ok(json!({"call_id": "superu_call_001", "status": "queued"}))
        }
        async fn fetch_call_logs(&self, _call_id: &str, _limit: usize) -> Result<Vec<Value>> {
            Ok(vec![])
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    async fn service_with_live_call() -> (Arc<Store>, VoiceRecoveryService) {
        let store = Arc::new(Store::new());
        store.upsert_user(User {
            id: "user_1".into(),
            email: "user@example.com".into(),
            name: "Jamie".into(),
            phone: "+15551234567".into(),
            timezone: String::new(),
            created_at: now() - Duration::days(10),
        });
        let updated = now() - Duration::minutes(45);
        store.insert_cart(Cart {
            id: "cart_1".into(),
            user_id: Some("user_1".into()),
            session_id: "sess-1".into(),
            items: vec![CartItem {
                item_id: "item_1".into(),
                product_id: "prod_1".into(),
                variant_id: "var_1".into(),
                name: "Trail Runner X".into(),
                price: 129.0,
                quantity: 1,
                image: String::new(),
            }],
            subtotal: 129.0,
            tax: 10.32,
            shipping: 5.99,
            discount: 0.0,
            total: 145.31,
            item_count: 1,
            currency: "USD".into(),
            applied_discount: None,
            created_at: updated,
            updated_at: updated,
        });

        let mut config = Config::default();
        config.superu_enabled = true;
        config.superu_api_key = "sk".into();
        config.superu_assistant_id = "asst".into();
        config.superu_from_phone_number = "+15550000000".into();
        config.voice_quiet_hours_start = 0;
        config.voice_quiet_hours_end = 0;

        let support = Arc::new(SupportService::new(store.clone()));
        let notifications = Arc::new(NotificationService::new(store.clone()));
        let service = VoiceRecoveryService::new(
            store.clone(),
            &config,
            Arc::new(OkProvider),
            support,
            notifications,
        );
        service.process_due_work(now()).await;
        (store, service)
    }

    #[tokio::test]
    async fn missing_call_id_is_rejected() {
        let (_store, service) = service_with_live_call().await;
        let result = service.ingest_provider_callback(&json!({"status": "completed"}));
        assert!(!result.accepted);
        assert_eq!(result.reason.as_deref(), Some("missing_provider_call_id"));
    }

    #[tokio::test]
    async fn unknown_call_is_accepted_but_unmatched() {
        let (_store, service) = service_with_live_call().await;
        let result = service
            .ingest_provider_callback(&json!({"call_id": "superu_call_999", "status": "completed"}));
        assert!(result.accepted);
        assert!(!result.matched);
        assert_eq!(result.reason.as_deref(), Some("call_not_found"));
    }

    #[tokio::test]
    async fn terminal_event_applies_once_then_idempotent() {
        let (store, service) = service_with_live_call().await;
        let payload = json!({
            "event_id": "evt_001",
            "call_id": "superu_call_001",
            "status": "completed",
            "outcome": "converted",
        });

        let first = service.ingest_provider_callback(&payload);
        assert!(first.accepted && first.matched && !first.idempotent);
        assert_eq!(first.status.as_deref(), Some("completed"));
        assert_eq!(first.outcome.as_deref(), Some("converted"));

        let second = service.ingest_provider_callback(&payload);
        assert!(second.idempotent);

        // Exactly one follow-up notification despite the redelivery.
        assert_eq!(store.list_notifications_for_user("user_1").len(), 1);
        let call = service.list_calls(10, None).remove(0);
        assert_eq!(call.status, VoiceCallStatus::Completed);
        assert_eq!(call.provider_event_keys.len(), 1);
    }

    #[tokio::test]
    async fn progress_event_advances_without_followup() {
        let (store, service) = service_with_live_call().await;
        let result = service.ingest_provider_callback(&json!({
            "event_id": "evt_010",
            "call_id": "superu_call_001",
            "status": "ringing",
        }));
        assert!(result.accepted && result.matched);
        let call = service.list_calls(10, None).remove(0);
        assert_eq!(call.status, VoiceCallStatus::Ringing);
        assert!(!call.followup_applied);
        assert!(store.list_notifications_for_user("user_1").is_empty());
    }

    #[tokio::test]
    async fn distinct_events_each_apply() {
        let (_store, service) = service_with_live_call().await;
        service.ingest_provider_callback(&json!({
            "event_id": "evt_001", "call_id": "superu_call_001", "status": "ringing",
        }));
        service.ingest_provider_callback(&json!({
            "event_id": "evt_002", "call_id": "superu_call_001", "status": "in_progress",
        }));
        let call = service.list_calls(10, None).remove(0);
        assert_eq!(call.provider_event_keys.len(), 2);
        assert_eq!(call.status, VoiceCallStatus::InProgress);
    }

    #[tokio::test]
    async fn payload_without_event_id_dedupes_by_digest() {
        let (_store, service) = service_with_live_call().await;
        let payload = json!({"call_id": "superu_call_001", "status": "ringing"});
        let first = service.ingest_provider_callback(&payload);
        assert!(!first.idempotent);
        let second = service.ingest_provider_callback(&payload);
        assert!(second.idempotent);
    }

    #[tokio::test]
    async fn redelivery_with_varied_telemetry_stays_idempotent() {
        let (store, service) = service_with_live_call().await;
        let first = service.ingest_provider_callback(&json!({
            "call_id": "superu_call_001",
            "status": "completed",
            "outcome": "converted",
            "latencyMs": 120,
        }));
        assert!(!first.idempotent);
        let second = service.ingest_provider_callback(&json!({
            "call_id": "superu_call_001",
            "status": "completed",
            "outcome": "converted",
            "latencyMs": 450,
        }));
        assert!(second.idempotent);
        // The follow-up fired exactly once.
        assert_eq!(store.list_notifications_for_user("user_1").len(), 1);
    }

    #[test]
    fn event_key_prefers_explicit_ids() {
        assert_eq!(event_key(&json!({"event_id": "evt_1"})), "event_id:evt_1");
        assert_eq!(event_key(&json!({"sequence": 7})), "sequence:7");
        assert_eq!(event_key(&json!({"id": "evt_abc"})), "id:evt_abc");
        assert_eq!(
            event_key(&json!({"timestamp": 1718000000, "status": "ringing"})),
            "timestamp:1718000000"
        );
        assert!(event_key(&json!({"status": "ringing"})).starts_with("digest:"));
    }

    #[test]
    fn digest_key_ignores_unrelated_telemetry_fields() {
        // Redeliveries that only vary telemetry must collide.
        let first = json!({"status": "completed", "outcome": "converted", "latencyMs": 120});
        let second = json!({"status": "completed", "outcome": "converted", "latencyMs": 450});
        assert_eq!(event_key(&first), event_key(&second));
        // A genuinely different outcome is a different event.
        let other = json!({"status": "completed", "outcome": "declined"});
        assert_ne!(event_key(&first), event_key(&other));
    }
}
