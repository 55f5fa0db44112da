//! Outbound shopper notifications, persisted as records. An actual
//! delivery channel (email, push) would consume these.

use std::sync::Arc;

use oc_domain::commerce::{Notification, Order};
use oc_store::Store;

pub struct NotificationService {
    store: Arc<Store>,
}

impl NotificationService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn send_order_confirmation(&self, user_id: &str, order: &Order) -> Notification {
        let notification = Notification {
            id: self.store.ids.next("notif"),
            kind: "order_confirmation".into(),
            user_id: user_id.to_owned(),
            order_id: Some(order.id.clone()),
            call_id: None,
            disposition: None,
            message: format!("Order {} confirmed for ${:.2}", order.id, order.total),
            created_at: self.store.now(),
        };
        self.store.append_notification(notification.clone());
        notification
    }

    pub fn send_voice_recovery_followup(
        &self,
        user_id: &str,
        call_id: &str,
        message: &str,
        disposition: &str,
    ) -> Notification {
        let notification = Notification {
            id: self.store.ids.next("notif"),
            kind: "voice_recovery_followup".into(),
            user_id: user_id.to_owned(),
            order_id: None,
            call_id: Some(call_id.to_owned()),
            disposition: Some(disposition.to_owned()),
            message: message.to_owned(),
            created_at: self.store.now(),
        };
        self.store.append_notification(notification.clone());
        notification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn followup_carries_disposition() {
        let store = Arc::new(Store::new());
        let service = NotificationService::new(store.clone());
        service.send_voice_recovery_followup("user_1", "vcall_1", "hello", "conversion_intent");
        let rows = store.list_notifications_for_user("user_1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].disposition.as_deref(), Some("conversion_intent"));
        assert_eq!(rows[0].kind, "voice_recovery_followup");
    }
}
