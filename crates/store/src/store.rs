//! The shared store: typed collections behind per-collection locks.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use oc_domain::commerce::{
    AdminActivityEntry, Cart, MemorySnapshot, Notification, Order, Product, SessionRecord,
    SupportTicket, User,
};
use oc_domain::context::InteractionRecord;
use oc_domain::voice::{
    VoiceAlert, VoiceCall, VoiceJob, VoiceSettings, VoiceSuppression, ALERT_RING_CAPACITY,
};

use crate::ids::IdGenerator;

/// Process-wide data store. One lock per collection; readers clone out.
#[derive(Default)]
pub struct Store {
    pub ids: IdGenerator,

    users: RwLock<HashMap<String, User>>,
    products: RwLock<HashMap<String, Product>>,
    carts: RwLock<HashMap<String, Cart>>,
    orders: RwLock<HashMap<String, Order>>,
    /// `Idempotency-Key -> orderId` per spec'd `idempotency_keys` layout.
    order_idempotency: RwLock<HashMap<String, String>>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    interactions: RwLock<Vec<InteractionRecord>>,
    memories: RwLock<HashMap<String, MemorySnapshot>>,
    tickets: RwLock<HashMap<String, SupportTicket>>,
    notifications: RwLock<Vec<Notification>>,
    admin_activity: RwLock<Vec<AdminActivityEntry>>,

    voice_settings: RwLock<Option<VoiceSettings>>,
    voice_jobs: RwLock<HashMap<String, VoiceJob>>,
    voice_calls: RwLock<HashMap<String, VoiceCall>>,
    voice_suppressions: RwLock<HashMap<String, VoiceSuppression>>,
    voice_alerts: RwLock<Vec<VoiceAlert>>,
    /// `recoveryKey -> providerCallId|jobId`, set once per dispatched key.
    voice_call_idempotency: RwLock<HashMap<String, String>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    // ── Users ─────────────────────────────────────────────────────

    pub fn upsert_user(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }

    pub fn get_user(&self, user_id: &str) -> Option<User> {
        self.users.read().get(user_id).cloned()
    }

    // ── Products ──────────────────────────────────────────────────

    pub fn upsert_product(&self, product: Product) {
        self.products.write().insert(product.id.clone(), product);
    }

    pub fn get_product(&self, product_id: &str) -> Option<Product> {
        self.products.read().get(product_id).cloned()
    }

    pub fn list_products(&self) -> Vec<Product> {
        self.products.read().values().cloned().collect()
    }

    // ── Carts ─────────────────────────────────────────────────────

    pub fn insert_cart(&self, cart: Cart) {
        self.carts.write().insert(cart.id.clone(), cart);
    }

    pub fn get_cart(&self, cart_id: &str) -> Option<Cart> {
        self.carts.read().get(cart_id).cloned()
    }

    /// User-owned cart wins over a session cart, matching checkout
    /// attachment semantics.
    pub fn find_cart(&self, user_id: Option<&str>, session_id: &str) -> Option<Cart> {
        let carts = self.carts.read();
        if let Some(uid) = user_id {
            if let Some(cart) = carts.values().find(|c| c.user_id.as_deref() == Some(uid)) {
                return Some(cart.clone());
            }
        }
        if session_id.is_empty() {
            return None;
        }
        carts
            .values()
            .find(|c| c.user_id.is_none() && c.session_id == session_id)
            .cloned()
    }

    pub fn update_cart(&self, cart: Cart) {
        self.carts.write().insert(cart.id.clone(), cart);
    }

    pub fn list_carts(&self) -> Vec<Cart> {
        self.carts.read().values().cloned().collect()
    }

    // ── Orders ────────────────────────────────────────────────────

    pub fn insert_order(&self, order: Order) {
        self.orders.write().insert(order.id.clone(), order);
    }

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    pub fn update_order(&self, order: Order) {
        self.orders.write().insert(order.id.clone(), order);
    }

    /// Most recent first.
    pub fn list_orders_for_user(&self, user_id: &str) -> Vec<Order> {
        let mut rows: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub fn list_orders(&self) -> Vec<Order> {
        self.orders.read().values().cloned().collect()
    }

    pub fn order_for_idempotency_key(&self, key: &str) -> Option<String> {
        self.order_idempotency.read().get(key).cloned()
    }

    pub fn remember_idempotency_key(&self, key: &str, order_id: &str) {
        self.order_idempotency
            .write()
            .insert(key.to_owned(), order_id.to_owned());
    }

    // ── Sessions ──────────────────────────────────────────────────

    pub fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn upsert_session(&self, session: SessionRecord) {
        self.sessions
            .write()
            .insert(session.session_id.clone(), session);
    }

    // ── Interactions ──────────────────────────────────────────────

    pub fn append_interaction(&self, record: InteractionRecord) {
        self.interactions.write().push(record);
    }

    /// The most recent `limit` records for a session, oldest first.
    pub fn recent_interactions(&self, session_id: &str, limit: usize) -> Vec<InteractionRecord> {
        let interactions = self.interactions.read();
        let mut rows: Vec<InteractionRecord> = interactions
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if rows.len() > limit {
            rows.split_off(rows.len() - limit)
        } else {
            rows
        }
    }

    // ── Memories ──────────────────────────────────────────────────

    pub fn get_memory(&self, user_id: &str) -> Option<MemorySnapshot> {
        self.memories.read().get(user_id).cloned()
    }

    pub fn upsert_memory(&self, user_id: &str, snapshot: MemorySnapshot) {
        self.memories.write().insert(user_id.to_owned(), snapshot);
    }

    // ── Support tickets ───────────────────────────────────────────

    pub fn insert_ticket(&self, ticket: SupportTicket) {
        self.tickets.write().insert(ticket.id.clone(), ticket);
    }

    pub fn get_ticket(&self, ticket_id: &str) -> Option<SupportTicket> {
        self.tickets.read().get(ticket_id).cloned()
    }

    pub fn update_ticket(&self, ticket: SupportTicket) {
        self.tickets.write().insert(ticket.id.clone(), ticket);
    }

    /// Filter by owner (user id when known, else guest session), optional
    /// status; newest first.
    pub fn list_tickets(
        &self,
        user_id: Option<&str>,
        session_id: Option<&str>,
        status: Option<&str>,
        limit: usize,
    ) -> Vec<SupportTicket> {
        let tickets = self.tickets.read();
        let mut rows: Vec<SupportTicket> = tickets
            .values()
            .filter(|t| match (user_id, session_id) {
                (Some(uid), _) => t.user_id.as_deref() == Some(uid),
                (None, Some(sid)) => t.session_id == sid,
                (None, None) => true,
            })
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        rows
    }

    // ── Notifications ─────────────────────────────────────────────

    pub fn append_notification(&self, notification: Notification) {
        self.notifications.write().push(notification);
    }

    pub fn list_notifications_for_user(&self, user_id: &str) -> Vec<Notification> {
        self.notifications
            .read()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    // ── Admin activity log ────────────────────────────────────────

    pub fn append_admin_activity(&self, entry: AdminActivityEntry) {
        self.admin_activity.write().push(entry);
    }

    pub fn last_admin_entry_hash(&self) -> String {
        self.admin_activity
            .read()
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_default()
    }

    /// Last `limit` entries in insertion order.
    pub fn admin_activity_tail(&self, limit: usize) -> Vec<AdminActivityEntry> {
        let logs = self.admin_activity.read();
        let start = logs.len().saturating_sub(limit);
        logs[start..].to_vec()
    }

    // ── Voice settings ────────────────────────────────────────────

    pub fn voice_settings(&self) -> Option<VoiceSettings> {
        self.voice_settings.read().clone()
    }

    pub fn set_voice_settings(&self, settings: VoiceSettings) {
        *self.voice_settings.write() = Some(settings);
    }

    // ── Voice jobs ────────────────────────────────────────────────

    pub fn insert_voice_job(&self, job: VoiceJob) {
        self.voice_jobs.write().insert(job.id.clone(), job);
    }

    pub fn get_voice_job(&self, job_id: &str) -> Option<VoiceJob> {
        self.voice_jobs.read().get(job_id).cloned()
    }

    pub fn update_voice_job(&self, job: VoiceJob) {
        self.voice_jobs.write().insert(job.id.clone(), job);
    }

    pub fn list_voice_jobs(&self) -> Vec<VoiceJob> {
        self.voice_jobs.read().values().cloned().collect()
    }

    // ── Voice calls ───────────────────────────────────────────────

    pub fn insert_voice_call(&self, call: VoiceCall) {
        self.voice_calls.write().insert(call.id.clone(), call);
    }

    pub fn get_voice_call(&self, call_id: &str) -> Option<VoiceCall> {
        self.voice_calls.read().get(call_id).cloned()
    }

    pub fn update_voice_call(&self, call: VoiceCall) {
        self.voice_calls.write().insert(call.id.clone(), call);
    }

    pub fn list_voice_calls(&self) -> Vec<VoiceCall> {
        self.voice_calls.read().values().cloned().collect()
    }

    pub fn find_voice_call_by_recovery_key(&self, recovery_key: &str) -> Option<VoiceCall> {
        self.voice_calls
            .read()
            .values()
            .find(|c| c.recovery_key == recovery_key)
            .cloned()
    }

    pub fn find_voice_call_by_provider_id(&self, provider_call_id: &str) -> Option<VoiceCall> {
        self.voice_calls
            .read()
            .values()
            .find(|c| c.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned()
    }

    // ── Voice suppressions ────────────────────────────────────────

    pub fn upsert_suppression(&self, suppression: VoiceSuppression) {
        self.voice_suppressions
            .write()
            .insert(suppression.user_id.clone(), suppression);
    }

    pub fn remove_suppression(&self, user_id: &str) {
        self.voice_suppressions.write().remove(user_id);
    }

    pub fn is_suppressed(&self, user_id: &str) -> bool {
        self.voice_suppressions.read().contains_key(user_id)
    }

    pub fn list_suppressions(&self) -> Vec<VoiceSuppression> {
        self.voice_suppressions.read().values().cloned().collect()
    }

    // ── Voice alerts ──────────────────────────────────────────────

    pub fn append_voice_alert(&self, alert: VoiceAlert) {
        let mut alerts = self.voice_alerts.write();
        alerts.push(alert);
        if alerts.len() > ALERT_RING_CAPACITY {
            let overflow = alerts.len() - ALERT_RING_CAPACITY;
            alerts.drain(..overflow);
        }
    }

    pub fn list_voice_alerts(&self) -> Vec<VoiceAlert> {
        self.voice_alerts.read().clone()
    }

    // ── Voice call idempotency ────────────────────────────────────

    pub fn voice_idempotency_contains(&self, recovery_key: &str) -> bool {
        self.voice_call_idempotency.read().contains_key(recovery_key)
    }

    pub fn set_voice_idempotency(&self, recovery_key: &str, marker: &str) {
        self.voice_call_idempotency
            .write()
            .insert(recovery_key.to_owned(), marker.to_owned());
    }
}
