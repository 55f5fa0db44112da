//! Support ticket lifecycle. `ensure_open_ticket` keeps at most one open
//! ticket per owner by appending follow-ups to the latest open one.

use std::sync::Arc;

use oc_domain::commerce::{SupportTicket, TicketMessage};
use oc_domain::error::{Error, Result};
use oc_store::Store;

const TICKET_STATUSES: [&str; 4] = ["open", "in_progress", "resolved", "closed"];
const TICKET_PRIORITIES: [&str; 4] = ["low", "normal", "high", "urgent"];

pub struct SupportService {
    store: Arc<Store>,
}

impl SupportService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create_ticket(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        issue: &str,
        category: &str,
        priority: &str,
        channel: &str,
    ) -> SupportTicket {
        let normalized_priority = priority.trim().to_lowercase();
        let priority = if TICKET_PRIORITIES.contains(&normalized_priority.as_str()) {
            normalized_priority
        } else {
            "normal".to_owned()
        };
        let category = {
            let c = category.trim().to_lowercase();
            if c.is_empty() {
                "general".to_owned()
            } else {
                c
            }
        };
        let now = self.store.now();
        let ticket = SupportTicket {
            id: self.store.ids.next("ticket"),
            user_id: user_id.map(str::to_owned),
            session_id: session_id.to_owned(),
            issue: issue.trim().to_owned(),
            category,
            priority,
            status: "open".into(),
            channel: channel.to_owned(),
            messages: vec![TicketMessage {
                actor: "customer".into(),
                message: issue.trim().to_owned(),
                timestamp: now,
            }],
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_ticket(ticket.clone());
        ticket
    }

    pub fn get_ticket(&self, ticket_id: &str) -> Result<SupportTicket> {
        self.store
            .get_ticket(ticket_id)
            .ok_or_else(|| Error::NotFound(format!("ticket {ticket_id}")))
    }

    /// Newest first. Owner is the user when known, else the guest session.
    pub fn list_tickets(
        &self,
        user_id: Option<&str>,
        session_id: Option<&str>,
        status: Option<&str>,
        limit: usize,
    ) -> Vec<SupportTicket> {
        self.store.list_tickets(user_id, session_id, status, limit)
    }

    pub fn update_ticket(
        &self,
        ticket_id: &str,
        status: Option<&str>,
        note: Option<&str>,
        actor: &str,
    ) -> Result<SupportTicket> {
        let mut ticket = self.get_ticket(ticket_id)?;

        if let Some(raw) = status {
            let normalized = raw.trim().to_lowercase();
            if !TICKET_STATUSES.contains(&normalized.as_str()) {
                return Err(Error::Validation(format!("invalid ticket status {raw}")));
            }
            ticket.status = normalized;
        }

        let now = self.store.now();
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            ticket.messages.push(TicketMessage {
                actor: actor.to_owned(),
                message: note.trim().to_owned(),
                timestamp: now,
            });
        }

        if matches!(ticket.status.as_str(), "resolved" | "closed") {
            let resolution = note
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_owned)
                .or(ticket.resolution.clone())
                .unwrap_or_else(|| "Resolved by support".to_owned());
            ticket.resolution = Some(resolution);
        }
        ticket.updated_at = now;
        self.store.update_ticket(ticket.clone());
        Ok(ticket)
    }

    /// Re-use the latest open ticket for this owner, or open a new one.
    pub fn ensure_open_ticket(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        issue: &str,
        category: &str,
        priority: &str,
        channel: &str,
    ) -> SupportTicket {
        let existing = self.list_tickets(
            user_id,
            if user_id.is_none() {
                Some(session_id)
            } else {
                None
            },
            Some("open"),
            10,
        );
        if let Some(top) = existing.first() {
            let note = format!("Customer follow-up: {}", issue.trim());
            if let Ok(updated) = self.update_ticket(&top.id, None, Some(&note), "customer") {
                return updated;
            }
        }
        self.create_ticket(user_id, session_id, issue, category, priority, channel)
    }
}
