//! Support agent: ticket lifecycle plus a few canned answers for common
//! questions.

use serde_json::{json, Value};
use std::sync::Arc;

use oc_commerce::SupportService;
use oc_domain::action::{ActionName, AgentAction, AgentName};
use oc_domain::context::AgentContext;
use oc_domain::response::{AgentExecutionResult, SuggestedAction};
use oc_domain::JsonMap;

use crate::params::str_param;
use crate::Agent;

pub struct SupportAgent {
    support: Arc<SupportService>,
}

impl SupportAgent {
    pub fn new(support: Arc<SupportService>) -> Self {
        Self { support }
    }

    fn create_ticket(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let query = str_param(params, "query");
        let lower = query.to_lowercase();
        let category = infer_category(&lower);
        let priority = if ["urgent", "asap", "immediately"]
            .iter()
            .any(|token| lower.contains(token))
        {
            "high"
        } else {
            "normal"
        };
        let issue = if query.is_empty() {
            "User requested human escalation"
        } else {
            &query
        };
        let ticket = self.support.ensure_open_ticket(
            context.user_id.as_deref(),
            &context.session_id,
            issue,
            category,
            priority,
            &context.channel,
        );
        let mut data = JsonMap::new();
        data.insert("escalation".into(), json!(true));
        data.insert("ticket".into(), json!(ticket));
        AgentExecutionResult::ok(
            format!(
                "I opened support ticket {} with priority {}. A human agent will follow up soon.",
                ticket.id, ticket.priority
            ),
            data,
        )
        .with_next_actions(vec![
            SuggestedAction::new("Check ticket status", "ticket status"),
            SuggestedAction::new("Continue shopping", "search:running shoes"),
        ])
    }

    fn ticket_status(&self, context: &AgentContext) -> AgentExecutionResult {
        let tickets = self.support.list_tickets(
            context.user_id.as_deref(),
            if context.user_id.is_none() {
                Some(&context.session_id)
            } else {
                None
            },
            None,
            10,
        );
        if tickets.is_empty() {
            let mut data = JsonMap::new();
            data.insert("tickets".into(), json!([]));
            return AgentExecutionResult::ok("You have no support tickets yet.", data)
                .with_next_actions(vec![SuggestedAction::new(
                    "Open support ticket",
                    "talk to support",
                )]);
        }
        let latest = &tickets[0];
        let mut data = JsonMap::new();
        data.insert("tickets".into(), json!(tickets.iter().take(3).collect::<Vec<_>>()));
        data.insert("ticket".into(), json!(latest));
        AgentExecutionResult::ok(
            format!(
                "Latest ticket {} is {} with priority {}.",
                latest.id, latest.status, latest.priority
            ),
            data,
        )
        .with_next_actions(vec![SuggestedAction::new(
            "Close ticket",
            format!("close ticket {}", latest.id),
        )])
    }

    fn close_ticket(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let mut ticket_id = str_param(params, "ticketId");
        if ticket_id.is_empty() {
            let open = self.support.list_tickets(
                context.user_id.as_deref(),
                if context.user_id.is_none() {
                    Some(&context.session_id)
                } else {
                    None
                },
                Some("open"),
                1,
            );
            if let Some(top) = open.first() {
                ticket_id = top.id.clone();
            }
        }
        if ticket_id.is_empty() {
            return AgentExecutionResult::failure(
                "I couldn't find an open ticket to close.",
                JsonMap::new(),
            );
        }
        match self.support.update_ticket(
            &ticket_id,
            Some("resolved"),
            Some("Customer marked ticket as resolved."),
            "customer",
        ) {
            Ok(ticket) => {
                let mut data = JsonMap::new();
                data.insert("ticket".into(), json!(ticket));
                AgentExecutionResult::ok(
                    format!("Ticket {} is now marked as resolved.", ticket.id),
                    data,
                )
                .with_next_actions(vec![SuggestedAction::new(
                    "Continue shopping",
                    "search:running shoes",
                )])
            }
            Err(_) => AgentExecutionResult::failure(
                format!("I couldn't find ticket {ticket_id}."),
                JsonMap::new(),
            ),
        }
    }

    fn answer_question(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let query = str_param(params, "query");
        let lower = query.to_lowercase();

        if lower.contains("return") {
            let mut data = JsonMap::new();
            data.insert("topic".into(), json!("returns"));
            return AgentExecutionResult::ok(
                "Most items can be returned within 30 days if unused and in original packaging.",
                data,
            )
            .with_next_actions(vec![SuggestedAction::new(
                "Show shoes",
                "search:running shoes",
            )]);
        }
        if lower.contains("size") {
            let mut data = JsonMap::new();
            data.insert("topic".into(), json!("sizing"));
            return AgentExecutionResult::ok(
                "If you're between sizes, we usually recommend sizing up for running shoes.",
                data,
            )
            .with_next_actions(vec![SuggestedAction::new(
                "Find size 10 shoes",
                "search:size_10_shoes",
            )]);
        }
        if lower.contains("human") || lower.contains("agent") || lower.contains("ticket") {
            return self.create_ticket(params, context);
        }

        let mut data = JsonMap::new();
        data.insert(
            "capabilities".into(),
            json!(["search", "cart", "checkout", "order_status", "returns"]),
        );
        AgentExecutionResult::ok(
            "I can help with product search, cart updates, checkout, order status, and \
             returns questions.",
            data,
        )
        .with_next_actions(vec![
            SuggestedAction::new("Search products", "search:running shoes"),
            SuggestedAction::new("Show cart", "view_cart"),
        ])
    }
}

fn infer_category(lower_query: &str) -> &'static str {
    if lower_query.contains("order") || lower_query.contains("delivery") {
        return "order_issue";
    }
    if lower_query.contains("payment") || lower_query.contains("refund") {
        return "billing_issue";
    }
    if lower_query.contains("size") || lower_query.contains("fit") {
        return "sizing";
    }
    "general"
}

impl Agent for SupportAgent {
    fn name(&self) -> AgentName {
        AgentName::Support
    }

    fn execute(&self, action: &AgentAction, context: &AgentContext) -> AgentExecutionResult {
        match action.name {
            ActionName::CreateTicket => self.create_ticket(&action.params, context),
            ActionName::TicketStatus => self.ticket_status(context),
            ActionName::CloseTicket => self.close_ticket(&action.params, context),
            ActionName::AnswerQuestion => self.answer_question(&action.params, context),
            other => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("UNSUPPORTED_ACTION"));
                AgentExecutionResult::failure(
                    format!("The support agent can't handle {other}."),
                    data,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oc_domain::commerce::{ConversationState, SessionRecord};
    use oc_store::Store;

    fn agent() -> SupportAgent {
        SupportAgent::new(Arc::new(SupportService::new(Arc::new(Store::new()))))
    }

    fn context() -> AgentContext {
        let now = Utc::now();
        AgentContext {
            session_id: "sess-1".into(),
            user_id: Some("user_1".into()),
            channel: "web".into(),
            session: SessionRecord {
                session_id: "sess-1".into(),
                user_id: Some("user_1".into()),
                channel: "web".into(),
                conversation: ConversationState::default(),
                created_at: now,
                last_activity: now,
            },
            cart: None,
            preferences: None,
            memory: None,
            recent_messages: vec![],
        }
    }

    fn run(agent: &SupportAgent, name: ActionName, params: Value) -> AgentExecutionResult {
        agent.execute(
            &AgentAction::new(name, params.as_object().cloned().unwrap_or_default()),
            &context(),
        )
    }

    #[test]
    fn urgent_wording_raises_priority() {
        let agent = agent();
        let result = run(
            &agent,
            ActionName::CreateTicket,
            json!({"query": "urgent: my order is missing"}),
        );
        assert!(result.success);
        assert_eq!(result.data["ticket"]["priority"], "high");
        assert_eq!(result.data["ticket"]["category"], "order_issue");
    }

    #[test]
    fn second_escalation_reuses_open_ticket() {
        let agent = agent();
        let first = run(&agent, ActionName::CreateTicket, json!({"query": "order issue"}));
        let second = run(&agent, ActionName::CreateTicket, json!({"query": "still broken"}));
        assert_eq!(first.data["ticket"]["id"], second.data["ticket"]["id"]);
    }

    #[test]
    fn ticket_status_without_tickets() {
        let agent = agent();
        let result = run(&agent, ActionName::TicketStatus, json!({}));
        assert!(result.success);
        assert!(result.message.contains("no support tickets"));
    }

    #[test]
    fn close_ticket_defaults_to_latest_open() {
        let agent = agent();
        run(&agent, ActionName::CreateTicket, json!({"query": "help"}));
        let result = run(&agent, ActionName::CloseTicket, json!({}));
        assert!(result.success, "{}", result.message);
        assert_eq!(result.data["ticket"]["status"], "resolved");
    }

    #[test]
    fn returns_question_answers_inline() {
        let agent = agent();
        let result = run(
            &agent,
            ActionName::AnswerQuestion,
            json!({"query": "what is the return policy"}),
        );
        assert!(result.success);
        assert_eq!(result.data["topic"], "returns");
    }

    #[test]
    fn human_request_escalates_to_ticket() {
        let agent = agent();
        let result = run(
            &agent,
            ActionName::AnswerQuestion,
            json!({"query": "let me talk to a human"}),
        );
        assert!(result.success);
        assert_eq!(result.data["escalation"], true);
    }
}
