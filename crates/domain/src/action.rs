//! Typed agent actions: the closed action vocabulary, the per-action
//! parameter allow-lists, and the agent the action canonically targets.
//!
//! The allow-lists are the single source of truth for the deterministic
//! extractor, the planner output validator, and the tests that assert
//! allow-list closure over adversarial planner JSON.

use serde::{Deserialize, Serialize};

use crate::JsonMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent names
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Product,
    Cart,
    Order,
    Support,
    Memory,
    Orchestrator,
}

impl AgentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Product => "product",
            AgentName::Cart => "cart",
            AgentName::Order => "order",
            AgentName::Support => "support",
            AgentName::Memory => "memory",
            AgentName::Orchestrator => "orchestrator",
        }
    }

    pub fn parse(raw: &str) -> Option<AgentName> {
        match raw.trim() {
            "product" => Some(AgentName::Product),
            "cart" => Some(AgentName::Cart),
            "order" => Some(AgentName::Order),
            "support" => Some(AgentName::Support),
            "memory" => Some(AgentName::Memory),
            "orchestrator" => Some(AgentName::Orchestrator),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action names
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every operation an agent can execute. Planner output naming anything
/// else is dropped before it reaches an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    SearchProducts,
    AddItem,
    AddMultipleItems,
    UpdateItem,
    AdjustItemQuantity,
    RemoveItem,
    ClearCart,
    ApplyDiscount,
    GetCart,
    CheckoutSummary,
    GetOrderStatus,
    CancelOrder,
    RequestRefund,
    ChangeOrderAddress,
    ShowMemory,
    SavePreference,
    ForgetPreference,
    ClearMemory,
    CreateTicket,
    TicketStatus,
    CloseTicket,
    AnswerQuestion,
}

impl ActionName {
    pub const ALL: [ActionName; 22] = [
        ActionName::SearchProducts,
        ActionName::AddItem,
        ActionName::AddMultipleItems,
        ActionName::UpdateItem,
        ActionName::AdjustItemQuantity,
        ActionName::RemoveItem,
        ActionName::ClearCart,
        ActionName::ApplyDiscount,
        ActionName::GetCart,
        ActionName::CheckoutSummary,
        ActionName::GetOrderStatus,
        ActionName::CancelOrder,
        ActionName::RequestRefund,
        ActionName::ChangeOrderAddress,
        ActionName::ShowMemory,
        ActionName::SavePreference,
        ActionName::ForgetPreference,
        ActionName::ClearMemory,
        ActionName::CreateTicket,
        ActionName::TicketStatus,
        ActionName::CloseTicket,
        ActionName::AnswerQuestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::SearchProducts => "search_products",
            ActionName::AddItem => "add_item",
            ActionName::AddMultipleItems => "add_multiple_items",
            ActionName::UpdateItem => "update_item",
            ActionName::AdjustItemQuantity => "adjust_item_quantity",
            ActionName::RemoveItem => "remove_item",
            ActionName::ClearCart => "clear_cart",
            ActionName::ApplyDiscount => "apply_discount",
            ActionName::GetCart => "get_cart",
            ActionName::CheckoutSummary => "checkout_summary",
            ActionName::GetOrderStatus => "get_order_status",
            ActionName::CancelOrder => "cancel_order",
            ActionName::RequestRefund => "request_refund",
            ActionName::ChangeOrderAddress => "change_order_address",
            ActionName::ShowMemory => "show_memory",
            ActionName::SavePreference => "save_preference",
            ActionName::ForgetPreference => "forget_preference",
            ActionName::ClearMemory => "clear_memory",
            ActionName::CreateTicket => "create_ticket",
            ActionName::TicketStatus => "ticket_status",
            ActionName::CloseTicket => "close_ticket",
            ActionName::AnswerQuestion => "answer_question",
        }
    }

    pub fn parse(raw: &str) -> Option<ActionName> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == raw.trim())
    }

    /// The agent that owns this action when neither the extractor nor the
    /// planner names a target.
    pub fn canonical_target(&self) -> AgentName {
        match self {
            ActionName::SearchProducts => AgentName::Product,
            ActionName::AddItem
            | ActionName::AddMultipleItems
            | ActionName::UpdateItem
            | ActionName::AdjustItemQuantity
            | ActionName::RemoveItem
            | ActionName::ClearCart
            | ActionName::ApplyDiscount
            | ActionName::GetCart => AgentName::Cart,
            ActionName::CheckoutSummary
            | ActionName::GetOrderStatus
            | ActionName::CancelOrder
            | ActionName::RequestRefund
            | ActionName::ChangeOrderAddress => AgentName::Order,
            ActionName::ShowMemory
            | ActionName::SavePreference
            | ActionName::ForgetPreference
            | ActionName::ClearMemory => AgentName::Memory,
            ActionName::CreateTicket
            | ActionName::TicketStatus
            | ActionName::CloseTicket
            | ActionName::AnswerQuestion => AgentName::Support,
        }
    }

    /// Parameter keys this action accepts. Planner-supplied params outside
    /// this list are dropped during plan validation.
    pub fn allowed_params(&self) -> &'static [&'static str] {
        match self {
            ActionName::SearchProducts => &[
                "query", "category", "brand", "color", "size", "minPrice", "maxPrice",
            ],
            ActionName::AddItem => &[
                "productId",
                "variantId",
                "query",
                "color",
                "size",
                "brand",
                "quantity",
                "minPrice",
                "maxPrice",
            ],
            ActionName::AddMultipleItems => &["items"],
            ActionName::UpdateItem => &["itemId", "productId", "variantId", "query", "quantity"],
            ActionName::AdjustItemQuantity => {
                &["itemId", "productId", "variantId", "query", "delta"]
            }
            ActionName::RemoveItem => &["itemId", "productId", "variantId", "query", "quantity"],
            ActionName::ClearCart => &[],
            ActionName::ApplyDiscount => &["code"],
            ActionName::GetCart => &[],
            ActionName::CheckoutSummary => &[],
            ActionName::GetOrderStatus => &["orderId"],
            ActionName::CancelOrder => &["orderId"],
            ActionName::RequestRefund => &["orderId", "reason"],
            ActionName::ChangeOrderAddress => &["orderId", "shippingAddress"],
            ActionName::ShowMemory => &[],
            ActionName::SavePreference => &["updates"],
            ActionName::ForgetPreference => &["key", "value"],
            ActionName::ClearMemory => &[],
            ActionName::CreateTicket => &["query", "priority", "category"],
            ActionName::TicketStatus => &["ticketId"],
            ActionName::CloseTicket => &["ticketId"],
            ActionName::AnswerQuestion => &["query"],
        }
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One executable operation with its (already allow-listed) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    pub name: ActionName,
    #[serde(default)]
    pub params: JsonMap,
    /// Explicit routing override. `None` falls back to the router's
    /// default for the request intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<AgentName>,
}

impl AgentAction {
    pub fn new(name: ActionName, params: JsonMap) -> Self {
        Self {
            name,
            params,
            target_agent: None,
        }
    }

    pub fn targeting(name: ActionName, params: JsonMap, target: AgentName) -> Self {
        Self {
            name,
            params,
            target_agent: Some(target),
        }
    }
}
