//! The closed set of conversational intents and the classifier result.

use serde::{Deserialize, Serialize};

use crate::JsonMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supported intents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every goal an utterance can classify into. Closed set: anything the
/// rule classifier or the LLM produces outside this list is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportedIntent {
    ProductSearch,
    SearchAndAddToCart,
    AddToCart,
    AddMultipleToCart,
    UpdateCart,
    AdjustCartQuantity,
    RemoveFromCart,
    ClearCart,
    ApplyDiscount,
    ViewCart,
    Checkout,
    OrderStatus,
    ChangeOrderAddress,
    CancelOrder,
    RequestRefund,
    MultiStatus,
    ShowMemory,
    SavePreference,
    ForgetPreference,
    ClearMemory,
    SupportEscalation,
    SupportStatus,
    SupportClose,
    GeneralQuestion,
}

impl SupportedIntent {
    pub const ALL: [SupportedIntent; 24] = [
        SupportedIntent::ProductSearch,
        SupportedIntent::SearchAndAddToCart,
        SupportedIntent::AddToCart,
        SupportedIntent::AddMultipleToCart,
        SupportedIntent::UpdateCart,
        SupportedIntent::AdjustCartQuantity,
        SupportedIntent::RemoveFromCart,
        SupportedIntent::ClearCart,
        SupportedIntent::ApplyDiscount,
        SupportedIntent::ViewCart,
        SupportedIntent::Checkout,
        SupportedIntent::OrderStatus,
        SupportedIntent::ChangeOrderAddress,
        SupportedIntent::CancelOrder,
        SupportedIntent::RequestRefund,
        SupportedIntent::MultiStatus,
        SupportedIntent::ShowMemory,
        SupportedIntent::SavePreference,
        SupportedIntent::ForgetPreference,
        SupportedIntent::ClearMemory,
        SupportedIntent::SupportEscalation,
        SupportedIntent::SupportStatus,
        SupportedIntent::SupportClose,
        SupportedIntent::GeneralQuestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedIntent::ProductSearch => "product_search",
            SupportedIntent::SearchAndAddToCart => "search_and_add_to_cart",
            SupportedIntent::AddToCart => "add_to_cart",
            SupportedIntent::AddMultipleToCart => "add_multiple_to_cart",
            SupportedIntent::UpdateCart => "update_cart",
            SupportedIntent::AdjustCartQuantity => "adjust_cart_quantity",
            SupportedIntent::RemoveFromCart => "remove_from_cart",
            SupportedIntent::ClearCart => "clear_cart",
            SupportedIntent::ApplyDiscount => "apply_discount",
            SupportedIntent::ViewCart => "view_cart",
            SupportedIntent::Checkout => "checkout",
            SupportedIntent::OrderStatus => "order_status",
            SupportedIntent::ChangeOrderAddress => "change_order_address",
            SupportedIntent::CancelOrder => "cancel_order",
            SupportedIntent::RequestRefund => "request_refund",
            SupportedIntent::MultiStatus => "multi_status",
            SupportedIntent::ShowMemory => "show_memory",
            SupportedIntent::SavePreference => "save_preference",
            SupportedIntent::ForgetPreference => "forget_preference",
            SupportedIntent::ClearMemory => "clear_memory",
            SupportedIntent::SupportEscalation => "support_escalation",
            SupportedIntent::SupportStatus => "support_status",
            SupportedIntent::SupportClose => "support_close",
            SupportedIntent::GeneralQuestion => "general_question",
        }
    }

    /// Parse a tag back into the closed set. Returns `None` for anything
    /// outside it (unknown LLM output, typos in stored records).
    pub fn parse(raw: &str) -> Option<SupportedIntent> {
        Self::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == raw.trim())
    }
}

impl std::fmt::Display for SupportedIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classifier result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of classifying one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub name: SupportedIntent,
    /// Clamped to `[0, 1]` on construction.
    pub confidence: f64,
    /// Utterance-derived entities (quantity, price bounds, ids, ...).
    pub entities: JsonMap,
}

impl IntentResult {
    pub fn new(name: SupportedIntent, confidence: f64, entities: JsonMap) -> Self {
        Self {
            name,
            confidence: confidence.clamp(0.0, 1.0),
            entities,
        }
    }
}
