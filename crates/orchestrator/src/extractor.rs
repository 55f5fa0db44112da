//! Deterministic fallback: map one classified intent to its typed
//! action(s).

use serde_json::json;

use oc_domain::action::{ActionName, AgentAction, AgentName};
use oc_domain::intent::{IntentResult, SupportedIntent};
use oc_domain::JsonMap;

pub fn extract_actions(intent: &IntentResult) -> Vec<AgentAction> {
    let entities = intent.entities.clone();
    match intent.name {
        SupportedIntent::MultiStatus => vec![
            AgentAction::targeting(ActionName::GetCart, JsonMap::new(), AgentName::Cart),
            AgentAction::targeting(ActionName::GetOrderStatus, entities, AgentName::Order),
        ],
        SupportedIntent::ProductSearch => {
            vec![AgentAction::new(ActionName::SearchProducts, entities)]
        }
        SupportedIntent::SearchAndAddToCart => {
            let mut product_params = JsonMap::new();
            product_params.insert(
                "query".into(),
                entities.get("query").cloned().unwrap_or(json!("")),
            );
            for key in ["size", "color", "brand", "minPrice", "maxPrice"] {
                if let Some(value) = entities.get(key) {
                    if !value.is_null() {
                        product_params.insert(key.into(), value.clone());
                    }
                }
            }
            let mut add_params = JsonMap::new();
            for key in ["productId", "variantId", "size", "color"] {
                if let Some(value) = entities.get(key) {
                    if !value.is_null() {
                        add_params.insert(key.into(), value.clone());
                    }
                }
            }
            add_params.insert(
                "quantity".into(),
                entities.get("quantity").cloned().unwrap_or(json!(1)),
            );
            vec![
                AgentAction::targeting(
                    ActionName::SearchProducts,
                    product_params,
                    AgentName::Product,
                ),
                AgentAction::targeting(ActionName::AddItem, add_params, AgentName::Cart),
            ]
        }
        SupportedIntent::AddToCart => vec![AgentAction::new(ActionName::AddItem, entities)],
        SupportedIntent::AddMultipleToCart => {
            vec![AgentAction::new(ActionName::AddMultipleItems, entities)]
        }
        SupportedIntent::ApplyDiscount => {
            vec![AgentAction::new(ActionName::ApplyDiscount, entities)]
        }
        SupportedIntent::UpdateCart => vec![AgentAction::new(ActionName::UpdateItem, entities)],
        SupportedIntent::AdjustCartQuantity => {
            vec![AgentAction::new(ActionName::AdjustItemQuantity, entities)]
        }
        SupportedIntent::RemoveFromCart => {
            vec![AgentAction::new(ActionName::RemoveItem, entities)]
        }
        SupportedIntent::ClearCart => vec![AgentAction::new(ActionName::ClearCart, JsonMap::new())],
        SupportedIntent::ViewCart => vec![AgentAction::new(ActionName::GetCart, JsonMap::new())],
        SupportedIntent::Checkout => {
            vec![AgentAction::new(ActionName::CheckoutSummary, JsonMap::new())]
        }
        SupportedIntent::OrderStatus => {
            vec![AgentAction::new(ActionName::GetOrderStatus, entities)]
        }
        SupportedIntent::CancelOrder => vec![AgentAction::new(ActionName::CancelOrder, entities)],
        SupportedIntent::RequestRefund => {
            vec![AgentAction::new(ActionName::RequestRefund, entities)]
        }
        SupportedIntent::ChangeOrderAddress => {
            vec![AgentAction::new(ActionName::ChangeOrderAddress, entities)]
        }
        SupportedIntent::ShowMemory => {
            vec![AgentAction::new(ActionName::ShowMemory, JsonMap::new())]
        }
        SupportedIntent::SavePreference => {
            vec![AgentAction::new(ActionName::SavePreference, entities)]
        }
        SupportedIntent::ForgetPreference => {
            vec![AgentAction::new(ActionName::ForgetPreference, entities)]
        }
        SupportedIntent::ClearMemory => {
            vec![AgentAction::new(ActionName::ClearMemory, JsonMap::new())]
        }
        SupportedIntent::SupportEscalation => vec![AgentAction::targeting(
            ActionName::CreateTicket,
            entities,
            AgentName::Support,
        )],
        SupportedIntent::SupportStatus => vec![AgentAction::targeting(
            ActionName::TicketStatus,
            entities,
            AgentName::Support,
        )],
        SupportedIntent::SupportClose => vec![AgentAction::targeting(
            ActionName::CloseTicket,
            entities,
            AgentName::Support,
        )],
        SupportedIntent::GeneralQuestion => {
            vec![AgentAction::new(ActionName::AnswerQuestion, entities)]
        }
    }
}
