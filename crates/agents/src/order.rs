//! Order agent: checkout summary, status reads, and the state-guarded
//! order mutations.

use serde_json::{json, Value};
use std::sync::Arc;

use oc_commerce::{CartService, OrderService};
use oc_domain::action::{ActionName, AgentAction, AgentName};
use oc_domain::commerce::ShippingAddress;
use oc_domain::context::AgentContext;
use oc_domain::error::Error;
use oc_domain::response::{AgentExecutionResult, SuggestedAction};
use oc_domain::JsonMap;

use crate::params::str_param;
use crate::Agent;

pub struct OrderAgent {
    orders: Arc<OrderService>,
    carts: Arc<CartService>,
}

impl OrderAgent {
    pub fn new(orders: Arc<OrderService>, carts: Arc<CartService>) -> Self {
        Self { orders, carts }
    }

    fn require_user(context: &AgentContext) -> Result<&str, AgentExecutionResult> {
        match context.user_id.as_deref() {
            Some(user_id) => Ok(user_id),
            None => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("AUTH_REQUIRED"));
                Err(AgentExecutionResult::failure(
                    "Please sign in to manage orders.",
                    data,
                ))
            }
        }
    }

    fn checkout_summary(&self, context: &AgentContext) -> AgentExecutionResult {
        let cart = self
            .carts
            .get_cart(context.user_id.as_deref(), &context.session_id);
        if cart.items.is_empty() {
            let mut data = JsonMap::new();
            data.insert("cart".into(), json!(cart));
            return AgentExecutionResult::failure(
                "Your cart is empty, there is nothing to check out.",
                data,
            )
            .with_next_actions(vec![SuggestedAction::new(
                "Search products",
                "search:running shoes",
            )]);
        }
        let mut data = JsonMap::new();
        data.insert("cart".into(), json!(cart));
        data.insert("readyForCheckout".into(), json!(context.user_id.is_some()));
        let message = if context.user_id.is_some() {
            format!(
                "You have {} item(s) totaling ${:.2}. Confirm to place the order.",
                cart.item_count, cart.total
            )
        } else {
            format!(
                "You have {} item(s) totaling ${:.2}. Sign in to place the order.",
                cart.item_count, cart.total
            )
        };
        AgentExecutionResult::ok(message, data).with_next_actions(vec![
            SuggestedAction::new("Place order", "place_order"),
            SuggestedAction::new("Keep shopping", "search:more"),
        ])
    }

    fn order_status(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        let order_id = str_param(params, "orderId");
        let order_ref = if order_id.is_empty() {
            None
        } else {
            Some(order_id.as_str())
        };
        match self.orders.resolve_order(user_id, order_ref) {
            Ok(order) => {
                let mut data = JsonMap::new();
                data.insert("order".into(), json!(order));
                AgentExecutionResult::ok(
                    format!(
                        "Order {} is {} with a total of ${:.2}.",
                        order.id,
                        order.status.as_str(),
                        order.total
                    ),
                    data,
                )
                .with_next_actions(vec![SuggestedAction::new("Show my cart", "view_cart")])
            }
            Err(Error::NotFound(_)) => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("ORDER_NOT_FOUND"));
                AgentExecutionResult::failure(
                    "I couldn't find that order. You have no matching orders yet.",
                    data,
                )
            }
            Err(err) => order_error(err),
        }
    }

    fn cancel_order(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        let order_id = str_param(params, "orderId");
        let resolved = if order_id.is_empty() {
            self.orders.resolve_order(user_id, None)
        } else {
            self.orders.resolve_order(user_id, Some(&order_id))
        };
        let order = match resolved {
            Ok(order) => order,
            Err(err) => return order_error(err),
        };
        match self.orders.cancel_order(user_id, &order.id) {
            Ok(order) => {
                let mut data = JsonMap::new();
                data.insert("order".into(), json!(order));
                AgentExecutionResult::ok(format!("Order {} is now cancelled.", order.id), data)
            }
            Err(err) => order_error(err),
        }
    }

    fn request_refund(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        let order_id = str_param(params, "orderId");
        let resolved = if order_id.is_empty() {
            self.orders.resolve_order(user_id, None)
        } else {
            self.orders.resolve_order(user_id, Some(&order_id))
        };
        let order = match resolved {
            Ok(order) => order,
            Err(err) => return order_error(err),
        };
        match self.orders.request_refund(user_id, &order.id) {
            Ok(order) => {
                let mut data = JsonMap::new();
                data.insert("order".into(), json!(order));
                AgentExecutionResult::ok(
                    format!("A refund for order {} is on its way.", order.id),
                    data,
                )
            }
            Err(err) => order_error(err),
        }
    }

    fn change_order_address(
        &self,
        params: &JsonMap,
        context: &AgentContext,
    ) -> AgentExecutionResult {
        let user_id = match Self::require_user(context) {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };
        let Some(address) = params
            .get("shippingAddress")
            .and_then(|raw| serde_json::from_value::<ShippingAddress>(raw.clone()).ok())
        else {
            let mut data = JsonMap::new();
            data.insert("code".into(), json!("MISSING_ADDRESS"));
            return AgentExecutionResult::failure(
                "Give me the full address like: line1: ..., city: ..., state: ..., \
                 postal code: ..., country: ...",
                data,
            );
        };
        let order_id = str_param(params, "orderId");
        let resolved = if order_id.is_empty() {
            self.orders.resolve_order(user_id, None)
        } else {
            self.orders.resolve_order(user_id, Some(&order_id))
        };
        let order = match resolved {
            Ok(order) => order,
            Err(err) => return order_error(err),
        };
        match self
            .orders
            .update_shipping_address(user_id, &order.id, address)
        {
            Ok(order) => {
                let mut data = JsonMap::new();
                data.insert("order".into(), json!(order));
                AgentExecutionResult::ok(
                    format!("Updated the shipping address on order {}.", order.id),
                    data,
                )
            }
            Err(err) => order_error(err),
        }
    }
}

fn order_error(err: Error) -> AgentExecutionResult {
    let code = match &err {
        Error::NotFound(_) => "ORDER_NOT_FOUND",
        Error::Conflict(_) => "ORDER_STATE_CONFLICT",
        _ => "ORDER_ERROR",
    };
    let mut data = JsonMap::new();
    data.insert("code".into(), json!(code));
    AgentExecutionResult::failure(format!("I couldn't do that: {err}."), data)
}

impl Agent for OrderAgent {
    fn name(&self) -> AgentName {
        AgentName::Order
    }

    fn execute(&self, action: &AgentAction, context: &AgentContext) -> AgentExecutionResult {
        match action.name {
            ActionName::CheckoutSummary => self.checkout_summary(context),
            ActionName::GetOrderStatus => self.order_status(&action.params, context),
            ActionName::CancelOrder => self.cancel_order(&action.params, context),
            ActionName::RequestRefund => self.request_refund(&action.params, context),
            ActionName::ChangeOrderAddress => self.change_order_address(&action.params, context),
            other => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("UNSUPPORTED_ACTION"));
                AgentExecutionResult::failure(
                    format!("The order agent can't handle {other}."),
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
    use oc_commerce::NotificationService;
    use oc_domain::commerce::{ConversationState, Product, SessionRecord, Variant};
    use oc_domain::config::Config;
    use oc_store::Store;

    fn setup() -> (Arc<Store>, OrderAgent) {
        let store = Arc::new(Store::new());
        store.upsert_product(Product {
            id: "prod_1".into(),
            name: "Trail Runner X".into(),
            description: String::new(),
            category: "shoes".into(),
            brand: "StrideForge".into(),
            price: 100.0,
            rating: 4.5,
            images: vec![],
            variants: vec![Variant {
                id: "var_1".into(),
                size: "9".into(),
                color: "black".into(),
                in_stock: true,
            }],
        });
        let carts = Arc::new(CartService::new(store.clone(), &Config::default()));
        let notifications = Arc::new(NotificationService::new(store.clone()));
        let orders = Arc::new(OrderService::new(
            store.clone(),
            carts.clone(),
            notifications,
        ));
        (store, OrderAgent::new(orders, carts))
    }

    fn context(user_id: Option<&str>) -> AgentContext {
        let now = Utc::now();
        AgentContext {
            session_id: "sess-1".into(),
            user_id: user_id.map(str::to_owned),
            channel: "web".into(),
            session: SessionRecord {
                session_id: "sess-1".into(),
                user_id: user_id.map(str::to_owned),
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

    fn run(agent: &OrderAgent, ctx: &AgentContext, name: ActionName, params: Value) -> AgentExecutionResult {
        agent.execute(
            &AgentAction::new(name, params.as_object().cloned().unwrap_or_default()),
            ctx,
        )
    }

    #[test]
    fn guest_checkout_summary_prompts_sign_in() {
        let (store, agent) = setup();
        let ctx = context(None);
        let carts = CartService::new(store, &Config::default());
        carts.add_item(None, "sess-1", "prod_1", "var_1", 1).unwrap();
        let result = run(&agent, &ctx, ActionName::CheckoutSummary, json!({}));
        assert!(result.success);
        assert!(result.message.contains("Sign in"));
        assert_eq!(result.data["readyForCheckout"], false);
    }

    #[test]
    fn empty_cart_checkout_fails() {
        let (_store, agent) = setup();
        let result = run(&agent, &context(None), ActionName::CheckoutSummary, json!({}));
        assert!(!result.success);
    }

    #[test]
    fn order_status_requires_auth() {
        let (_store, agent) = setup();
        let result = run(&agent, &context(None), ActionName::GetOrderStatus, json!({}));
        assert!(!result.success);
        assert_eq!(result.data["code"], "AUTH_REQUIRED");
    }

    #[test]
    fn order_status_falls_back_to_latest_order() {
        let (store, agent) = setup();
        let carts = Arc::new(CartService::new(store.clone(), &Config::default()));
        let notifications = Arc::new(NotificationService::new(store.clone()));
        let orders = OrderService::new(store, carts.clone(), notifications);
        carts
            .add_item(Some("user_1"), "sess-1", "prod_1", "var_1", 1)
            .unwrap();
        orders.create_order("user_1", None, "idem-1").unwrap();

        let result = run(&agent, &context(Some("user_1")), ActionName::GetOrderStatus, json!({}));
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("confirmed"));
    }

    #[test]
    fn cancelling_twice_surfaces_conflict_code() {
        let (store, agent) = setup();
        let carts = Arc::new(CartService::new(store.clone(), &Config::default()));
        let notifications = Arc::new(NotificationService::new(store.clone()));
        let orders = OrderService::new(store, carts.clone(), notifications);
        carts
            .add_item(Some("user_1"), "sess-1", "prod_1", "var_1", 1)
            .unwrap();
        let order = orders.create_order("user_1", None, "idem-1").unwrap();

        let ctx = context(Some("user_1"));
        let first = run(&agent, &ctx, ActionName::CancelOrder, json!({"orderId": order.id}));
        assert!(first.success);
        let second = run(&agent, &ctx, ActionName::CancelOrder, json!({"orderId": order.id}));
        assert!(!second.success);
        assert_eq!(second.data["code"], "ORDER_STATE_CONFLICT");
    }

    #[test]
    fn address_change_needs_full_address() {
        let (_store, agent) = setup();
        let result = run(
            &agent,
            &context(Some("user_1")),
            ActionName::ChangeOrderAddress,
            json!({"orderId": "order_1"}),
        );
        assert!(!result.success);
        assert_eq!(result.data["code"], "MISSING_ADDRESS");
    }
}
