//! Order lifecycle: idempotent creation from the user's cart, status
//! reads, and the state-guarded mutations.

use std::sync::Arc;

use oc_domain::commerce::{Order, OrderStatus, ShippingAddress};
use oc_domain::error::{Error, Result};
use oc_store::Store;

use crate::carts::CartService;
use crate::notifications::NotificationService;

pub struct OrderService {
    store: Arc<Store>,
    carts: Arc<CartService>,
    notifications: Arc<NotificationService>,
}

impl OrderService {
    pub fn new(
        store: Arc<Store>,
        carts: Arc<CartService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            carts,
            notifications,
        }
    }

    /// Create an order from the user's cart. The same `(user,
    /// Idempotency-Key)` pair always yields the same order.
    pub fn create_order(
        &self,
        user_id: &str,
        shipping_address: Option<ShippingAddress>,
        idempotency_key: &str,
    ) -> Result<Order> {
        let trimmed_key = idempotency_key.trim();
        if trimmed_key.is_empty() {
            return Err(Error::Validation("missing Idempotency-Key header".into()));
        }
        let key = format!("{user_id}:{trimmed_key}");
        if let Some(existing_id) = self.store.order_for_idempotency_key(&key) {
            if let Some(existing) = self.store.get_order(&existing_id) {
                return Ok(existing);
            }
        }

        let cart = self.carts.get_cart(Some(user_id), "");
        if cart.items.is_empty() {
            return Err(Error::Validation("cart is empty".into()));
        }

        let now = self.store.now();
        let order = Order {
            id: self.store.ids.next("order"),
            user_id: user_id.to_owned(),
            session_id: cart.session_id.clone(),
            items: cart.items.clone(),
            subtotal: cart.subtotal,
            tax: cart.tax,
            shipping: cart.shipping,
            discount: cart.discount,
            total: cart.total,
            status: OrderStatus::Confirmed,
            shipping_address,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_order(order.clone());
        self.store.remember_idempotency_key(&key, &order.id);
        self.carts.mark_cart_converted_for_user(user_id);
        self.notifications.send_order_confirmation(user_id, &order);
        Ok(order)
    }

    pub fn get_order(&self, user_id: &str, order_id: &str) -> Result<Order> {
        self.store
            .get_order(order_id)
            .filter(|order| order.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("order {order_id}")))
    }

    /// Most recent first.
    pub fn list_orders(&self, user_id: &str) -> Vec<Order> {
        self.store.list_orders_for_user(user_id)
    }

    /// The order referenced by id, or the user's latest when none given.
    pub fn resolve_order(&self, user_id: &str, order_id: Option<&str>) -> Result<Order> {
        match order_id {
            Some(id) => self.get_order(user_id, id),
            None => self
                .list_orders(user_id)
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound("no orders yet".into())),
        }
    }

    pub fn cancel_order(&self, user_id: &str, order_id: &str) -> Result<Order> {
        let mut order = self.get_order(user_id, order_id)?;
        if matches!(
            order.status,
            OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Refunded
        ) {
            return Err(Error::Conflict("order can no longer be cancelled".into()));
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = self.store.now();
        self.store.update_order(order.clone());
        Ok(order)
    }

    pub fn request_refund(&self, user_id: &str, order_id: &str) -> Result<Order> {
        let mut order = self.get_order(user_id, order_id)?;
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
            return Err(Error::Conflict(
                "order cannot be refunded in its current state".into(),
            ));
        }
        order.status = OrderStatus::Refunded;
        order.updated_at = self.store.now();
        self.store.update_order(order.clone());
        Ok(order)
    }

    /// Address changes are only allowed before shipment.
    pub fn update_shipping_address(
        &self,
        user_id: &str,
        order_id: &str,
        address: ShippingAddress,
    ) -> Result<Order> {
        let mut order = self.get_order(user_id, order_id)?;
        if order.status != OrderStatus::Confirmed {
            return Err(Error::Conflict(
                "shipping address can only be changed before shipment".into(),
            ));
        }
        order.shipping_address = Some(address);
        order.updated_at = self.store.now();
        self.store.update_order(order.clone());
        Ok(order)
    }
}
