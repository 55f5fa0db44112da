//! Cart mutations and totals.

use std::sync::Arc;

use oc_domain::commerce::{AppliedDiscount, Cart, CartItem};
use oc_domain::config::Config;
use oc_domain::error::{Error, Result};
use oc_store::Store;

pub struct CartService {
    store: Arc<Store>,
    tax_rate: f64,
    shipping_fee: f64,
}

impl CartService {
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        Self {
            store,
            tax_rate: config.cart_tax_rate,
            shipping_fee: config.default_shipping_fee,
        }
    }

    pub fn get_cart(&self, user_id: Option<&str>, session_id: &str) -> Cart {
        self.get_or_create(user_id, session_id)
    }

    pub fn add_item(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        product_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> Result<Cart> {
        let product = self
            .store
            .get_product(product_id)
            .ok_or_else(|| Error::NotFound(format!("product {product_id}")))?;
        let variant = product
            .variants
            .iter()
            .find(|v| v.id == variant_id)
            .ok_or_else(|| Error::NotFound(format!("variant {variant_id}")))?;
        if !variant.in_stock {
            return Err(Error::Conflict("variant is out of stock".into()));
        }

        let mut cart = self.get_or_create(user_id, session_id);
        if let Some(index) = cart
            .items
            .iter()
            .position(|item| item.product_id == product_id && item.variant_id == variant_id)
        {
            cart.items[index].quantity += quantity;
        } else {
            cart.items.push(CartItem {
                item_id: self.store.ids.next("item"),
                product_id: product.id.clone(),
                variant_id: variant.id.clone(),
                name: product.name.clone(),
                price: product.price,
                quantity,
                image: product.images.first().cloned().unwrap_or_default(),
            });
        }
        self.recalculate(&mut cart);
        self.store.update_cart(cart.clone());
        Ok(cart)
    }

    pub fn update_item(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> Result<Cart> {
        let mut cart = self.get_or_create(user_id, session_id);
        let target = cart
            .items
            .iter_mut()
            .find(|item| item.item_id == item_id)
            .ok_or_else(|| Error::NotFound(format!("cart item {item_id}")))?;
        target.quantity = quantity;
        self.recalculate(&mut cart);
        self.store.update_cart(cart.clone());
        Ok(cart)
    }

    pub fn remove_item(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        item_id: &str,
    ) -> Result<Cart> {
        let mut cart = self.get_or_create(user_id, session_id);
        let before = cart.items.len();
        cart.items.retain(|item| item.item_id != item_id);
        if cart.items.len() == before {
            return Err(Error::NotFound(format!("cart item {item_id}")));
        }
        self.recalculate(&mut cart);
        self.store.update_cart(cart.clone());
        Ok(cart)
    }

    pub fn clear_cart(&self, user_id: Option<&str>, session_id: &str) -> Cart {
        let mut cart = self.get_or_create(user_id, session_id);
        cart.items.clear();
        cart.applied_discount = None;
        self.recalculate(&mut cart);
        self.store.update_cart(cart.clone());
        cart
    }

    /// `SAVE20` is the only code the catalog currently honors.
    pub fn apply_discount(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        code: &str,
    ) -> Result<Cart> {
        let normalized = code.trim().to_uppercase();
        if normalized != "SAVE20" {
            return Err(Error::Validation("invalid discount code".into()));
        }
        let mut cart = self.get_or_create(user_id, session_id);
        cart.applied_discount = Some(AppliedDiscount {
            code: normalized,
            kind: "percentage".into(),
            value: 20.0,
        });
        self.recalculate(&mut cart);
        self.store.update_cart(cart.clone());
        Ok(cart)
    }

    /// Move a guest session cart onto a user at login/checkout.
    pub fn attach_cart_to_user(&self, session_id: &str, user_id: &str) {
        if let Some(mut cart) = self.store.find_cart(None, session_id) {
            cart.user_id = Some(user_id.to_owned());
            self.recalculate(&mut cart);
            self.store.update_cart(cart);
        }
    }

    /// Empty the user's cart after a successful order.
    pub fn mark_cart_converted_for_user(&self, user_id: &str) {
        if let Some(mut cart) = self.store.find_cart(Some(user_id), "") {
            cart.items.clear();
            cart.applied_discount = None;
            self.recalculate(&mut cart);
            self.store.update_cart(cart);
        }
    }

    fn get_or_create(&self, user_id: Option<&str>, session_id: &str) -> Cart {
        if let Some(cart) = self.store.find_cart(user_id, session_id) {
            return cart;
        }
        let now = self.store.now();
        let cart = Cart {
            id: self.store.ids.next("cart"),
            user_id: user_id.map(str::to_owned),
            session_id: session_id.to_owned(),
            items: Vec::new(),
            subtotal: 0.0,
            tax: 0.0,
            shipping: 0.0,
            discount: 0.0,
            total: 0.0,
            item_count: 0,
            currency: "USD".into(),
            applied_discount: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_cart(cart.clone());
        cart
    }

    fn recalculate(&self, cart: &mut Cart) {
        let subtotal: f64 = cart
            .items
            .iter()
            .map(|item| item.price * f64::from(item.quantity))
            .sum();
        let discount = match &cart.applied_discount {
            Some(applied) if applied.kind == "percentage" => {
                round2(subtotal * applied.value / 100.0)
            }
            _ => 0.0,
        };
        let taxable_base = (subtotal - discount).max(0.0);
        let tax = round2(taxable_base * self.tax_rate);
        let shipping = if cart.items.is_empty() {
            0.0
        } else {
            self.shipping_fee
        };

        cart.subtotal = round2(subtotal);
        cart.tax = tax;
        cart.shipping = shipping;
        cart.discount = discount;
        cart.total = round2(taxable_base + tax + shipping);
        cart.item_count = cart.items.iter().map(|item| item.quantity).sum();
        cart.updated_at = self.store.now();
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_domain::commerce::{Product, Variant};

    fn service() -> CartService {
        let store = Arc::new(Store::new());
        store.upsert_product(Product {
            id: "prod_1".into(),
            name: "Trail Runner X".into(),
            description: String::new(),
            category: "shoes".into(),
            brand: "StrideForge".into(),
            price: 100.0,
            rating: 4.5,
            images: vec!["img".into()],
            variants: vec![
                Variant {
                    id: "var_1".into(),
                    size: "m".into(),
                    color: "black".into(),
                    in_stock: true,
                },
                Variant {
                    id: "var_2".into(),
                    size: "l".into(),
                    color: "blue".into(),
                    in_stock: false,
                },
            ],
        });
        CartService::new(store, &Config::default())
    }

    #[test]
    fn add_item_computes_totals() {
        let service = service();
        let cart = service.add_item(None, "sess-1", "prod_1", "var_1", 2).unwrap();
        assert_eq!(cart.item_count, 2);
        assert_eq!(cart.subtotal, 200.0);
        assert_eq!(cart.tax, 16.0);
        assert_eq!(cart.shipping, 5.99);
        assert_eq!(cart.total, 221.99);
    }

    #[test]
    fn adding_same_variant_merges_quantity() {
        let service = service();
        service.add_item(None, "sess-1", "prod_1", "var_1", 1).unwrap();
        let cart = service.add_item(None, "sess-1", "prod_1", "var_1", 2).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
    }

    #[test]
    fn out_of_stock_variant_is_conflict() {
        let service = service();
        let err = service
            .add_item(None, "sess-1", "prod_1", "var_2", 1)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn discount_applies_before_tax() {
        let service = service();
        service.add_item(None, "sess-1", "prod_1", "var_1", 1).unwrap();
        let cart = service.apply_discount(None, "sess-1", "save20").unwrap();
        assert_eq!(cart.discount, 20.0);
        assert_eq!(cart.tax, 6.4);
        assert_eq!(cart.total, 92.39);
    }

    #[test]
    fn unknown_discount_code_rejected() {
        let service = service();
        assert!(service.apply_discount(None, "sess-1", "NOPE50").is_err());
    }

    #[test]
    fn clear_cart_zeroes_everything() {
        let service = service();
        service.add_item(None, "sess-1", "prod_1", "var_1", 2).unwrap();
        let cart = service.clear_cart(None, "sess-1");
        assert_eq!(cart.item_count, 0);
        assert_eq!(cart.total, 0.0);
        assert_eq!(cart.shipping, 0.0);
    }

    #[test]
    fn empty_cart_has_no_shipping() {
        let service = service();
        let cart = service.get_cart(None, "sess-1");
        assert_eq!(cart.shipping, 0.0);
        assert_eq!(cart.total, 0.0);
    }
}
