//! Cart agent: cart reads and mutations, including the deterministic
//! variant-resolution ladder for add requests.

use serde_json::{json, Value};
use std::sync::Arc;

use oc_commerce::{CartService, ProductService};
use oc_domain::action::{ActionName, AgentAction, AgentName};
use oc_domain::commerce::{Cart, CartItem, Product, Variant};
use oc_domain::context::{AgentContext, InteractionRecord};
use oc_domain::response::{AgentExecutionResult, SuggestedAction};
use oc_domain::JsonMap;

use crate::params::{i64_param, quantity_param, str_param};
use crate::Agent;

/// Queries too generic to justify narrowing by name containment.
const GENERIC_QUERIES: [&str; 7] = [
    "shoe",
    "shoes",
    "running",
    "runner",
    "trail",
    "clothing",
    "accessories",
];

#[derive(Default)]
struct AddResolution {
    product_id: Option<String>,
    variant_id: Option<String>,
    clarification: String,
    options: Vec<Value>,
}

impl AddResolution {
    fn resolved(&self) -> bool {
        self.product_id.is_some() && self.variant_id.is_some()
    }

    fn direct(product_id: String, variant_id: String) -> Self {
        Self {
            product_id: Some(product_id),
            variant_id: Some(variant_id),
            ..Self::default()
        }
    }
}

pub struct CartAgent {
    carts: Arc<CartService>,
    products: Arc<ProductService>,
}

impl CartAgent {
    pub fn new(carts: Arc<CartService>, products: Arc<ProductService>) -> Self {
        Self { carts, products }
    }

    fn get_cart_result(&self, context: &AgentContext) -> AgentExecutionResult {
        let cart = self
            .carts
            .get_cart(context.user_id.as_deref(), &context.session_id);
        let mut data = JsonMap::new();
        data.insert("cart".into(), json!(cart));
        AgentExecutionResult::ok(
            format!(
                "Your cart has {} item(s), total ${:.2}.",
                cart.item_count, cart.total
            ),
            data,
        )
        .with_next_actions(cart_next_actions(&cart))
    }

    fn add_item(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let resolution = self.resolve_variant_for_add(params, context);
        if !resolution.clarification.is_empty() {
            let suggestions = resolution
                .options
                .iter()
                .take(3)
                .map(|option| {
                    SuggestedAction::new(
                        format!(
                            "Add {}",
                            option.get("name").and_then(Value::as_str).unwrap_or("item")
                        ),
                        format!(
                            "add_to_cart:{}:{}",
                            option.get("productId").and_then(Value::as_str).unwrap_or(""),
                            option.get("variantId").and_then(Value::as_str).unwrap_or(""),
                        ),
                    )
                })
                .collect();
            return AgentExecutionResult::clarification(
                resolution.clarification,
                resolution.options,
            )
            .with_next_actions(suggestions);
        }
        if !resolution.resolved() {
            return AgentExecutionResult::failure(
                "Tell me what to add, for example: add 2 running shoes to cart.",
                JsonMap::new(),
            );
        }

        let product_id = resolution.product_id.unwrap_or_default();
        let variant_id = resolution.variant_id.unwrap_or_default();
        let quantity = quantity_param(params, "quantity");
        match self.carts.add_item(
            context.user_id.as_deref(),
            &context.session_id,
            &product_id,
            &variant_id,
            quantity,
        ) {
            Ok(cart) => {
                let mut data = JsonMap::new();
                data.insert("cart".into(), json!(cart));
                AgentExecutionResult::ok(
                    format!(
                        "Added item to cart: {} x{}. New total is ${:.2}.",
                        self.product_name(&product_id),
                        quantity,
                        cart.total
                    ),
                    data,
                )
                .with_next_actions(cart_next_actions(&cart))
            }
            Err(err) => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("ADD_ITEM_FAILED"));
                AgentExecutionResult::failure(format!("I couldn't add that item: {err}."), data)
            }
        }
    }

    fn add_multiple_items(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let raw_items = match params.get("items").and_then(Value::as_array) {
            Some(items) if !items.is_empty() => items.clone(),
            _ => {
                return AgentExecutionResult::failure(
                    "Tell me multiple items like: add 2 running shoes and 1 hoodie to cart.",
                    JsonMap::new(),
                )
            }
        };

        let mut added: Vec<String> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();
        let mut clarifications: Vec<String> = Vec::new();
        for raw_item in raw_items {
            let Some(item) = raw_item.as_object() else {
                continue;
            };
            let resolution = self.resolve_variant_for_add(item, context);
            let label = str_param(item, "query");
            if !resolution.clarification.is_empty() {
                unresolved.push(label);
                clarifications.push(resolution.clarification);
                continue;
            }
            if !resolution.resolved() {
                unresolved.push(label);
                continue;
            }
            let product_id = resolution.product_id.unwrap_or_default();
            let variant_id = resolution.variant_id.unwrap_or_default();
            let quantity = quantity_param(item, "quantity");
            if self
                .carts
                .add_item(
                    context.user_id.as_deref(),
                    &context.session_id,
                    &product_id,
                    &variant_id,
                    quantity,
                )
                .is_ok()
            {
                added.push(format!("{} x{}", self.product_name(&product_id), quantity));
            } else {
                unresolved.push(label);
            }
        }

        let cart = self
            .carts
            .get_cart(context.user_id.as_deref(), &context.session_id);
        if added.is_empty() {
            let mut data = JsonMap::new();
            data.insert("cart".into(), json!(cart));
            data.insert("unresolved".into(), json!(unresolved));
            data.insert("clarifications".into(), json!(clarifications));
            let message = clarifications.first().cloned().unwrap_or_else(|| {
                "I couldn't match those items. Try product names like running shoes or hoodie."
                    .to_owned()
            });
            return AgentExecutionResult::failure(message, data);
        }

        let unresolved_clean: Vec<String> =
            unresolved.into_iter().filter(|n| !n.is_empty()).collect();
        let mut message = format!("Added {}.", added.join(", "));
        if !unresolved_clean.is_empty() {
            message.push_str(&format!(
                " I couldn't match: {}.",
                unresolved_clean.join(", ")
            ));
        }
        message.push_str(&format!(" Cart total is ${:.2}.", cart.total));
        let mut data = JsonMap::new();
        data.insert("cart".into(), json!(cart));
        data.insert("unresolved".into(), json!(unresolved_clean));
        AgentExecutionResult::ok(message, data).with_next_actions(cart_next_actions(&cart))
    }

    fn adjust_item_quantity(
        &self,
        params: &JsonMap,
        context: &AgentContext,
    ) -> AgentExecutionResult {
        let cart = self
            .carts
            .get_cart(context.user_id.as_deref(), &context.session_id);
        let Some(target) = find_cart_item(&cart, params) else {
            let mut data = JsonMap::new();
            data.insert("cart".into(), json!(cart));
            return AgentExecutionResult::failure(
                "I couldn't identify which cart item to adjust.",
                data,
            );
        };

        let mut delta = i64_param(params, "delta").unwrap_or(0);
        if delta == 0 {
            delta = 1;
        }
        let current = i64::from(target.quantity);
        let next = current + delta;
        if next <= 0 {
            let _ = self.carts.remove_item(
                context.user_id.as_deref(),
                &context.session_id,
                &target.item_id,
            );
            let updated = self
                .carts
                .get_cart(context.user_id.as_deref(), &context.session_id);
            let mut data = JsonMap::new();
            data.insert("cart".into(), json!(updated));
            return AgentExecutionResult::ok(
                format!("Removed {} from cart.", target.name),
                data,
            )
            .with_next_actions(cart_next_actions(&updated));
        }

        match self.carts.update_item(
            context.user_id.as_deref(),
            &context.session_id,
            &target.item_id,
            next as u32,
        ) {
            Ok(updated) => {
                let mut data = JsonMap::new();
                data.insert("cart".into(), json!(updated));
                AgentExecutionResult::ok(
                    format!(
                        "Updated {} quantity from {} to {}. Total is now ${:.2}.",
                        target.name, current, next, updated.total
                    ),
                    data,
                )
                .with_next_actions(cart_next_actions(&updated))
            }
            Err(err) => AgentExecutionResult::failure(
                format!("I couldn't adjust that item: {err}."),
                JsonMap::new(),
            ),
        }
    }

    fn update_item(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let cart = self
            .carts
            .get_cart(context.user_id.as_deref(), &context.session_id);
        let Some(target) = find_cart_item(&cart, params) else {
            let mut data = JsonMap::new();
            data.insert("cart".into(), json!(cart));
            return AgentExecutionResult::failure("Your cart is empty. Add an item first.", data);
        };

        let quantity = quantity_param(params, "quantity");
        match self.carts.update_item(
            context.user_id.as_deref(),
            &context.session_id,
            &target.item_id,
            quantity,
        ) {
            Ok(updated) => {
                let mut data = JsonMap::new();
                data.insert("cart".into(), json!(updated));
                AgentExecutionResult::ok(
                    format!(
                        "Updated {} quantity to {}. Total is now ${:.2}.",
                        target.name, quantity, updated.total
                    ),
                    data,
                )
                .with_next_actions(cart_next_actions(&updated))
            }
            Err(err) => AgentExecutionResult::failure(
                format!("I couldn't update that item: {err}."),
                JsonMap::new(),
            ),
        }
    }

    fn remove_item(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let cart = self
            .carts
            .get_cart(context.user_id.as_deref(), &context.session_id);
        let Some(target) = find_cart_item(&cart, params) else {
            let mut data = JsonMap::new();
            data.insert("cart".into(), json!(cart));
            return AgentExecutionResult::failure("Your cart is empty.", data);
        };

        // A partial remove lowers the quantity instead of dropping the line.
        let remove_quantity = i64_param(params, "quantity").unwrap_or(0);
        let current = i64::from(target.quantity);
        if remove_quantity > 0 && current > remove_quantity {
            let remaining = (current - remove_quantity) as u32;
            if let Ok(updated) = self.carts.update_item(
                context.user_id.as_deref(),
                &context.session_id,
                &target.item_id,
                remaining,
            ) {
                let mut data = JsonMap::new();
                data.insert("cart".into(), json!(updated));
                return AgentExecutionResult::ok(
                    format!(
                        "Removed {} of {}. Remaining quantity is {}.",
                        remove_quantity, target.name, remaining
                    ),
                    data,
                )
                .with_next_actions(cart_next_actions(&updated));
            }
        }

        let _ = self.carts.remove_item(
            context.user_id.as_deref(),
            &context.session_id,
            &target.item_id,
        );
        let updated = self
            .carts
            .get_cart(context.user_id.as_deref(), &context.session_id);
        let mut data = JsonMap::new();
        data.insert("cart".into(), json!(updated));
        AgentExecutionResult::ok(
            format!(
                "Removed {} from cart. Cart total is ${:.2}.",
                target.name, updated.total
            ),
            data,
        )
        .with_next_actions(cart_next_actions(&updated))
    }

    fn apply_discount(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let code = str_param(params, "code").to_uppercase();
        if code.is_empty() {
            return AgentExecutionResult::failure(
                "Tell me the discount code to apply, for example: apply code SAVE20.",
                JsonMap::new(),
            );
        }
        match self
            .carts
            .apply_discount(context.user_id.as_deref(), &context.session_id, &code)
        {
            Ok(cart) => {
                let mut data = JsonMap::new();
                data.insert("cart".into(), json!(cart));
                AgentExecutionResult::ok(
                    format!("Applied {}. You saved ${:.2}.", code, cart.discount),
                    data,
                )
                .with_next_actions(cart_next_actions(&cart))
            }
            Err(_) => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("INVALID_DISCOUNT_CODE"));
                AgentExecutionResult::failure(
                    format!("{code} doesn't look like a valid discount code."),
                    data,
                )
            }
        }
    }

    // ── Variant resolution ladder ─────────────────────────────────

    /// 1. explicit ids → use them
    /// 2. productId alone → filter that product's in-stock variants
    /// 3. query text → candidate search with strong-match narrowing
    /// 4. fall back to the most recent product surfaced in conversation
    fn resolve_variant_for_add(&self, params: &JsonMap, context: &AgentContext) -> AddResolution {
        let product_id = str_param(params, "productId");
        let variant_id = str_param(params, "variantId");
        let query = str_param(params, "query");
        let color = str_param(params, "color").to_lowercase();
        let size = str_param(params, "size").to_lowercase();

        if !product_id.is_empty() && !variant_id.is_empty() {
            return AddResolution::direct(product_id, variant_id);
        }

        if !product_id.is_empty() {
            if let Ok(product) = self.products.get_product(&product_id) {
                let variants = matching_in_stock_variants(&product, &color, &size);
                if variants.len() == 1 {
                    return AddResolution::direct(product_id, variants[0].id.clone());
                }
                if variants.len() > 1 {
                    let options: Vec<Value> = variants
                        .iter()
                        .take(3)
                        .map(|variant| resolution_option(&product, variant))
                        .collect();
                    return AddResolution {
                        clarification: format!(
                            "I found multiple variants for {}. Please specify size and/or color.",
                            product.name
                        ),
                        options,
                        ..AddResolution::default()
                    };
                }
            }
        }

        if !query.is_empty() {
            let resolution = self.resolve_variant_from_query(
                &query,
                &color,
                &size,
                &str_param(params, "brand"),
                params.get("minPrice").and_then(Value::as_f64),
                params.get("maxPrice").and_then(Value::as_f64),
            );
            if resolution.resolved() || !resolution.clarification.is_empty() {
                return resolution;
            }
        }

        infer_from_recent(&context.recent_messages)
            .map(|(product_id, variant_id)| AddResolution::direct(product_id, variant_id))
            .unwrap_or_default()
    }

    fn resolve_variant_from_query(
        &self,
        query: &str,
        color: &str,
        size: &str,
        brand: &str,
        min_price: Option<f64>,
        max_price: Option<f64>,
    ) -> AddResolution {
        let page = self.products.list_products(
            Some(query),
            None,
            if brand.is_empty() { None } else { Some(brand) },
            min_price,
            max_price,
            1,
            8,
        );

        let mut candidates: Vec<(Product, Variant)> = Vec::new();
        let mut ambiguous_options: Vec<Value> = Vec::new();
        for product in &page.products {
            let variants = matching_in_stock_variants(product, color, size);
            if variants.is_empty() {
                continue;
            }
            if variants.len() == 1 {
                candidates.push((product.clone(), variants[0].clone()));
                continue;
            }
            if size.is_empty() && color.is_empty() {
                candidates.push((product.clone(), variants[0].clone()));
                continue;
            }
            ambiguous_options.extend(
                variants
                    .iter()
                    .take(3)
                    .map(|variant| resolution_option(product, variant)),
            );
        }

        if candidates.is_empty() && !ambiguous_options.is_empty() {
            let names: Vec<&str> = ambiguous_options
                .iter()
                .take(3)
                .filter_map(|option| option.get("name").and_then(Value::as_str))
                .collect();
            return AddResolution {
                clarification: format!(
                    "I found multiple size/color variants for '{query}': {}. \
                     Please specify size and/or color.",
                    names.join(", ")
                ),
                options: ambiguous_options.into_iter().take(3).collect(),
                ..AddResolution::default()
            };
        }
        if candidates.is_empty() {
            return AddResolution::default();
        }

        let query_lower = query.trim().to_lowercase();
        let token_count = query_lower.split_whitespace().count();
        let strong_matches: Vec<(Product, Variant)> = candidates
            .iter()
            .filter(|(product, _)| {
                !query_lower.is_empty() && product.name.to_lowercase().contains(&query_lower)
            })
            .cloned()
            .collect();

        // A one-word or generic query gives no signal to narrow by name.
        let narrowed = if candidates.len() > 1
            && (token_count <= 1 || GENERIC_QUERIES.contains(&query_lower.as_str()))
        {
            candidates
        } else if !strong_matches.is_empty() {
            strong_matches
        } else {
            candidates
        };

        if narrowed.len() == 1 {
            let (product, variant) = &narrowed[0];
            return AddResolution::direct(product.id.clone(), variant.id.clone());
        }

        let options: Vec<Value> = narrowed
            .iter()
            .take(3)
            .map(|(product, variant)| resolution_option(product, variant))
            .collect();
        let names: Vec<&str> = options
            .iter()
            .filter_map(|option| option.get("name").and_then(Value::as_str))
            .collect();
        AddResolution {
            clarification: format!(
                "I found multiple matches for '{query}': {}. Which one should I add?",
                names.join(", ")
            ),
            options,
            ..AddResolution::default()
        }
    }

    fn product_name(&self, product_id: &str) -> String {
        self.products
            .get_product(product_id)
            .map(|product| product.name)
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "item".to_owned())
    }
}

impl Agent for CartAgent {
    fn name(&self) -> AgentName {
        AgentName::Cart
    }

    fn execute(&self, action: &AgentAction, context: &AgentContext) -> AgentExecutionResult {
        match action.name {
            ActionName::GetCart => self.get_cart_result(context),
            ActionName::AddItem => self.add_item(&action.params, context),
            ActionName::AddMultipleItems => self.add_multiple_items(&action.params, context),
            ActionName::ClearCart => {
                let cart = self
                    .carts
                    .clear_cart(context.user_id.as_deref(), &context.session_id);
                let mut data = JsonMap::new();
                data.insert("cart".into(), json!(cart));
                AgentExecutionResult::ok("Cleared your cart.", data)
                    .with_next_actions(cart_next_actions(&cart))
            }
            ActionName::AdjustItemQuantity => self.adjust_item_quantity(&action.params, context),
            ActionName::UpdateItem => self.update_item(&action.params, context),
            ActionName::RemoveItem => self.remove_item(&action.params, context),
            ActionName::ApplyDiscount => self.apply_discount(&action.params, context),
            other => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("UNSUPPORTED_ACTION"));
                AgentExecutionResult::failure(
                    format!("The cart agent can't handle {other}."),
                    data,
                )
            }
        }
    }
}

// ── Free helpers ────────────────────────────────────────────────────

fn matching_in_stock_variants(product: &Product, color: &str, size: &str) -> Vec<Variant> {
    product
        .variants
        .iter()
        .filter(|variant| color.is_empty() || variant.color.to_lowercase() == color)
        .filter(|variant| size.is_empty() || variant.size.to_lowercase() == size)
        .filter(|variant| variant.in_stock)
        .cloned()
        .collect()
}

fn resolution_option(product: &Product, variant: &Variant) -> Value {
    let suffix = if variant.size.is_empty() && variant.color.is_empty() {
        String::new()
    } else {
        format!(
            " ({} / {})",
            if variant.size.is_empty() { "n/a" } else { &variant.size },
            if variant.color.is_empty() { "n/a" } else { &variant.color },
        )
    };
    json!({
        "productId": product.id,
        "variantId": variant.id,
        "name": format!("{}{}", product.name, suffix),
        "price": product.price,
        "size": variant.size,
        "color": variant.color,
    })
}

/// The most recent interaction whose response surfaced a product with at
/// least one variant.
fn infer_from_recent(recent: &[InteractionRecord]) -> Option<(String, String)> {
    for record in recent.iter().rev() {
        let Some(first) = record.response.pointer("/data/products/0") else {
            continue;
        };
        let product_id = first.get("id").and_then(Value::as_str).unwrap_or("");
        let variant_id = first
            .pointer("/variants/0/id")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !product_id.is_empty() && !variant_id.is_empty() {
            return Some((product_id.to_owned(), variant_id.to_owned()));
        }
    }
    None
}

fn find_cart_item(cart: &Cart, params: &JsonMap) -> Option<CartItem> {
    let item_id = str_param(params, "itemId");
    if !item_id.is_empty() {
        return cart.items.iter().find(|item| item.item_id == item_id).cloned();
    }
    let product_id = str_param(params, "productId");
    if !product_id.is_empty() {
        return cart
            .items
            .iter()
            .find(|item| item.product_id == product_id)
            .cloned();
    }
    let variant_id = str_param(params, "variantId");
    if !variant_id.is_empty() {
        return cart
            .items
            .iter()
            .find(|item| item.variant_id == variant_id)
            .cloned();
    }

    let query = str_param(params, "query").to_lowercase();
    if !query.is_empty() {
        let query_tokens: std::collections::HashSet<&str> =
            query.split_whitespace().collect();
        let mut best: Option<(usize, &CartItem)> = None;
        for item in &cart.items {
            let name = item.name.to_lowercase();
            let name_tokens: std::collections::HashSet<&str> = name.split_whitespace().collect();
            let mut score = query_tokens.intersection(&name_tokens).count();
            if name.contains(&query) {
                score += 2;
            }
            if score == 0 {
                continue;
            }
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, item));
            }
        }
        if let Some((_, item)) = best {
            return Some(item.clone());
        }
    }

    cart.items.first().cloned()
}

fn cart_next_actions(cart: &Cart) -> Vec<SuggestedAction> {
    let mut actions = vec![SuggestedAction::new("Continue shopping", "search:more")];
    if cart.item_count > 0 {
        actions.push(SuggestedAction::new("Checkout", "checkout"));
    }
    actions
}
