//! Deterministic rule classifier. Branches run in a fixed priority
//! order; the first match wins.

use serde_json::json;

use oc_domain::intent::{IntentResult, SupportedIntent};
use oc_domain::JsonMap;

use super::entities;
use super::RecentContext;

pub fn classify_rules(message: &str, context: Option<&RecentContext>) -> IntentResult {
    let text = message.trim().to_lowercase();
    let phrase_text = text
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let mut entities = JsonMap::new();

    if text.is_empty() {
        return IntentResult::new(SupportedIntent::GeneralQuestion, 0.2, JsonMap::new());
    }

    // 1. Cart + order status in one breath.
    if text.contains("cart") && contains_order_status_phrase(&text) {
        merge(&mut entities, entities::extract_order_id(&text));
        return IntentResult::new(SupportedIntent::MultiStatus, 0.9, entities);
    }

    // 2. Memory.
    if is_show_memory_request(&text) {
        return IntentResult::new(SupportedIntent::ShowMemory, 0.93, JsonMap::new());
    }
    if is_clear_memory_request(&text) {
        return IntentResult::new(SupportedIntent::ClearMemory, 0.92, JsonMap::new());
    }
    let forget = entities::extract_forget_preference(message);
    if !forget.is_empty() {
        return IntentResult::new(SupportedIntent::ForgetPreference, 0.9, forget);
    }
    let updates = entities::extract_preference_updates(message);
    if !updates.is_empty() && is_preference_statement(&text) {
        let mut entities = JsonMap::new();
        entities.insert("updates".into(), json!(updates));
        return IntentResult::new(SupportedIntent::SavePreference, 0.88, entities);
    }

    // 3. Orders.
    if text.contains("order")
        && text.contains("address")
        && ["change", "update", "delivery"]
            .iter()
            .any(|token| text.contains(token))
    {
        merge(&mut entities, entities::extract_order_id(&text));
        merge(&mut entities, entities::extract_shipping_address(message));
        return IntentResult::new(SupportedIntent::ChangeOrderAddress, 0.88, entities);
    }
    if text.contains("cancel") && text.contains("order") {
        merge(&mut entities, entities::extract_order_id(&text));
        return IntentResult::new(SupportedIntent::CancelOrder, 0.91, entities);
    }
    if text.contains("refund") && text.contains("order") {
        merge(&mut entities, entities::extract_order_id(&text));
        return IntentResult::new(SupportedIntent::RequestRefund, 0.9, entities);
    }
    if contains_order_status_phrase(&text) {
        merge(&mut entities, entities::extract_order_id(&text));
        return IntentResult::new(SupportedIntent::OrderStatus, 0.9, entities);
    }
    if text.contains("checkout") || text.contains("place order") || text.contains("buy now") {
        return IntentResult::new(SupportedIntent::Checkout, 0.95, JsonMap::new());
    }

    // 4. Support.
    if is_support_status_request(&text) {
        merge(&mut entities, entities::extract_ticket_id(&text));
        return IntentResult::new(SupportedIntent::SupportStatus, 0.9, entities);
    }
    if is_support_close_request(&text) {
        merge(&mut entities, entities::extract_ticket_id(&text));
        return IntentResult::new(SupportedIntent::SupportClose, 0.9, entities);
    }
    if is_support_escalation_request(&text) {
        merge(&mut entities, entities::extract_ticket_id(&text));
        entities.insert("query".into(), json!(message.trim()));
        return IntentResult::new(SupportedIntent::SupportEscalation, 0.88, entities);
    }

    // 5. Search-then-add combo.
    if text.contains("add")
        && text.contains("cart")
        && [
            "find",
            "search",
            "show me",
            "recommend",
            "looking for",
            "under",
            "below",
            "over",
            "above",
        ]
        .iter()
        .any(|token| text.contains(token))
    {
        merge(&mut entities, entities::extract_quantity(&text));
        merge(&mut entities, entities::extract_product_or_variant_id(&text));
        merge(&mut entities, entities::extract_price_range(&text));
        merge(&mut entities, entities::extract_color(&text));
        merge(&mut entities, entities::extract_brand(message));
        entities.insert(
            "query".into(),
            json!(entities::extract_search_query_for_combo(message)),
        );
        return IntentResult::new(SupportedIntent::SearchAndAddToCart, 0.93, entities);
    }

    // 6. Cart.
    if is_clear_cart_request(&text) {
        return IntentResult::new(SupportedIntent::ClearCart, 0.94, JsonMap::new());
    }
    if is_adjust_cart_quantity_request(&text) {
        merge(&mut entities, entities::extract_product_or_item_id(&text));
        merge(&mut entities, entities::extract_delta(&text));
        let query = entities::extract_cart_item_query(message);
        if !query.is_empty() {
            entities.insert("query".into(), json!(query));
        }
        return IntentResult::new(SupportedIntent::AdjustCartQuantity, 0.89, entities);
    }
    let multi_items = entities::extract_multi_add_items(message);
    if multi_items.len() >= 2 {
        let mut entities = JsonMap::new();
        entities.insert("items".into(), json!(multi_items));
        return IntentResult::new(SupportedIntent::AddMultipleToCart, 0.9, entities);
    }
    if ["discount", "coupon", "promo"]
        .iter()
        .any(|token| text.contains(token))
        && ["apply", "use", "code"].iter().any(|token| text.contains(token))
    {
        merge(&mut entities, entities::extract_discount_code(message));
        return IntentResult::new(SupportedIntent::ApplyDiscount, 0.9, entities);
    }
    if text.contains("remove") && text.contains("cart") {
        merge(&mut entities, entities::extract_quantity(&text));
        merge(&mut entities, entities::extract_product_or_item_id(&text));
        let query = entities::extract_cart_item_query(message);
        if !query.is_empty() {
            entities.insert("query".into(), json!(query));
        }
        return IntentResult::new(SupportedIntent::RemoveFromCart, 0.88, entities);
    }
    if ["update cart", "change quantity", "set quantity"]
        .iter()
        .any(|phrase| text.contains(phrase))
    {
        merge(&mut entities, entities::extract_quantity(&text));
        merge(&mut entities, entities::extract_product_or_item_id(&text));
        let query = entities::extract_cart_item_query(message);
        if !query.is_empty() {
            entities.insert("query".into(), json!(query));
        }
        return IntentResult::new(SupportedIntent::UpdateCart, 0.86, entities);
    }
    if text.contains("add") && text.contains("cart") {
        merge(&mut entities, entities::extract_quantity(&text));
        merge(&mut entities, entities::extract_product_or_variant_id(&text));
        merge(&mut entities, entities::extract_color(&text));
        merge(&mut entities, entities::extract_brand(message));
        let query = entities::extract_add_query(message);
        if !query.is_empty() {
            entities.insert("query".into(), json!(query));
        }
        return IntentResult::new(SupportedIntent::AddToCart, 0.92, entities);
    }
    if entities::is_view_cart_request(&phrase_text) {
        return IntentResult::new(SupportedIntent::ViewCart, 0.9, JsonMap::new());
    }

    // 7. Product search.
    if ["find", "search", "show me", "recommend", "looking for"]
        .iter()
        .any(|token| text.contains(token))
    {
        merge(&mut entities, entities::extract_price_range(&text));
        merge(&mut entities, entities::extract_color(&text));
        merge(&mut entities, entities::extract_brand(message));
        entities.insert("query".into(), json!(message.trim()));
        return IntentResult::new(SupportedIntent::ProductSearch, 0.84, entities);
    }
    if is_price_refinement_request(&phrase_text, context) {
        merge(&mut entities, entities::extract_price_range(&text));
        merge(&mut entities, entities::extract_color(&text));
        merge(&mut entities, entities::extract_brand(message));
        entities.insert("query".into(), json!(message.trim()));
        return IntentResult::new(SupportedIntent::ProductSearch, 0.8, entities);
    }
    if looks_like_product_query(&phrase_text) {
        merge(&mut entities, entities::extract_price_range(&text));
        merge(&mut entities, entities::extract_color(&text));
        merge(&mut entities, entities::extract_brand(message));
        entities.insert("query".into(), json!(message.trim()));
        return IntentResult::new(SupportedIntent::ProductSearch, 0.78, entities);
    }

    // 8. Fallback.
    let mut entities = JsonMap::new();
    entities.insert("query".into(), json!(message.trim()));
    IntentResult::new(SupportedIntent::GeneralQuestion, 0.6, entities)
}

fn merge(target: &mut JsonMap, source: JsonMap) {
    for (key, value) in source {
        target.insert(key, value);
    }
}

// ── Phrase predicates ───────────────────────────────────────────────

fn contains_order_status_phrase(text: &str) -> bool {
    if !text.contains("order") {
        return false;
    }
    [
        "order status",
        "where is my order",
        "track order",
        "hasn't arrived",
        "hasnt arrived",
        "not arrived",
        "order is late",
        "order late",
        "delayed order",
        "order delayed",
    ]
    .iter()
    .any(|phrase| text.contains(phrase))
}

fn is_clear_cart_request(text: &str) -> bool {
    [
        "clear cart",
        "empty cart",
        "remove all from cart",
        "delete all from cart",
        "clear my cart",
        "empty my cart",
    ]
    .iter()
    .any(|phrase| text.contains(phrase))
}

fn is_adjust_cart_quantity_request(text: &str) -> bool {
    if text.contains("set quantity") {
        return false;
    }
    if !text.contains("cart") && !text.contains("quantity") && !text.contains("qty") {
        return false;
    }
    [
        "increase", "decrease", "reduce", "minus", "plus", "one more", "one less", "another",
    ]
    .iter()
    .any(|token| text.contains(token))
}

fn is_support_escalation_request(text: &str) -> bool {
    let phrases = [
        "human agent",
        "support agent",
        "talk to support",
        "talk to a person",
        "connect me to support",
        "open a ticket",
        "escalate",
        "need help with issue",
    ];
    if phrases.iter().any(|phrase| text.contains(phrase)) {
        return true;
    }
    text.contains("help") && text.contains("order") && text.contains("agent")
}

fn is_support_status_request(text: &str) -> bool {
    [
        "ticket status",
        "support status",
        "status of my ticket",
        "my support ticket",
        "any update on ticket",
    ]
    .iter()
    .any(|phrase| text.contains(phrase))
}

fn is_support_close_request(text: &str) -> bool {
    ["close ticket", "resolve ticket", "mark ticket resolved"]
        .iter()
        .any(|phrase| text.contains(phrase))
}

fn is_show_memory_request(text: &str) -> bool {
    [
        "what do you remember",
        "show my preferences",
        "show memory",
        "what are my preferences",
        "what do you know about me",
        "remembered about me",
    ]
    .iter()
    .any(|phrase| text.contains(phrase))
}

fn is_clear_memory_request(text: &str) -> bool {
    [
        "clear memory",
        "clear my memory",
        "forget everything",
        "reset my preferences",
        "clear preferences",
    ]
    .iter()
    .any(|phrase| text.contains(phrase))
}

fn is_preference_statement(text: &str) -> bool {
    if ["remember", "note that", "save preference"]
        .iter()
        .any(|token| text.contains(token))
    {
        return true;
    }
    if ["my size is", "i wear size", "budget", "price range"]
        .iter()
        .any(|token| text.contains(token))
    {
        return true;
    }
    if text.contains("i prefer") || text.contains("i like") {
        let blocking = [
            "show me",
            "find",
            "search",
            "add to cart",
            "checkout",
            "order status",
        ];
        return !blocking.iter().any(|token| text.contains(token));
    }
    false
}

/// A bare price bound ("under 150") continues the previous product
/// search when the conversation was about products.
fn is_price_refinement_request(text: &str, context: Option<&RecentContext>) -> bool {
    if entities::extract_price_range(text).is_empty() {
        return false;
    }
    if ["cart", "checkout", "order", "refund", "ticket", "support"]
        .iter()
        .any(|token| text.contains(token))
    {
        return false;
    }
    let Some(context) = context else {
        return true;
    };
    for turn in context.recent.iter().rev() {
        if matches!(turn.intent.as_str(), "product_search" | "search_and_add_to_cart")
            || turn.agent == "product"
        {
            return true;
        }
    }
    true
}

fn looks_like_product_query(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if [
        "support",
        "ticket",
        "order",
        "refund",
        "cancel",
        "checkout",
        "memory",
        "preference",
        "cart",
    ]
    .iter()
    .any(|token| text.contains(token))
    {
        return false;
    }
    [
        "shoe",
        "shoes",
        "sneaker",
        "sneakers",
        "runner",
        "running",
        "trail",
        "hoodie",
        "jogger",
        "joggers",
        "sock",
        "socks",
        "backpack",
        "bag",
        "clothing",
        "accessories",
        "denim",
        "athleisure",
    ]
    .iter()
    .any(|token| text.contains(token))
}
