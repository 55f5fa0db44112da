//! Entity extraction from normalized utterance text. Each extractor
//! returns only the keys it found; callers merge them into the intent's
//! entity map.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

use oc_domain::JsonMap;

pub const COLORS: [&str; 8] = [
    "black", "blue", "white", "green", "red", "gray", "charcoal", "navy",
];

const KNOWN_BRANDS: [&str; 4] = ["strideforge", "peakroute", "aerothread", "carryworks"];

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static regex"))
        }
    };
}

cached_regex!(re_order_id, r"(order[_\-]?\d+|ord[_\-]?\d+)");
cached_regex!(re_ticket_id, r"(ticket[_\-]?(?:item[_\-]?)?\d+)");
cached_regex!(re_integer, r"\b(\d+)\b");
cached_regex!(re_below, r"(under|below)\s*\$?(\d+)");
cached_regex!(re_above, r"(over|above)\s*\$?(\d+)");
cached_regex!(re_brand, r"(?i)(?:brand|from)\s*(?:is|=|:)?\s*([a-zA-Z0-9&\-\s]{2,80})");
cached_regex!(re_product_id, r"(prod[_\-]?\d+)");
cached_regex!(re_variant_id, r"(var[_\-]?\d+)");
cached_regex!(re_item_id, r"(item[_\-]?\d+)");
cached_regex!(re_discount_explicit, r"(?i)(?:code|coupon|promo)\s*(?:is|=|:)?\s*([a-zA-Z0-9_-]{4,20})");
cached_regex!(re_discount_token, r"\b([A-Za-z0-9]{4,20})\b");
cached_regex!(re_combo_strip, r"(?i)\b(and\s+)?(add|put)\b.*\bcart\b");
cached_regex!(re_size, r"\b(?:size\s*(?:is|=)?|wear size)\s*(xxs|xs|s|m|l|xl|xxl|\d{1,2})\b");
cached_regex!(re_pref_max, r"(?:under|below|max(?:imum)?)\s*\$?(\d+)");
cached_regex!(re_pref_min, r"(?:over|above|min(?:imum)?)\s*\$?(\d+)");
cached_regex!(re_pref_brand, r"(?:brand|brands?)\s*(?:is|are|=|:)?\s*([a-z0-9,\s&-]{2,120})");
cached_regex!(re_any_id, r"(?i)\b(prod[_\-]?\d+|var[_\-]?\d+|item[_\-]?\d+)\b");
cached_regex!(re_digits, r"\b\d+\b");
cached_regex!(re_view_cart, r"\b(view|show|open|see|display)\s+(my\s+)?cart\b");

fn normalize_id(raw: &str) -> String {
    raw.replace('-', "_")
}

pub fn extract_order_id(text: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if let Some(m) = re_order_id().captures(text) {
        entities.insert("orderId".into(), json!(normalize_id(&m[1])));
    }
    entities
}

pub fn extract_ticket_id(text: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if let Some(m) = re_ticket_id().captures(text) {
        entities.insert("ticketId".into(), json!(normalize_id(&m[1])));
    }
    entities
}

/// First integer in the utterance, clamped to `[1, 50]`.
pub fn extract_quantity(text: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if let Some(m) = re_integer().captures(text) {
        if let Ok(quantity) = m[1].parse::<i64>() {
            entities.insert("quantity".into(), json!(quantity.clamp(1, 50)));
        }
    }
    entities
}

pub fn extract_color(text: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    for color in COLORS {
        if text.contains(color) {
            entities.insert("color".into(), json!(color));
            break;
        }
    }
    entities
}

pub fn extract_price_range(text: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if let Some(m) = re_below().captures(text) {
        if let Ok(value) = m[2].parse::<f64>() {
            entities.insert("maxPrice".into(), json!(value));
        }
    }
    if let Some(m) = re_above().captures(text) {
        if let Ok(value) = m[2].parse::<f64>() {
            entities.insert("minPrice".into(), json!(value));
        }
    }
    entities
}

/// Explicit `brand ...`/`from ...` capture, else a known-brand token.
pub fn extract_brand(message: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if let Some(m) = re_brand().captures(message) {
        let raw = m[1].trim_matches([' ', '.', ',', ';']).to_owned();
        if !raw.is_empty() {
            entities.insert("brand".into(), json!(raw));
            return entities;
        }
    }
    let lowered = message.to_lowercase();
    for token in KNOWN_BRANDS {
        if lowered.contains(token) {
            entities.insert("brand".into(), json!(token));
            break;
        }
    }
    entities
}

pub fn extract_product_or_variant_id(text: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if let Some(m) = re_product_id().captures(text) {
        entities.insert("productId".into(), json!(normalize_id(&m[1])));
    }
    if let Some(m) = re_variant_id().captures(text) {
        entities.insert("variantId".into(), json!(normalize_id(&m[1])));
    }
    entities
}

pub fn extract_product_or_item_id(text: &str) -> JsonMap {
    if let Some(m) = re_item_id().captures(text) {
        let mut entities = JsonMap::new();
        entities.insert("itemId".into(), json!(normalize_id(&m[1])));
        return entities;
    }
    extract_product_or_variant_id(text)
}

/// Signed quantity change: `+n` for increase words, `-n` for decrease.
pub fn extract_delta(text: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if text.contains("set quantity") {
        return entities;
    }
    let amount = re_integer()
        .captures(text)
        .and_then(|m| m[1].parse::<i64>().ok())
        .map(|n| n.max(1))
        .unwrap_or(1);
    if ["decrease", "reduce", "minus", "less"]
        .iter()
        .any(|token| text.contains(token))
    {
        entities.insert("delta".into(), json!(-amount));
    } else if ["increase", "plus", "more", "another"]
        .iter()
        .any(|token| text.contains(token))
    {
        entities.insert("delta".into(), json!(amount));
    }
    entities
}

/// Explicit `code XYZ` capture, else any 4-20 char alphanumeric token
/// containing a digit that isn't a stop-word.
pub fn extract_discount_code(message: &str) -> JsonMap {
    let mut entities = JsonMap::new();
    if let Some(m) = re_discount_explicit().captures(message) {
        entities.insert("code".into(), json!(m[1].to_uppercase()));
        return entities;
    }
    const STOP_WORDS: [&str; 8] = [
        "APPLY", "DISCOUNT", "COUPON", "PROMO", "CODE", "PLEASE", "THIS", "THAT",
    ];
    for m in re_discount_token().captures_iter(message) {
        let token = m[1].to_uppercase();
        if !STOP_WORDS.contains(&token.as_str()) && token.chars().any(|c| c.is_ascii_digit()) {
            entities.insert("code".into(), json!(token));
            break;
        }
    }
    entities
}

/// Strip the add-to-cart clause from a combo utterance, leaving the
/// search query.
pub fn extract_search_query_for_combo(message: &str) -> String {
    let cleaned = re_combo_strip().replace_all(message, " ");
    collapse_whitespace(&cleaned)
}

/// Query text for a plain add: drop the verb, the cart phrase, ids,
/// digits, and filler words.
pub fn extract_add_query(message: &str) -> String {
    let mut cleaned = Regex::new(r"(?i)\badd\b")
        .expect("static regex")
        .replace_all(message, " ")
        .into_owned();
    cleaned = Regex::new(r"(?i)\bto\b\s+\b(my\s+)?cart\b")
        .expect("static regex")
        .replace_all(&cleaned, " ")
        .into_owned();
    cleaned = re_any_id().replace_all(&cleaned, " ").into_owned();
    cleaned = re_digits().replace_all(&cleaned, " ").into_owned();
    cleaned = Regex::new(
        r"(?i)\b(please|the|a|an|item|items|quantity|qty|of|for|me|my|cart|with|color)\b",
    )
    .expect("static regex")
    .replace_all(&cleaned, " ")
    .into_owned();
    cleaned = cleaned.replace([',', ':', ';'], " ");
    let cleaned = collapse_whitespace(&cleaned);
    match cleaned.to_lowercase().as_str() {
        "" | "to" | "cart" => String::new(),
        _ => cleaned,
    }
}

/// Query text for locating an existing cart item.
pub fn extract_cart_item_query(message: &str) -> String {
    let mut cleaned = Regex::new(
        r"(?i)\b(remove|delete|drop|update|change|set|increase|decrease|reduce|quantity|qty|from|in|cart|my|the)\b",
    )
    .expect("static regex")
    .replace_all(message, " ")
    .into_owned();
    cleaned = re_any_id().replace_all(&cleaned, " ").into_owned();
    cleaned = re_digits().replace_all(&cleaned, " ").into_owned();
    cleaned = cleaned.replace([',', ':', ';'], " ");
    collapse_whitespace(&cleaned)
}

/// Split a multi-add request into per-item `{query, quantity, color?}`
/// chunks on commas and `and`.
pub fn extract_multi_add_items(message: &str) -> Vec<Value> {
    let lower = message.to_lowercase();
    if !lower.contains("add") || !lower.contains("cart") {
        return Vec::new();
    }
    let body = Regex::new(r"(?i)^.*?\badd\b")
        .expect("static regex")
        .replace(&lower, "")
        .into_owned();
    let body = Regex::new(r"(?i)\bto\b\s+\b(my\s+)?cart\b.*$")
        .expect("static regex")
        .replace(&body, "")
        .into_owned();
    let body = collapse_whitespace(&body);
    let body = body.trim_matches([' ', '.', ',', ';']);
    if body.is_empty() {
        return Vec::new();
    }

    let splitter = Regex::new(r"\s*(?:,|\band\b)\s*").expect("static regex");
    let mut items = Vec::new();
    for part in splitter.split(body) {
        let chunk = part.trim_matches([' ', '.', ',', ';']);
        if chunk.is_empty() {
            continue;
        }
        let quantity = re_integer()
            .captures(chunk)
            .and_then(|m| m[1].parse::<i64>().ok())
            .map(|n| n.clamp(1, 50))
            .unwrap_or(1);
        let color = extract_color(chunk)
            .get("color")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let query = re_digits().replace_all(chunk, " ").into_owned();
        let query = Regex::new(r"\b(of|a|an|the|please|to|my|cart)\b")
            .expect("static regex")
            .replace_all(&query, " ")
            .into_owned();
        let query = collapse_whitespace(&query);
        if query.is_empty() {
            continue;
        }
        let mut payload = json!({"query": query, "quantity": quantity});
        if let Some(color) = color {
            payload["color"] = json!(color);
        }
        items.push(payload);
    }
    items
}

/// Shipping address from `field: value` pairs. All of line1, city,
/// state, postalCode, and country must be present.
pub fn extract_shipping_address(message: &str) -> JsonMap {
    let patterns = [
        ("name", r"name"),
        ("line1", r"line1|address|street"),
        ("line2", r"line2|apt|suite"),
        ("city", r"city"),
        ("state", r"state"),
        ("postalCode", r"postal\s*code|postalcode|zip"),
        ("country", r"country"),
    ];
    let mut fields = JsonMap::new();
    for (field, pattern) in patterns {
        let re = Regex::new(&format!(r"(?i)(?:{pattern})\s*[:=]\s*([^,;]+)"))
            .expect("static pattern");
        if let Some(m) = re.captures(message) {
            fields.insert(field.into(), json!(m[1].trim()));
        }
    }

    let mut entities = JsonMap::new();
    let required = ["line1", "city", "state", "postalCode", "country"];
    if !required.iter().all(|key| fields.contains_key(*key)) {
        return entities;
    }
    let mut shipping = json!({
        "name": fields.get("name").cloned().unwrap_or(json!("Customer")),
        "line1": fields["line1"],
        "city": fields["city"],
        "state": fields["state"],
        "postalCode": fields["postalCode"],
        "country": fields["country"],
    });
    if let Some(line2) = fields.get("line2") {
        shipping["line2"] = line2.clone();
    }
    entities.insert("shippingAddress".into(), shipping);
    entities
}

/// Preference updates stated in an utterance: size, price range,
/// category/style/color/brand lists, plus the `i like/i prefer`
/// first-token heuristic.
pub fn extract_preference_updates(message: &str) -> JsonMap {
    let text = message.trim().to_lowercase();
    let mut updates = JsonMap::new();

    if let Some(m) = re_size().captures(&text) {
        updates.insert("size".into(), json!(m[1].to_uppercase()));
    }

    let max = re_pref_max().captures(&text).and_then(|m| m[1].parse::<f64>().ok());
    let min = re_pref_min().captures(&text).and_then(|m| m[1].parse::<f64>().ok());
    if max.is_some() || min.is_some() {
        let mut range = JsonMap::new();
        if let Some(min) = min {
            range.insert("min".into(), json!(min));
        }
        if let Some(max) = max {
            range.insert("max".into(), json!(max));
        }
        updates.insert("priceRange".into(), Value::Object(range));
    }

    let mut categories: Vec<&str> = ["shoes", "clothing", "accessories"]
        .into_iter()
        .filter(|category| text.contains(category))
        .collect();
    if text.contains("hoodie") || text.contains("jogger") {
        categories.push("clothing");
    }
    if text.contains("runner") || text.contains("sneaker") {
        categories.push("shoes");
    }
    if !categories.is_empty() {
        categories.sort_unstable();
        categories.dedup();
        updates.insert("categories".into(), json!(categories));
    }

    let styles: Vec<&str> = [
        "denim",
        "casual",
        "formal",
        "sport",
        "athleisure",
        "vintage",
        "streetwear",
        "minimal",
    ]
    .into_iter()
    .filter(|style| text.contains(style))
    .collect();
    if !styles.is_empty() {
        updates.insert("stylePreferences".into(), json!(styles));
    }

    let colors: Vec<&str> = COLORS
        .into_iter()
        .filter(|color| text.contains(color))
        .collect();
    if !colors.is_empty() {
        updates.insert("colorPreferences".into(), json!(colors));
    }

    if let Some(m) = re_pref_brand().captures(&text) {
        let brands: Vec<String> = Regex::new(r"(?:,|and)")
            .expect("static regex")
            .split(&m[1])
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect();
        if !brands.is_empty() {
            updates.insert("brandPreferences".into(), json!(brands));
        }
    }

    let has_list_update = ["categories", "stylePreferences", "colorPreferences", "brandPreferences"]
        .iter()
        .any(|key| updates.contains_key(*key));
    if !has_list_update {
        for marker in ["i prefer ", "i like "] {
            if let Some(idx) = text.find(marker) {
                let candidate = text[idx + marker.len()..]
                    .trim_matches([' ', '.', ',', '!', '?'])
                    .to_owned();
                if let Some(first) = candidate.split_whitespace().next() {
                    updates.insert("stylePreferences".into(), json!([first]));
                }
                break;
            }
        }
    }

    updates
}

/// Which preference to forget: an explicit key, or a value-only token.
pub fn extract_forget_preference(message: &str) -> JsonMap {
    let text = message.trim().to_lowercase();
    let mut entities = JsonMap::new();
    if !text.contains("forget") && !text.contains("remove preference") {
        return entities;
    }
    if text.contains("everything") || text.contains("all preferences") {
        entities.insert("key".into(), json!("all"));
        return entities;
    }

    let key = if text.contains("size") {
        Some("size")
    } else if text.contains("price") || text.contains("budget") {
        Some("priceRange")
    } else if text.contains("category") || text.contains("categories") {
        Some("categories")
    } else if text.contains("style") {
        Some("stylePreferences")
    } else if text.contains("color") {
        Some("colorPreferences")
    } else if text.contains("brand") {
        Some("brandPreferences")
    } else {
        None
    };
    if let Some(key) = key {
        entities.insert("key".into(), json!(key));
        return entities;
    }

    for token in [
        "shoes", "clothing", "accessories", "denim", "black", "blue", "green", "red", "gray",
    ] {
        if text.contains(token) {
            entities.insert("value".into(), json!(token));
            break;
        }
    }
    entities
}

pub fn is_view_cart_request(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if matches!(
        text,
        "cart" | "my cart" | "view cart" | "show cart" | "show me cart" | "view my cart"
    ) {
        return true;
    }
    if re_view_cart().is_match(text) {
        return true;
    }
    (text.contains("what") || text.contains("whats") || text.contains("what's"))
        && text.contains("cart")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_clamps_to_fifty() {
        let entities = extract_quantity("add 400 socks");
        assert_eq!(entities["quantity"], 50);
        assert!(extract_quantity("add socks").is_empty());
    }

    #[test]
    fn price_range_directions() {
        let entities = extract_price_range("shoes under $150 but over 50");
        assert_eq!(entities["maxPrice"], 150.0);
        assert_eq!(entities["minPrice"], 50.0);
    }

    #[test]
    fn order_and_ticket_ids_normalize_to_underscore() {
        assert_eq!(extract_order_id("where is order-12")["orderId"], "order_12");
        assert_eq!(
            extract_ticket_id("status of ticket-item-3")["ticketId"],
            "ticket_item_3"
        );
    }

    #[test]
    fn discount_code_explicit_and_heuristic() {
        assert_eq!(extract_discount_code("apply code save20")["code"], "SAVE20");
        assert_eq!(extract_discount_code("use SAVE20 please")["code"], "SAVE20");
        // Stop-words and digit-free tokens are never codes.
        assert!(extract_discount_code("apply discount please").is_empty());
    }

    #[test]
    fn delta_signs() {
        assert_eq!(extract_delta("add 2 more")["delta"], 2);
        assert_eq!(extract_delta("one less please reduce by 1")["delta"], -1);
        assert!(extract_delta("set quantity 3").is_empty());
    }

    #[test]
    fn combo_query_drops_cart_clause() {
        let query = extract_search_query_for_combo("find running shoes under 150 and add to cart");
        assert_eq!(query, "find running shoes under 150");
    }

    #[test]
    fn add_query_strips_filler() {
        let query = extract_add_query("add 2 running shoes to my cart please");
        assert_eq!(query, "running shoes");
        assert_eq!(extract_add_query("add prod_1 to cart"), "");
    }

    #[test]
    fn multi_add_splits_on_commas_and_and() {
        let items = extract_multi_add_items("add 2 running shoes, 1 hoodie and 3 black socks to cart");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["query"], "running shoes");
        assert_eq!(items[0]["quantity"], 2);
        assert_eq!(items[2]["color"], "black");
        assert_eq!(items[2]["quantity"], 3);
    }

    #[test]
    fn shipping_address_requires_all_fields() {
        let full = extract_shipping_address(
            "change order address to line1: 1 Main St, city: Springfield, state: IL, zip: 62704, country: US",
        );
        assert!(full.contains_key("shippingAddress"));
        let partial = extract_shipping_address("change address to city: Springfield");
        assert!(partial.is_empty());
    }

    #[test]
    fn preference_updates_capture_size_and_lists() {
        let updates = extract_preference_updates("remember my size is M and I like denim");
        assert_eq!(updates["size"], "M");
        assert_eq!(updates["stylePreferences"], json!(["denim"]));
    }

    #[test]
    fn i_like_fallback_takes_first_token() {
        let updates = extract_preference_updates("i like chunky sneakers");
        // "sneakers" maps to the shoes category, so the fallback is not used.
        assert_eq!(updates["categories"], json!(["shoes"]));
        let updates = extract_preference_updates("i like bold prints");
        assert_eq!(updates["stylePreferences"], json!(["bold"]));
    }

    #[test]
    fn forget_preference_key_and_value() {
        assert_eq!(extract_forget_preference("forget my size")["key"], "size");
        assert_eq!(
            extract_forget_preference("forget everything about me")["key"],
            "all"
        );
        assert_eq!(extract_forget_preference("forget denim")["value"], "denim");
        assert!(extract_forget_preference("hello there").is_empty());
    }

    #[test]
    fn view_cart_phrases() {
        assert!(is_view_cart_request("cart"));
        assert!(is_view_cart_request("show me cart"));
        assert!(is_view_cart_request("what's in my cart"));
        assert!(!is_view_cart_request("add to cart"));
    }
}
