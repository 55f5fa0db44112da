//! Product agent: affinity-ranked search with saved-preference fallbacks.

use serde_json::{json, Value};
use std::sync::Arc;

use oc_commerce::ProductService;
use oc_domain::action::{ActionName, AgentAction, AgentName};
use oc_domain::commerce::Product;
use oc_domain::context::AgentContext;
use oc_domain::response::{AgentExecutionResult, SuggestedAction};
use oc_domain::JsonMap;

use crate::params::{f64_param, str_param};
use crate::Agent;

pub struct ProductAgent {
    products: Arc<ProductService>,
}

impl ProductAgent {
    pub fn new(products: Arc<ProductService>) -> Self {
        Self { products }
    }

    fn search(&self, params: &JsonMap, context: &AgentContext) -> AgentExecutionResult {
        let raw_query = str_param(params, "query");
        let mut query = normalize_query(&raw_query);
        if should_browse_without_query(&raw_query, &query) {
            query.clear();
        }

        let inferred_category = infer_category(&query);
        let inferred_brand = infer_brand(&query);
        let (preferred_category, category_reason) = preferred_category(context, &query);
        let (preferred_brand, brand_reason) = preferred_brand(context, &query);
        let category = inferred_category.or(preferred_category);
        let brand = inferred_brand.or(preferred_brand);

        let mut page = self.products.list_products(
            if query.is_empty() { None } else { Some(&query) },
            category.as_deref(),
            brand.as_deref(),
            f64_param(params, "minPrice"),
            f64_param(params, "maxPrice"),
            1,
            8,
        );

        // Color filter applies after the search, from the request or the
        // saved color preference.
        let color = {
            let explicit = str_param(params, "color").to_lowercase();
            if explicit.is_empty() {
                preferred_color(context)
            } else {
                Some(explicit)
            }
        };
        if let Some(color) = color {
            page.products.retain(|product| {
                product
                    .variants
                    .iter()
                    .any(|variant| variant.color.to_lowercase() == color)
            });
            page.pagination.total = page.products.len();
            page.pagination.pages = 1;
        }

        let products = sort_with_affinity(page.products, context);

        let mut reasons = Vec::new();
        if !category_reason.is_empty() {
            reasons.push(category_reason);
        }
        if !brand_reason.is_empty() {
            reasons.push(brand_reason);
        }
        let reason_snippet = if reasons.is_empty() {
            String::new()
        } else {
            format!(
                " Based on your saved preference for {}.",
                reasons.join(" and ")
            )
        };

        if products.is_empty() {
            let mut data = JsonMap::new();
            data.insert("products".into(), json!([]));
            data.insert("pagination".into(), json!(page.pagination));
            return AgentExecutionResult::ok(
                format!("I couldn't find matching products.{reason_snippet} Want to broaden filters?"),
                data,
            )
            .with_next_actions(vec![
                SuggestedAction::new("Show all products", "search:all"),
                SuggestedAction::new("Set max price $150", "search:under_150"),
            ]);
        }

        let top = &products[0];
        let top_variant = top
            .variants
            .first()
            .map(|variant| variant.id.clone())
            .unwrap_or_default();
        let mut next_actions = vec![SuggestedAction::new("Show my cart", "view_cart")];
        if !top_variant.is_empty() {
            next_actions.insert(
                0,
                SuggestedAction::new(
                    format!("Add {}", top.name),
                    format!("add_to_cart:{}:{}", top.id, top_variant),
                ),
            );
        }

        let message = format!(
            "I found {} options. Top result: {} (${:.2}).{reason_snippet}",
            products.len(),
            top.name,
            top.price
        );
        let mut data = JsonMap::new();
        data.insert("products".into(), json!(products));
        data.insert("pagination".into(), json!(page.pagination));
        AgentExecutionResult::ok(message, data).with_next_actions(next_actions)
    }
}

impl Agent for ProductAgent {
    fn name(&self) -> AgentName {
        AgentName::Product
    }

    fn execute(&self, action: &AgentAction, context: &AgentContext) -> AgentExecutionResult {
        match action.name {
            ActionName::SearchProducts => self.search(&action.params, context),
            other => {
                let mut data = JsonMap::new();
                data.insert("code".into(), json!("UNSUPPORTED_ACTION"));
                AgentExecutionResult::failure(
                    format!("The product agent can't handle {other}."),
                    data,
                )
            }
        }
    }
}

// ── Query shaping ───────────────────────────────────────────────────

fn normalize_query(query: &str) -> String {
    let mut lowered = format!(" {} ", query.to_lowercase());
    for phrase in [
        "show me",
        "looking for",
        "i need",
        "i want",
        "find",
        "search",
        "please",
        "recommend",
        "suggest",
        "something",
        "anything",
        "options",
        "products",
        "product",
        "items",
        "item",
    ] {
        lowered = lowered.replace(&format!(" {phrase} "), " ");
    }
    // Strip price phrases like "under $150".
    let price_phrase = regex::Regex::new(r"\b(under|below|over|above)\s*\$?\d+\b")
        .expect("static regex");
    lowered = price_phrase.replace_all(&lowered, " ").to_string();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn should_browse_without_query(raw_query: &str, normalized: &str) -> bool {
    let lower = raw_query.to_lowercase();
    if ["recommend", "suggest", "anything", "something"]
        .iter()
        .any(|token| lower.contains(token))
    {
        return true;
    }
    matches!(normalized, "" | "me" | "for me")
}

fn infer_category(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    if lower.contains("shoe") || lower.contains("runner") {
        return Some("shoes".into());
    }
    if lower.contains("hoodie") || lower.contains("jogger") {
        return Some("clothing".into());
    }
    if lower.contains("sock") || lower.contains("backpack") {
        return Some("accessories".into());
    }
    None
}

fn infer_brand(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    if lower.is_empty() {
        return None;
    }
    for (token, canonical) in [
        ("strideforge", "StrideForge"),
        ("peakroute", "PeakRoute"),
        ("aerothread", "AeroThread"),
        ("carryworks", "CarryWorks"),
    ] {
        if lower.contains(token) {
            return Some(canonical.into());
        }
    }
    None
}

// ── Preference & affinity reads ─────────────────────────────────────

/// Saved preferences steer only empty (browse) queries; an explicit query
/// always wins.
fn preferred_category(context: &AgentContext, query: &str) -> (Option<String>, String) {
    if !query.is_empty() {
        return (None, String::new());
    }
    if let Some(prefs) = &context.preferences {
        if let Some(first) = prefs.categories.first() {
            let category = first.trim().to_lowercase();
            if !category.is_empty() {
                let reason = format!("category {category}");
                return (Some(category), reason);
            }
        }
        if prefs
            .style_preferences
            .iter()
            .any(|style| style.trim().eq_ignore_ascii_case("denim"))
        {
            return (Some("clothing".into()), "style denim".into());
        }
    }
    if let Some(memory) = &context.memory {
        let scores = &memory.product_affinities.categories;
        if let Some((category, _)) = scores.iter().max_by_key(|(_, count)| **count) {
            let category = category.to_lowercase();
            let reason = format!("your past interest in {category}");
            return (Some(category), reason);
        }
    }
    (None, String::new())
}

fn preferred_brand(context: &AgentContext, query: &str) -> (Option<String>, String) {
    if !query.is_empty() {
        return (None, String::new());
    }
    if let Some(prefs) = &context.preferences {
        if let Some(brand) = prefs.brand_preferences.first() {
            let brand = brand.trim().to_owned();
            if !brand.is_empty() {
                let reason = format!("brand {brand}");
                return (Some(brand), reason);
            }
        }
    }
    if let Some(memory) = &context.memory {
        let scores = &memory.product_affinities.brands;
        if let Some((brand, _)) = scores.iter().max_by_key(|(_, count)| **count) {
            let brand = brand.trim().to_owned();
            if !brand.is_empty() {
                let reason = format!("your past interest in {brand}");
                return (Some(brand), reason);
            }
        }
    }
    (None, String::new())
}

fn preferred_color(context: &AgentContext) -> Option<String> {
    context
        .preferences
        .as_ref()
        .and_then(|prefs| prefs.color_preferences.first())
        .map(|color| color.trim().to_lowercase())
        .filter(|color| !color.is_empty())
}

/// Sort by `(product score, category score, brand score, rating)`
/// descending against the shopper's affinity counters.
fn sort_with_affinity(mut products: Vec<Product>, context: &AgentContext) -> Vec<Product> {
    let Some(memory) = &context.memory else {
        return products;
    };
    let affinities = &memory.product_affinities;
    products.sort_by(|a, b| {
        let rank = |item: &Product| {
            (
                affinities.products.get(&item.id).copied().unwrap_or(0),
                affinities
                    .categories
                    .get(&item.category.to_lowercase())
                    .copied()
                    .unwrap_or(0),
                affinities
                    .brands
                    .get(&item.brand.to_lowercase())
                    .copied()
                    .unwrap_or(0),
                (item.rating * 1000.0) as i64,
            )
        };
        rank(b).cmp(&rank(a))
    });
    products
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oc_domain::commerce::{
        ConversationState, MemorySnapshot, Preferences, SessionRecord, Variant,
    };
    use oc_store::Store;

    fn seeded() -> ProductAgent {
        let store = Arc::new(Store::new());
        for (id, name, category, brand, price, rating, color) in [
            ("prod_1", "Trail Runner X", "shoes", "StrideForge", 129.0, 4.2, "black"),
            ("prod_2", "Road Runner Lite", "shoes", "PeakRoute", 89.0, 4.8, "blue"),
            ("prod_3", "Fleece Hoodie", "clothing", "AeroThread", 59.0, 4.5, "gray"),
        ] {
            store.upsert_product(Product {
                id: id.into(),
                name: name.into(),
                description: String::new(),
                category: category.into(),
                brand: brand.into(),
                price,
                rating,
                images: vec![],
                variants: vec![Variant {
                    id: format!("{id}_v1"),
                    size: "9".into(),
                    color: color.into(),
                    in_stock: true,
                }],
            });
        }
        ProductAgent::new(Arc::new(ProductService::new(store)))
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

    fn search(agent: &ProductAgent, ctx: &AgentContext, params: Value) -> AgentExecutionResult {
        agent.execute(
            &AgentAction::new(
                ActionName::SearchProducts,
                params.as_object().cloned().unwrap_or_default(),
            ),
            ctx,
        )
    }

    #[test]
    fn rating_breaks_ties_without_memory() {
        let agent = seeded();
        let result = search(&agent, &context(), json!({"query": "runner"}));
        assert!(result.success);
        let products = result.data["products"].as_array().unwrap();
        assert_eq!(products[0]["id"], "prod_2", "higher rating should lead");
    }

    #[test]
    fn product_affinity_outranks_rating() {
        let agent = seeded();
        let mut ctx = context();
        let mut memory = MemorySnapshot::empty(Utc::now());
        memory
            .product_affinities
            .products
            .insert("prod_1".into(), 5);
        ctx.memory = Some(memory);
        let result = search(&agent, &ctx, json!({"query": "runner"}));
        let products = result.data["products"].as_array().unwrap();
        assert_eq!(products[0]["id"], "prod_1");
    }

    #[test]
    fn preferred_color_filters_results() {
        let agent = seeded();
        let mut ctx = context();
        ctx.preferences = Some(Preferences {
            color_preferences: vec!["blue".into()],
            ..Preferences::default()
        });
        let result = search(&agent, &ctx, json!({"query": "runner"}));
        let products = result.data["products"].as_array().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0]["id"], "prod_2");
    }

    #[test]
    fn browse_request_uses_preferred_brand() {
        let agent = seeded();
        let mut ctx = context();
        ctx.preferences = Some(Preferences {
            brand_preferences: vec!["AeroThread".into()],
            ..Preferences::default()
        });
        let result = search(&agent, &ctx, json!({"query": "recommend something"}));
        assert!(result.message.contains("brand AeroThread"));
    }

    #[test]
    fn price_phrases_are_stripped_from_query() {
        let agent = seeded();
        let result = search(&agent, &context(), json!({"query": "find runner under 150", "maxPrice": 150.0}));
        assert!(result.success);
        let products = result.data["products"].as_array().unwrap();
        assert_eq!(products.len(), 2);
    }

    #[test]
    fn no_matches_offers_broadening() {
        let agent = seeded();
        let result = search(&agent, &context(), json!({"query": "submarine"}));
        assert!(result.success);
        assert!(result.message.contains("couldn't find"));
        assert!(result.data["products"].as_array().unwrap().is_empty());
    }
}
