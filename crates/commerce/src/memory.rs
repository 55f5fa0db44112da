//! Shopper memory: saved preferences, a bounded interaction history, and
//! the affinity counters consumed by product ranking.

use serde_json::Value;
use std::sync::Arc;

use oc_domain::commerce::{
    MemoryEvent, MemoryEventSummary, MemorySnapshot, Preferences, PriceRange,
};
use oc_domain::JsonMap;
use oc_store::Store;

const HISTORY_CAPACITY: usize = 200;
const SUMMARY_CHARS: usize = 180;

pub struct MemoryService {
    store: Arc<Store>,
}

impl MemoryService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn get_memory_snapshot(&self, user_id: &str) -> MemorySnapshot {
        if let Some(snapshot) = self.store.get_memory(user_id) {
            return snapshot;
        }
        let snapshot = MemorySnapshot::empty(self.store.now());
        self.store.upsert_memory(user_id, snapshot.clone());
        snapshot
    }

    /// Apply explicit preference updates extracted from an utterance.
    /// List fields merge (dedup, order preserved); size and price range
    /// replace.
    pub fn save_preference_updates(&self, user_id: &str, updates: &JsonMap) -> Preferences {
        let mut snapshot = self.get_memory_snapshot(user_id);
        let prefs = &mut snapshot.preferences;

        if let Some(size) = updates.get("size").and_then(Value::as_str) {
            if !size.trim().is_empty() {
                prefs.size = Some(size.trim().to_owned());
            }
        }

        if let Some(range) = updates.get("priceRange").and_then(Value::as_object) {
            let current = prefs.price_range.clone();
            prefs.price_range = PriceRange {
                min: range.get("min").and_then(Value::as_f64).unwrap_or(current.min),
                max: range.get("max").and_then(Value::as_f64).unwrap_or(current.max),
            };
        }

        for (key, field) in Self::list_fields(prefs) {
            if let Some(raw) = updates.get(key) {
                let tokens = normalize_list(raw);
                if !tokens.is_empty() {
                    let merged: Vec<String> =
                        field.iter().cloned().chain(tokens).collect();
                    *field = dedupe_preserve_order(merged);
                }
            }
        }

        snapshot.updated_at = self.store.now();
        self.store.upsert_memory(user_id, snapshot.clone());
        snapshot.preferences
    }

    /// Forget one preference key, one value across list fields, or
    /// everything when `key == "all"`.
    pub fn forget_preference(
        &self,
        user_id: &str,
        key: Option<&str>,
        value: Option<&str>,
    ) -> Preferences {
        let mut snapshot = self.get_memory_snapshot(user_id);
        let normalized_value = value.map(|v| v.trim().to_lowercase()).unwrap_or_default();

        match key.map(str::trim).unwrap_or("") {
            "all" => snapshot.preferences = Preferences::default(),
            "size" => snapshot.preferences.size = None,
            "priceRange" => snapshot.preferences.price_range = PriceRange::default(),
            field @ ("brandPreferences" | "categories" | "stylePreferences"
            | "colorPreferences") => {
                let prefs = &mut snapshot.preferences;
                let target = match field {
                    "brandPreferences" => &mut prefs.brand_preferences,
                    "categories" => &mut prefs.categories,
                    "stylePreferences" => &mut prefs.style_preferences,
                    _ => &mut prefs.color_preferences,
                };
                if normalized_value.is_empty() {
                    target.clear();
                } else {
                    target.retain(|item| item != &normalized_value);
                }
            }
            _ if !normalized_value.is_empty() => {
                let prefs = &mut snapshot.preferences;
                for (_, field) in Self::list_fields(prefs) {
                    field.retain(|item| item != &normalized_value);
                }
            }
            _ => {}
        }

        snapshot.updated_at = self.store.now();
        self.store.upsert_memory(user_id, snapshot.clone());
        snapshot.preferences
    }

    pub fn clear_memory(&self, user_id: &str) {
        self.store
            .upsert_memory(user_id, MemorySnapshot::empty(self.store.now()));
    }

    /// Human-readable memory summary for `show_memory`.
    pub fn summarize_memory(&self, user_id: &str) -> (Preferences, Vec<String>, Vec<MemoryEvent>) {
        let snapshot = self.get_memory_snapshot(user_id);
        let prefs = snapshot.preferences.clone();

        let mut highlights = Vec::new();
        if let Some(size) = &prefs.size {
            highlights.push(format!("Saved size: {size}"));
        }
        if !prefs.categories.is_empty() {
            highlights.push(format!(
                "Preferred categories: {}",
                prefs.categories.join(", ")
            ));
        }
        if !prefs.brand_preferences.is_empty() {
            highlights.push(format!(
                "Preferred brands: {}",
                prefs.brand_preferences.join(", ")
            ));
        }
        if !prefs.style_preferences.is_empty() {
            highlights.push(format!(
                "Style preferences: {}",
                prefs.style_preferences.join(", ")
            ));
        }
        if !prefs.color_preferences.is_empty() {
            highlights.push(format!(
                "Color preferences: {}",
                prefs.color_preferences.join(", ")
            ));
        }
        if let Some(top) = top_entry(&snapshot.product_affinities.categories) {
            highlights.push(format!("Top affinity category: {top}"));
        }
        if let Some(top) = top_entry(&snapshot.product_affinities.brands) {
            highlights.push(format!("Top affinity brand: {top}"));
        }
        if highlights.is_empty() {
            highlights.push("No explicit preferences saved yet.".into());
        }

        let recent: Vec<MemoryEvent> = snapshot
            .interaction_history
            .iter()
            .rev()
            .take(5)
            .rev()
            .cloned()
            .collect();
        (prefs, highlights, recent)
    }

    /// Write-back after a turn: append a history event and bump affinity
    /// counters from any products or order items in the response.
    pub fn record_interaction(
        &self,
        user_id: Option<&str>,
        intent: &str,
        message: &str,
        response: &Value,
    ) {
        let Some(user_id) = user_id else {
            return;
        };
        let mut snapshot = self.get_memory_snapshot(user_id);
        let now = self.store.now();

        snapshot.interaction_history.push(MemoryEvent {
            kind: intent.to_owned(),
            timestamp: now,
            summary: MemoryEventSummary {
                query: clip(message),
                action: intent.to_owned(),
                response: clip(
                    response
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                ),
            },
        });
        if snapshot.interaction_history.len() > HISTORY_CAPACITY {
            let overflow = snapshot.interaction_history.len() - HISTORY_CAPACITY;
            snapshot.interaction_history.drain(..overflow);
        }

        let data = response.get("data").cloned().unwrap_or(Value::Null);
        let affinities = &mut snapshot.product_affinities;

        if let Some(products) = find_products(&data) {
            for product in products {
                let id = product.get("id").and_then(Value::as_str).unwrap_or("");
                let category = product
                    .get("category")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_lowercase();
                let brand = product
                    .get("brand")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_lowercase();
                if !id.is_empty() {
                    *affinities.products.entry(id.to_owned()).or_insert(0) += 1;
                }
                if !category.is_empty() {
                    *affinities.categories.entry(category).or_insert(0) += 1;
                }
                if !brand.is_empty() {
                    *affinities.brands.entry(brand).or_insert(0) += 1;
                }
            }
        }

        if let Some(items) = data
            .get("order")
            .and_then(|o| o.get("items"))
            .and_then(Value::as_array)
        {
            for item in items {
                let product_id = item.get("productId").and_then(Value::as_str).unwrap_or("");
                if !product_id.is_empty() {
                    let quantity = item.get("quantity").and_then(Value::as_i64).unwrap_or(1);
                    *affinities.products.entry(product_id.to_owned()).or_insert(0) += quantity;
                }
            }
        }

        snapshot.updated_at = now;
        self.store.upsert_memory(user_id, snapshot);
    }

    /// The last `limit` history events, oldest first.
    pub fn get_history(&self, user_id: &str, limit: usize) -> Vec<MemoryEvent> {
        let snapshot = self.get_memory_snapshot(user_id);
        let capped = limit.clamp(1, 100);
        snapshot
            .interaction_history
            .iter()
            .rev()
            .take(capped)
            .rev()
            .cloned()
            .collect()
    }

    fn list_fields<'a>(
        prefs: &'a mut Preferences,
    ) -> [(&'static str, &'a mut Vec<String>); 4] {
        [
            ("brandPreferences", &mut prefs.brand_preferences),
            ("categories", &mut prefs.categories),
            ("stylePreferences", &mut prefs.style_preferences),
            ("colorPreferences", &mut prefs.color_preferences),
        ]
    }
}

fn find_products(data: &Value) -> Option<&Vec<Value>> {
    data.get("products").and_then(Value::as_array)
}

fn top_entry(scores: &std::collections::HashMap<String, i64>) -> Option<&str> {
    scores
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(key, _)| key.as_str())
}

fn clip(text: &str) -> String {
    text.chars().take(SUMMARY_CHARS).collect()
}

fn normalize_list(raw: &Value) -> Vec<String> {
    let values: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Null => vec![],
        other => vec![other],
    };
    let cleaned: Vec<String> = values
        .into_iter()
        .filter_map(Value::as_str)
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    dedupe_preserve_order(cleaned)
}

fn dedupe_preserve_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
