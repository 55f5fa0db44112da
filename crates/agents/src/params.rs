//! Small helpers for reading heterogeneous action params.

use serde_json::Value;

use oc_domain::JsonMap;

pub fn str_param(params: &JsonMap, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_owned()
}

pub fn f64_param(params: &JsonMap, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

pub fn i64_param(params: &JsonMap, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

/// Quantity clamped to the legal range `[1, 50]`; absent defaults to 1.
pub fn quantity_param(params: &JsonMap, key: &str) -> u32 {
    i64_param(params, key).unwrap_or(1).clamp(1, 50) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantity_clamps_and_defaults() {
        let mut params = JsonMap::new();
        assert_eq!(quantity_param(&params, "quantity"), 1);
        params.insert("quantity".into(), json!(120));
        assert_eq!(quantity_param(&params, "quantity"), 50);
        params.insert("quantity".into(), json!(0));
        assert_eq!(quantity_param(&params, "quantity"), 1);
        params.insert("quantity".into(), json!("7"));
        assert_eq!(quantity_param(&params, "quantity"), 7);
    }
}
