//! Model output parsing: strict JSON first, then a best-effort extraction
//! of the first `{...}` block for models that wrap JSON in prose.

use serde_json::Value;

/// Parse model output into a JSON object. Non-object results are rejected.
pub fn try_parse_json_object(raw: &str) -> Option<Value> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(text) {
        if parsed.is_object() {
            return Some(parsed);
        }
        return None;
    }

    // Greedy: grabs from the first '{' to the last '}' so nested objects
    // survive, matching across newlines.
    let re = regex::Regex::new(r"(?s)\{.*\}").expect("static regex");
    let captured = re.find(text)?;
    let parsed: Value = serde_json::from_str(captured.as_str()).ok()?;
    parsed.is_object().then_some(parsed)
}
