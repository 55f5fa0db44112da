//! SuperU-compatible provider client.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use oc_domain::config::Config;
use oc_domain::error::{Error, Result};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(12);

/// Seam between the recovery service and the telephony provider. The
/// production impl is [`HttpSuperUClient`]; tests use stubs.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    fn enabled(&self) -> bool;

    async fn start_outbound_call(
        &self,
        to_phone_number: &str,
        assistant_id: &str,
        from_phone_number: &str,
        metadata: Value,
    ) -> Result<Value>;

    async fn fetch_call_logs(&self, call_id: &str, limit: usize) -> Result<Vec<Value>>;
}

pub struct HttpSuperUClient {
    base_url: String,
    api_key: String,
    enabled: bool,
    http: reqwest::Client,
}

impl HttpSuperUClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.superu_api_url.trim_end_matches('/').to_owned(),
            api_key: config.superu_api_key.clone(),
            enabled: config.superu_enabled && !config.superu_api_key.trim().is_empty(),
            http,
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .header("superU-Api-Key", &self.api_key)
            .header("Content-Type", "application/json");
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| Error::Provider {
            provider: "superu".into(),
            message: format!("request failed: {e}"),
        })?;
        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "superu".into(),
                message: format!("HTTP {status}: {body_text}"),
            });
        }
        response.json().await.map_err(|e| Error::Provider {
            provider: "superu".into(),
            message: format!("response is not valid JSON: {e}"),
        })
    }
}

#[async_trait]
impl VoiceProvider for HttpSuperUClient {
    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn start_outbound_call(
        &self,
        to_phone_number: &str,
        assistant_id: &str,
        from_phone_number: &str,
        metadata: Value,
    ) -> Result<Value> {
        if !self.enabled {
            return Err(Error::Provider {
                provider: "superu".into(),
                message: "provider is not configured".into(),
            });
        }
        let mut payload = serde_json::json!({
            "assistant_id": assistant_id,
            "phone_number": to_phone_number,
            "from_phone_number": from_phone_number,
        });
        if !metadata.is_null() {
            payload["metadata"] = metadata;
        }
        let response = self
            .request(
                reqwest::Method::POST,
                "/api/v1/call/outbound-call",
                None,
                Some(&payload),
            )
            .await?;
        if !response.is_object() {
            return Err(Error::Provider {
                provider: "superu".into(),
                message: "call response is not a JSON object".into(),
            });
        }
        Ok(response)
    }

    async fn fetch_call_logs(&self, call_id: &str, limit: usize) -> Result<Vec<Value>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let limit = limit.clamp(1, 200).to_string();
        let mut query: Vec<(&str, String)> = vec![("limit", limit)];
        if !call_id.is_empty() {
            query.push(("call_id", call_id.to_owned()));
        }
        let payload = self
            .request(reqwest::Method::GET, "/api/v1/call/logs", Some(&query), None)
            .await?;
        Ok(extract_rows(payload))
    }
}

/// Log responses come back either as a bare list or wrapped in one of a
/// few envelope keys.
fn extract_rows(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(rows) => rows.into_iter().filter(|row| row.is_object()).collect(),
        Value::Object(map) => {
            for key in ["data", "results", "logs", "items", "calls"] {
                if let Some(Value::Array(rows)) = map.get(key) {
                    return rows
                        .iter()
                        .filter(|row| row.is_object())
                        .cloned()
                        .collect();
                }
            }
            vec![Value::Object(map)]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_list_passes_through() {
        let rows = extract_rows(json!([{"status": "completed"}, 42]));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn envelope_keys_are_recognized() {
        for key in ["data", "results", "logs", "items", "calls"] {
            let rows = extract_rows(json!({key: [{"status": "ringing"}]}));
            assert_eq!(rows.len(), 1, "envelope key {key}");
        }
    }

    #[test]
    fn plain_object_wraps_itself() {
        let rows = extract_rows(json!({"status": "completed"}));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], "completed");
    }

    #[test]
    fn scalar_payload_yields_nothing() {
        assert!(extract_rows(json!("nope")).is_empty());
    }

    #[test]
    fn disabled_without_key() {
        let mut config = Config::default();
        config.superu_enabled = true;
        config.superu_api_key = "  ".into();
        assert!(!HttpSuperUClient::new(&config).enabled());
        config.superu_api_key = "sk-superu".into();
        assert!(HttpSuperUClient::new(&config).enabled());
    }
}
