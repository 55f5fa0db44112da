//! Raw provider calls. Both return the model's text content; the caller
//! owns parsing and validation.

use serde_json::Value;

use oc_domain::config::Config;
use oc_domain::error::{Error, Result};

/// OpenAI chat-completions call with JSON response format.
pub async fn call_openai(
    http: &reqwest::Client,
    config: &Config,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    if config.openai_api_key.is_empty() {
        return Err(Error::Config("OPENAI_API_KEY is not configured".into()));
    }

    let body = serde_json::json!({
        "model": config.llm_model,
        "messages": [
            {"role": "system", "content": system_prompt},
            {"role": "user", "content": user_prompt},
        ],
        "temperature": config.llm_temperature,
        "max_tokens": config.llm_max_tokens,
        "response_format": {"type": "json_object"},
    });

    let resp = http
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(&config.openai_api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| provider_error("openai", e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        return Err(Error::Provider {
            provider: "openai".into(),
            message: format!("HTTP {status}: {body_text}"),
        });
    }

    let payload: Value = resp.json().await.map_err(|e| provider_error("openai", e))?;
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Provider {
            provider: "openai".into(),
            message: "response missing choices[0].message.content".into(),
        })
}

/// Anthropic messages call; the system prompt rides in the `system` field.
pub async fn call_anthropic(
    http: &reqwest::Client,
    config: &Config,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    if config.anthropic_api_key.is_empty() {
        return Err(Error::Config("ANTHROPIC_API_KEY is not configured".into()));
    }

    let body = serde_json::json!({
        "model": config.llm_model,
        "max_tokens": config.llm_max_tokens,
        "temperature": config.llm_temperature,
        "system": system_prompt,
        "messages": [{"role": "user", "content": user_prompt}],
    });

    let resp = http
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", &config.anthropic_api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&body)
        .send()
        .await
        .map_err(|e| provider_error("anthropic", e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        return Err(Error::Provider {
            provider: "anthropic".into(),
            message: format!("HTTP {status}: {body_text}"),
        });
    }

    let payload: Value = resp
        .json()
        .await
        .map_err(|e| provider_error("anthropic", e))?;
    payload
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Provider {
            provider: "anthropic".into(),
            message: "response missing content[0].text".into(),
        })
}

fn provider_error(provider: &str, err: impl std::fmt::Display) -> Error {
    Error::Provider {
        provider: provider.into(),
        message: err.to_string(),
    }
}
