//! Environment-driven configuration.
//!
//! Every field has a sensible default and an environment override;
//! `Config::validate` reports startup issues without panicking so the
//! binary can log warnings and refuse to boot only on hard errors.

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ── Server ────────────────────────────────────────────────────
    #[serde(default = "d_host")]
    pub server_host: String,
    #[serde(default = "d_port")]
    pub server_port: u16,
    #[serde(default = "d_token_secret")]
    pub token_secret: String,
    #[serde(default = "d_cart_tax_rate")]
    pub cart_tax_rate: f64,
    #[serde(default = "d_shipping_fee")]
    pub default_shipping_fee: f64,
    #[serde(default = "d_rate_anon")]
    pub rate_limit_anonymous_per_minute: u32,
    #[serde(default = "d_rate_auth")]
    pub rate_limit_authenticated_per_minute: u32,

    // ── LLM ───────────────────────────────────────────────────────
    #[serde(default)]
    pub llm_enabled: bool,
    #[serde(default = "d_llm_provider")]
    pub llm_provider: String,
    #[serde(default = "d_llm_model")]
    pub llm_model: String,
    #[serde(default = "d_llm_timeout")]
    pub llm_timeout_seconds: f64,
    #[serde(default = "d_llm_max_tokens")]
    pub llm_max_tokens: u32,
    #[serde(default)]
    pub llm_temperature: f64,
    #[serde(default = "d_breaker_failures")]
    pub llm_circuit_breaker_failure_threshold: u32,
    #[serde(default = "d_breaker_timeout")]
    pub llm_circuit_breaker_timeout_seconds: f64,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub anthropic_api_key: String,

    // ── Planner ───────────────────────────────────────────────────
    #[serde(default = "d_true")]
    pub llm_planner_enabled: bool,
    #[serde(default = "d_decision_policy")]
    pub llm_decision_policy: String,
    #[serde(default = "d_true")]
    pub planner_feature_enabled: bool,
    #[serde(default = "d_canary_percent")]
    pub planner_canary_percent: i32,
    #[serde(default = "d_planner_max_actions")]
    pub llm_planner_max_actions: u32,
    #[serde(default = "d_planner_min_confidence")]
    pub llm_planner_min_confidence: f64,
    #[serde(default = "d_execution_mode")]
    pub llm_planner_execution_mode: String,
    #[serde(default = "d_planner_max_actions")]
    pub orchestrator_max_actions_per_request: u32,

    // ── SuperU provider ───────────────────────────────────────────
    #[serde(default)]
    pub superu_enabled: bool,
    #[serde(default = "d_superu_url")]
    pub superu_api_url: String,
    #[serde(default)]
    pub superu_api_key: String,
    #[serde(default)]
    pub superu_assistant_id: String,
    #[serde(default)]
    pub superu_from_phone_number: String,
    #[serde(default)]
    pub superu_webhook_secret: String,
    #[serde(default = "d_webhook_tolerance")]
    pub superu_webhook_tolerance_seconds: i64,

    // ── Voice recovery ────────────────────────────────────────────
    #[serde(default)]
    pub voice_recovery_scheduler_enabled: bool,
    #[serde(default = "d_scan_interval")]
    pub voice_recovery_scan_interval_seconds: f64,
    #[serde(default = "d_abandonment_minutes")]
    pub voice_abandonment_minutes: u32,
    #[serde(default = "d_max_attempts")]
    pub voice_max_attempts_per_cart: u32,
    #[serde(default = "d_max_user_calls")]
    pub voice_max_calls_per_user_per_day: u32,
    #[serde(default = "d_max_calls")]
    pub voice_max_calls_per_day: u32,
    #[serde(default = "d_daily_budget")]
    pub voice_daily_budget_usd: f64,
    #[serde(default = "d_cost_per_call")]
    pub voice_estimated_cost_per_call_usd: f64,
    #[serde(default = "d_quiet_start")]
    pub voice_quiet_hours_start: u8,
    #[serde(default = "d_quiet_end")]
    pub voice_quiet_hours_end: u8,
    #[serde(default = "d_backoff_csv")]
    pub voice_retry_backoff_seconds_csv: String,
    #[serde(default = "d_script_version")]
    pub voice_script_version: String,
    #[serde(default = "d_script_template")]
    pub voice_script_template: String,
    #[serde(default)]
    pub voice_global_kill_switch: bool,
    #[serde(default = "d_timezone")]
    pub voice_default_timezone: String,
    #[serde(default = "d_backlog_threshold")]
    pub voice_alert_backlog_threshold: u32,
    #[serde(default = "d_failure_ratio")]
    pub voice_alert_failure_ratio_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("defaults deserialize")
    }
}

// ── Default value functions ─────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8080
}
fn d_token_secret() -> String {
    "replace-with-strong-secret".into()
}
fn d_cart_tax_rate() -> f64 {
    0.08
}
fn d_shipping_fee() -> f64 {
    5.99
}
fn d_rate_anon() -> u32 {
    120
}
fn d_rate_auth() -> u32 {
    600
}
fn d_llm_provider() -> String {
    "openai".into()
}
fn d_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn d_llm_timeout() -> f64 {
    8.0
}
fn d_llm_max_tokens() -> u32 {
    200
}
fn d_breaker_failures() -> u32 {
    5
}
fn d_breaker_timeout() -> f64 {
    60.0
}
fn d_true() -> bool {
    true
}
fn d_decision_policy() -> String {
    "planner_first".into()
}
fn d_canary_percent() -> i32 {
    100
}
fn d_planner_max_actions() -> u32 {
    5
}
fn d_planner_min_confidence() -> f64 {
    0.55
}
fn d_execution_mode() -> String {
    "partial".into()
}
fn d_superu_url() -> String {
    "https://api.superu.ai".into()
}
fn d_webhook_tolerance() -> i64 {
    300
}
fn d_scan_interval() -> f64 {
    30.0
}
fn d_abandonment_minutes() -> u32 {
    30
}
fn d_max_attempts() -> u32 {
    3
}
fn d_max_user_calls() -> u32 {
    2
}
fn d_max_calls() -> u32 {
    300
}
fn d_daily_budget() -> f64 {
    300.0
}
fn d_cost_per_call() -> f64 {
    0.7
}
fn d_quiet_start() -> u8 {
    21
}
fn d_quiet_end() -> u8 {
    8
}
fn d_backoff_csv() -> String {
    "60,300,900".into()
}
fn d_script_version() -> String {
    "v1".into()
}
fn d_script_template() -> String {
    "Hi {name}, you still have {item_count} item(s) in your cart worth ${cart_total}. \
     Would you like help checking out?"
        .into()
}
fn d_timezone() -> String {
    "UTC".into()
}
fn d_backlog_threshold() -> u32 {
    50
}
fn d_failure_ratio() -> f64 {
    0.35
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn env_str(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Build the configuration from the process environment, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = Config::default();
        Config {
            server_host: env_str("SERVER_HOST", d.server_host),
            server_port: env_parse("SERVER_PORT", d.server_port),
            token_secret: env_str("TOKEN_SECRET", d.token_secret),
            cart_tax_rate: env_parse("CART_TAX_RATE", d.cart_tax_rate),
            default_shipping_fee: env_parse("DEFAULT_SHIPPING_FEE", d.default_shipping_fee),
            rate_limit_anonymous_per_minute: env_parse(
                "RATE_LIMIT_ANONYMOUS_PER_MINUTE",
                d.rate_limit_anonymous_per_minute,
            ),
            rate_limit_authenticated_per_minute: env_parse(
                "RATE_LIMIT_AUTHENTICATED_PER_MINUTE",
                d.rate_limit_authenticated_per_minute,
            ),
            llm_enabled: env_bool("LLM_ENABLED", d.llm_enabled),
            llm_provider: env_str("LLM_PROVIDER", d.llm_provider)
                .trim()
                .to_lowercase(),
            llm_model: env_str("LLM_MODEL", d.llm_model),
            llm_timeout_seconds: env_parse("LLM_TIMEOUT_SECONDS", d.llm_timeout_seconds),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", d.llm_max_tokens),
            llm_temperature: env_parse("LLM_TEMPERATURE", d.llm_temperature),
            llm_circuit_breaker_failure_threshold: env_parse(
                "LLM_CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                d.llm_circuit_breaker_failure_threshold,
            ),
            llm_circuit_breaker_timeout_seconds: env_parse(
                "LLM_CIRCUIT_BREAKER_TIMEOUT_SECONDS",
                d.llm_circuit_breaker_timeout_seconds,
            ),
            openai_api_key: env_str("OPENAI_API_KEY", d.openai_api_key),
            anthropic_api_key: env_str("ANTHROPIC_API_KEY", d.anthropic_api_key),
            llm_planner_enabled: env_bool("LLM_PLANNER_ENABLED", d.llm_planner_enabled),
            llm_decision_policy: env_str("LLM_DECISION_POLICY", d.llm_decision_policy)
                .trim()
                .to_lowercase(),
            planner_feature_enabled: env_bool(
                "PLANNER_FEATURE_ENABLED",
                d.planner_feature_enabled,
            ),
            planner_canary_percent: env_parse(
                "PLANNER_CANARY_PERCENT",
                d.planner_canary_percent,
            ),
            llm_planner_max_actions: env_parse(
                "LLM_PLANNER_MAX_ACTIONS",
                d.llm_planner_max_actions,
            )
            .clamp(1, 10),
            llm_planner_min_confidence: env_parse(
                "LLM_PLANNER_MIN_CONFIDENCE",
                d.llm_planner_min_confidence,
            )
            .clamp(0.0, 1.0),
            llm_planner_execution_mode: env_str(
                "LLM_PLANNER_EXECUTION_MODE",
                d.llm_planner_execution_mode,
            )
            .trim()
            .to_lowercase(),
            orchestrator_max_actions_per_request: env_parse(
                "ORCHESTRATOR_MAX_ACTIONS_PER_REQUEST",
                d.orchestrator_max_actions_per_request,
            )
            .clamp(1, 10),
            superu_enabled: env_bool("SUPERU_ENABLED", d.superu_enabled),
            superu_api_url: env_str("SUPERU_API_URL", d.superu_api_url),
            superu_api_key: env_str("SUPERU_API_KEY", d.superu_api_key),
            superu_assistant_id: env_str("SUPERU_ASSISTANT_ID", d.superu_assistant_id),
            superu_from_phone_number: env_str(
                "SUPERU_FROM_PHONE_NUMBER",
                d.superu_from_phone_number,
            ),
            superu_webhook_secret: env_str("SUPERU_WEBHOOK_SECRET", d.superu_webhook_secret),
            superu_webhook_tolerance_seconds: env_parse(
                "SUPERU_WEBHOOK_TOLERANCE_SECONDS",
                d.superu_webhook_tolerance_seconds,
            ),
            voice_recovery_scheduler_enabled: env_bool(
                "VOICE_RECOVERY_SCHEDULER_ENABLED",
                d.voice_recovery_scheduler_enabled,
            ),
            voice_recovery_scan_interval_seconds: env_parse(
                "VOICE_RECOVERY_SCAN_INTERVAL_SECONDS",
                d.voice_recovery_scan_interval_seconds,
            ),
            voice_abandonment_minutes: env_parse(
                "VOICE_ABANDONMENT_MINUTES",
                d.voice_abandonment_minutes,
            ),
            voice_max_attempts_per_cart: env_parse(
                "VOICE_MAX_ATTEMPTS_PER_CART",
                d.voice_max_attempts_per_cart,
            ),
            voice_max_calls_per_user_per_day: env_parse(
                "VOICE_MAX_CALLS_PER_USER_PER_DAY",
                d.voice_max_calls_per_user_per_day,
            ),
            voice_max_calls_per_day: env_parse(
                "VOICE_MAX_CALLS_PER_DAY",
                d.voice_max_calls_per_day,
            ),
            voice_daily_budget_usd: env_parse("VOICE_DAILY_BUDGET_USD", d.voice_daily_budget_usd),
            voice_estimated_cost_per_call_usd: env_parse(
                "VOICE_ESTIMATED_COST_PER_CALL_USD",
                d.voice_estimated_cost_per_call_usd,
            ),
            voice_quiet_hours_start: env_parse(
                "VOICE_QUIET_HOURS_START",
                d.voice_quiet_hours_start,
            )
            .min(23),
            voice_quiet_hours_end: env_parse("VOICE_QUIET_HOURS_END", d.voice_quiet_hours_end)
                .min(23),
            voice_retry_backoff_seconds_csv: env_str(
                "VOICE_RETRY_BACKOFF_SECONDS_CSV",
                d.voice_retry_backoff_seconds_csv,
            ),
            voice_script_version: env_str("VOICE_SCRIPT_VERSION", d.voice_script_version),
            voice_script_template: env_str("VOICE_SCRIPT_TEMPLATE", d.voice_script_template),
            voice_global_kill_switch: env_bool(
                "VOICE_GLOBAL_KILL_SWITCH",
                d.voice_global_kill_switch,
            ),
            voice_default_timezone: env_str("VOICE_DEFAULT_TIMEZONE", d.voice_default_timezone),
            voice_alert_backlog_threshold: env_parse(
                "VOICE_ALERT_BACKLOG_THRESHOLD",
                d.voice_alert_backlog_threshold,
            ),
            voice_alert_failure_ratio_threshold: env_parse(
                "VOICE_ALERT_FAILURE_RATIO_THRESHOLD",
                d.voice_alert_failure_ratio_threshold,
            ),
        }
    }

    /// Parse the retry backoff CSV into an ordered list of positive
    /// delays. Falls back to `[60, 300, 900]` when nothing parses.
    pub fn retry_backoff_seconds(&self) -> Vec<u32> {
        let values: Vec<u32> = self
            .voice_retry_backoff_seconds_csv
            .split(',')
            .filter_map(|part| part.trim().parse::<f64>().ok())
            .filter(|v| *v > 0.0)
            .map(|v| v as u32)
            .collect();
        if values.is_empty() {
            vec![60, 300, 900]
        } else {
            values
        }
    }

    /// Scheduler tick period with the 5-second floor applied.
    pub fn voice_scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.voice_recovery_scan_interval_seconds.max(5.0))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server_port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server_port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server_host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server_host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.token_secret == d_token_secret() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "token_secret".into(),
                message: "using the placeholder secret; set TOKEN_SECRET in production".into(),
            });
        }

        if !matches!(self.llm_provider.as_str(), "openai" | "anthropic") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm_provider".into(),
                message: format!("unsupported provider \"{}\"", self.llm_provider),
            });
        }
        if self.llm_enabled {
            let has_key = match self.llm_provider.as_str() {
                "openai" => !self.openai_api_key.is_empty(),
                "anthropic" => !self.anthropic_api_key.is_empty(),
                _ => false,
            };
            if !has_key {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "llm_enabled".into(),
                    message: format!(
                        "LLM enabled but no API key for provider \"{}\"; predictions are disabled",
                        self.llm_provider
                    ),
                });
            }
        }
        if !matches!(
            self.llm_decision_policy.as_str(),
            "planner_first" | "classifier_first"
        ) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm_decision_policy".into(),
                message: format!("unknown policy \"{}\"", self.llm_decision_policy),
            });
        }
        if !matches!(
            self.llm_planner_execution_mode.as_str(),
            "atomic" | "strict" | "partial"
        ) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm_planner_execution_mode".into(),
                message: format!("unknown mode \"{}\"", self.llm_planner_execution_mode),
            });
        }

        if self.superu_api_url.is_empty()
            || (!self.superu_api_url.starts_with("http://")
                && !self.superu_api_url.starts_with("https://"))
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "superu_api_url".into(),
                message: format!(
                    "base URL must start with http:// or https:// (got \"{}\")",
                    self.superu_api_url
                ),
            });
        }
        if self.voice_recovery_scheduler_enabled && !self.superu_enabled {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "voice_recovery_scheduler_enabled".into(),
                message: "scheduler is on but the SuperU client is disabled; jobs will cancel"
                    .into(),
            });
        }
        if self.voice_quiet_hours_start > 23 || self.voice_quiet_hours_end > 23 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "voice_quiet_hours".into(),
                message: "quiet hours must be in [0, 23]".into(),
            });
        }
        if !is_known_timezone_name(&self.voice_default_timezone) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "voice_default_timezone".into(),
                message: format!(
                    "\"{}\" is not a known IANA timezone",
                    self.voice_default_timezone
                ),
            });
        }
        if self.voice_alert_failure_ratio_threshold <= 0.0
            || self.voice_alert_failure_ratio_threshold > 1.0
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "voice_alert_failure_ratio_threshold".into(),
                message: "ratio threshold must be in (0, 1]".into(),
            });
        }

        if self.rate_limit_anonymous_per_minute == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "rate_limit_anonymous_per_minute".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

/// Shallow IANA name check without pulling the tz database into this
/// crate: the canonical form is `Area/Location` or a fixed UTC alias.
/// The voice crate resolves the real zone and falls back to UTC.
fn is_known_timezone_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && (matches!(trimmed, "UTC" | "GMT" | "Etc/UTC") || trimmed.contains('/'))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
