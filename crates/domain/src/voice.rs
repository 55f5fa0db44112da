//! Voice-recovery record types: tenant settings, jobs, calls, alerts,
//! and suppressions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tenant-wide voice-recovery settings. Held as a read-copy-update
/// snapshot; `update` clamps every field to its legal range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub enabled: bool,
    pub kill_switch: bool,
    pub abandonment_minutes: u32,
    pub max_attempts_per_cart: u32,
    pub max_calls_per_user_per_day: u32,
    pub max_calls_per_day: u32,
    pub daily_budget_usd: f64,
    pub estimated_cost_per_call_usd: f64,
    /// Local hours in `[0, 23]`. `start == end` means never quiet.
    pub quiet_hours_start: u8,
    pub quiet_hours_end: u8,
    /// Ordered positive delays; the last element repeats when attempts
    /// outnumber entries.
    pub retry_backoff_seconds: Vec<u32>,
    pub script_version: String,
    pub script_template: String,
    pub assistant_id: String,
    pub from_phone_number: String,
    pub default_timezone: String,
    pub alert_backlog_threshold: u32,
    pub alert_failure_ratio_threshold: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceJobStatus {
    Queued,
    Retrying,
    Processing,
    Completed,
    Cancelled,
    DeadLetter,
}

impl VoiceJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceJobStatus::Queued => "queued",
            VoiceJobStatus::Retrying => "retrying",
            VoiceJobStatus::Processing => "processing",
            VoiceJobStatus::Completed => "completed",
            VoiceJobStatus::Cancelled => "cancelled",
            VoiceJobStatus::DeadLetter => "dead_letter",
        }
    }

}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceJob {
    pub id: String,
    pub status: VoiceJobStatus,
    pub user_id: String,
    pub session_id: String,
    pub cart_id: String,
    /// `"{cartId}::{cart.updatedAt}"`; at most one job and one call per key.
    pub recovery_key: String,
    pub attempt: u32,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Calls
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Suppressed,
    Skipped,
    Retrying,
}

impl VoiceCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceCallStatus::Queued => "queued",
            VoiceCallStatus::Initiated => "initiated",
            VoiceCallStatus::Ringing => "ringing",
            VoiceCallStatus::InProgress => "in_progress",
            VoiceCallStatus::Completed => "completed",
            VoiceCallStatus::Failed => "failed",
            VoiceCallStatus::Suppressed => "suppressed",
            VoiceCallStatus::Skipped => "skipped",
            VoiceCallStatus::Retrying => "retrying",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VoiceCallStatus::Completed | VoiceCallStatus::Failed)
    }

    /// Statuses the poller watches for provider-side progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            VoiceCallStatus::Initiated | VoiceCallStatus::Ringing | VoiceCallStatus::InProgress
        )
    }
}

/// One dispatch attempt recorded on the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAttempt {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub status: VoiceCallStatus,
    pub error: Option<String>,
    pub request: Value,
    pub response: Value,
}

/// One ingested provider event, ring-buffered at
/// [`VoiceCall::EVENT_RING_CAPACITY`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEvent {
    pub key: String,
    pub status: String,
    pub outcome: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCall {
    pub id: String,
    pub recovery_key: String,
    pub user_id: String,
    pub session_id: String,
    pub cart_id: String,
    pub status: VoiceCallStatus,
    pub attempt_count: u32,
    pub attempts: Vec<CallAttempt>,
    pub provider: String,
    pub provider_call_id: Option<String>,
    /// Duplicate-free, bounded; webhook redeliveries match here.
    pub provider_event_keys: Vec<String>,
    pub provider_events: Vec<ProviderEvent>,
    pub provider_payload: Option<Value>,
    pub script_version: String,
    pub campaign: Value,
    pub outcome: String,
    /// Guards the at-most-once follow-up on terminal transitions.
    pub followup_applied: bool,
    pub estimated_cost_usd: f64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VoiceCall {
    pub const EVENT_RING_CAPACITY: usize = 200;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Suppressions & alerts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSuppression {
    pub user_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceAlert {
    pub id: String,
    pub code: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

/// Alert history cap; older entries fall off the front.
pub const ALERT_RING_CAPACITY: usize = 500;
