//! The voice-recovery service: settings, the scheduler tick pipeline
//! (enqueue, process, poll, alert), and the per-job state machine.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use oc_commerce::{NotificationService, SupportService};
use oc_domain::commerce::{Cart, User};
use oc_domain::config::Config;
use oc_domain::voice::{
    AlertSeverity, CallAttempt, VoiceAlert, VoiceCall, VoiceCallStatus, VoiceJob, VoiceJobStatus,
    VoiceSettings, VoiceSuppression,
};
use oc_domain::JsonMap;
use oc_store::Store;

use crate::quiet::{in_quiet_hours, next_non_quiet_time, parse_tz};
use crate::superu::VoiceProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tick report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCounters {
    pub completed: u32,
    pub retried: u32,
    pub dead_letter: u32,
    pub cancelled: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub enqueued: u32,
    pub processed: ProcessCounters,
    pub polled: u32,
    pub alerts_generated: u32,
    pub settings_enabled: bool,
}

enum JobOutcome {
    Completed,
    Retried,
    DeadLetter,
    Cancelled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct VoiceRecoveryService {
    pub(crate) store: Arc<Store>,
    provider: Arc<dyn VoiceProvider>,
    pub(crate) support: Arc<SupportService>,
    pub(crate) notifications: Arc<NotificationService>,
    default_script_template: String,
}

impl VoiceRecoveryService {
    pub fn new(
        store: Arc<Store>,
        config: &Config,
        provider: Arc<dyn VoiceProvider>,
        support: Arc<SupportService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        let service = Self {
            store,
            provider,
            support,
            notifications,
            default_script_template: config.voice_script_template.clone(),
        };
        service.ensure_defaults(config);
        service
    }

    fn ensure_defaults(&self, config: &Config) {
        if self.store.voice_settings().is_some() {
            return;
        }
        self.store.set_voice_settings(VoiceSettings {
            enabled: config.superu_enabled,
            kill_switch: config.voice_global_kill_switch,
            abandonment_minutes: config.voice_abandonment_minutes.max(1),
            max_attempts_per_cart: config.voice_max_attempts_per_cart.max(1),
            max_calls_per_user_per_day: config.voice_max_calls_per_user_per_day.max(1),
            max_calls_per_day: config.voice_max_calls_per_day.max(1),
            daily_budget_usd: config.voice_daily_budget_usd.max(0.0),
            estimated_cost_per_call_usd: config.voice_estimated_cost_per_call_usd.max(0.0),
            quiet_hours_start: config.voice_quiet_hours_start.min(23),
            quiet_hours_end: config.voice_quiet_hours_end.min(23),
            retry_backoff_seconds: config.retry_backoff_seconds(),
            script_version: config.voice_script_version.clone(),
            script_template: config.voice_script_template.clone(),
            assistant_id: config.superu_assistant_id.clone(),
            from_phone_number: config.superu_from_phone_number.clone(),
            default_timezone: config.voice_default_timezone.clone(),
            alert_backlog_threshold: config.voice_alert_backlog_threshold.max(1),
            alert_failure_ratio_threshold: config
                .voice_alert_failure_ratio_threshold
                .clamp(0.01, 1.0),
        });
    }

    // ── Settings ──────────────────────────────────────────────────

    pub fn get_settings(&self) -> VoiceSettings {
        self.store
            .voice_settings()
            .expect("voice settings are initialized at construction")
    }

    /// Merge a partial update into the settings snapshot, clamping every
    /// field to its legal range.
    pub fn update_settings(&self, updates: &JsonMap) -> VoiceSettings {
        let current = self.get_settings();
        let get_bool =
            |key: &str, fallback: bool| updates.get(key).and_then(Value::as_bool).unwrap_or(fallback);
        let get_u32 = |key: &str, fallback: u32| {
            updates
                .get(key)
                .and_then(Value::as_i64)
                .map(|v| v.max(0) as u32)
                .unwrap_or(fallback)
        };
        let get_f64 = |key: &str, fallback: f64| {
            updates.get(key).and_then(Value::as_f64).unwrap_or(fallback)
        };
        let get_string = |key: &str, fallback: &str| {
            updates
                .get(key)
                .and_then(Value::as_str)
                .map(|v| v.trim().to_owned())
                .unwrap_or_else(|| fallback.to_owned())
        };

        let backoff = match updates.get("retryBackoffSeconds") {
            Some(raw) => normalize_backoff_list(raw),
            None => current.retry_backoff_seconds.clone(),
        };
        let script_version = {
            let v = get_string("scriptVersion", &current.script_version);
            if v.is_empty() {
                "v1".to_owned()
            } else {
                v
            }
        };
        let default_timezone = {
            let v = get_string("defaultTimezone", &current.default_timezone);
            if v.is_empty() {
                "UTC".to_owned()
            } else {
                v
            }
        };

        let merged = VoiceSettings {
            enabled: get_bool("enabled", current.enabled),
            kill_switch: get_bool("killSwitch", current.kill_switch),
            abandonment_minutes: get_u32("abandonmentMinutes", current.abandonment_minutes).max(1),
            max_attempts_per_cart: get_u32("maxAttemptsPerCart", current.max_attempts_per_cart)
                .max(1),
            max_calls_per_user_per_day: get_u32(
                "maxCallsPerUserPerDay",
                current.max_calls_per_user_per_day,
            )
            .max(1),
            max_calls_per_day: get_u32("maxCallsPerDay", current.max_calls_per_day).max(1),
            daily_budget_usd: get_f64("dailyBudgetUsd", current.daily_budget_usd).max(0.0),
            estimated_cost_per_call_usd: get_f64(
                "estimatedCostPerCallUsd",
                current.estimated_cost_per_call_usd,
            )
            .max(0.0),
            quiet_hours_start: get_u32("quietHoursStart", u32::from(current.quiet_hours_start))
                .min(23) as u8,
            quiet_hours_end: get_u32("quietHoursEnd", u32::from(current.quiet_hours_end)).min(23)
                as u8,
            retry_backoff_seconds: backoff,
            script_version,
            script_template: get_string("scriptTemplate", &current.script_template),
            assistant_id: get_string("assistantId", &current.assistant_id),
            from_phone_number: get_string("fromPhoneNumber", &current.from_phone_number),
            default_timezone,
            alert_backlog_threshold: get_u32(
                "alertBacklogThreshold",
                current.alert_backlog_threshold,
            )
            .max(1),
            alert_failure_ratio_threshold: get_f64(
                "alertFailureRatioThreshold",
                current.alert_failure_ratio_threshold,
            )
            .clamp(0.01, 1.0),
        };
        self.store.set_voice_settings(merged.clone());
        merged
    }

    // ── Admin reads ───────────────────────────────────────────────

    pub fn list_calls(&self, limit: usize, status: Option<&str>) -> Vec<VoiceCall> {
        let mut rows: Vec<VoiceCall> = self
            .store
            .list_voice_calls()
            .into_iter()
            .filter(|call| status.is_none_or(|s| call.status.as_str() == s))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.clamp(1, 500));
        rows
    }

    pub fn list_jobs(&self, limit: usize, status: Option<&str>) -> Vec<VoiceJob> {
        let mut rows: Vec<VoiceJob> = self
            .store
            .list_voice_jobs()
            .into_iter()
            .filter(|job| status.is_none_or(|s| job.status.as_str() == s))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.clamp(1, 500));
        rows
    }

    pub fn suppress_user(&self, user_id: &str, reason: &str) -> VoiceSuppression {
        let suppression = VoiceSuppression {
            user_id: user_id.to_owned(),
            reason: {
                let trimmed = reason.trim();
                if trimmed.is_empty() {
                    "manual_suppression".to_owned()
                } else {
                    trimmed.to_owned()
                }
            },
            created_at: self.store.now(),
        };
        self.store.upsert_suppression(suppression.clone());
        suppression
    }

    pub fn unsuppress_user(&self, user_id: &str) {
        self.store.remove_suppression(user_id);
    }

    pub fn list_suppressions(&self) -> Vec<VoiceSuppression> {
        let mut rows = self.store.list_suppressions();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub fn list_alerts(&self, limit: usize, severity: Option<&str>) -> Vec<VoiceAlert> {
        let mut rows: Vec<VoiceAlert> = self
            .store
            .list_voice_alerts()
            .into_iter()
            .filter(|alert| severity.is_none_or(|s| alert.severity.as_str() == s))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.clamp(1, 200));
        rows
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Value {
        let settings = self.get_settings();
        let today = now.date_naive();
        let calls = self.store.list_voice_calls();
        let jobs = self.store.list_voice_jobs();

        let calls_today: Vec<&VoiceCall> = calls
            .iter()
            .filter(|call| call.created_at.date_naive() == today)
            .collect();
        let completed_today = calls_today
            .iter()
            .filter(|call| call.status == VoiceCallStatus::Completed)
            .count();
        let failed_today = calls_today
            .iter()
            .filter(|call| call.status == VoiceCallStatus::Failed)
            .count();
        let suppressed_today = calls_today
            .iter()
            .filter(|call| {
                matches!(
                    call.status,
                    VoiceCallStatus::Suppressed | VoiceCallStatus::Skipped
                )
            })
            .count();
        let pending_jobs = jobs
            .iter()
            .filter(|job| {
                matches!(job.status, VoiceJobStatus::Queued | VoiceJobStatus::Retrying)
            })
            .count();
        let retrying_jobs = jobs
            .iter()
            .filter(|job| job.status == VoiceJobStatus::Retrying)
            .count();
        let estimated_spend =
            (calls_today.len() as f64 * settings.estimated_cost_per_call_usd * 100.0).round()
                / 100.0;

        json!({
            "enabled": settings.enabled,
            "totalCalls": calls.len(),
            "callsToday": calls_today.len(),
            "completedToday": completed_today,
            "failedToday": failed_today,
            "suppressedToday": suppressed_today,
            "pendingJobs": pending_jobs,
            "retryingJobs": retrying_jobs,
            "estimatedSpendToday": estimated_spend,
            "dailyBudgetUsd": settings.daily_budget_usd,
            "maxCallsPerDay": settings.max_calls_per_day,
            "alertsOpen": self.store.list_voice_alerts().len(),
        })
    }

    // ── Tick pipeline ─────────────────────────────────────────────

    /// One scheduler tick: enqueue abandoned carts, process due jobs
    /// strictly serially, poll the provider, evaluate alerts.
    pub async fn process_due_work(&self, now: DateTime<Utc>) -> TickReport {
        let enqueued = self.enqueue_abandoned_cart_jobs(now);
        let processed = self.process_due_jobs(now).await;
        let polled = self.poll_provider_updates(now).await;
        let alerts_generated = self.evaluate_alerts(now);
        TickReport {
            enqueued,
            processed,
            polled,
            alerts_generated,
            settings_enabled: self.get_settings().enabled,
        }
    }

    /// Detect abandoned carts and queue at most one job per cart
    /// snapshot (recovery key).
    fn enqueue_abandoned_cart_jobs(&self, now: DateTime<Utc>) -> u32 {
        let settings = self.get_settings();
        if !settings.enabled {
            return 0;
        }
        let cutoff = now - Duration::minutes(i64::from(settings.abandonment_minutes));
        // Every job status claims its key: one job per cart snapshot, ever.
        let mut existing_keys: std::collections::HashSet<String> = self
            .store
            .list_voice_jobs()
            .into_iter()
            .map(|job| job.recovery_key)
            .collect();

        let mut enqueued = 0;
        for cart in self.store.list_carts() {
            let Some(user_id) = cart.user_id.clone().filter(|id| !id.trim().is_empty()) else {
                continue;
            };
            if cart.item_count == 0 {
                continue;
            }
            if cart.updated_at > cutoff {
                continue;
            }
            if self.has_newer_order(&user_id, cart.updated_at) {
                continue;
            }
            let recovery_key = recovery_key(&cart);
            if existing_keys.contains(&recovery_key)
                || self.store.voice_idempotency_contains(&recovery_key)
            {
                continue;
            }
            let job = VoiceJob {
                id: self.store.ids.next("vjob"),
                status: VoiceJobStatus::Queued,
                user_id,
                session_id: cart.session_id.clone(),
                cart_id: cart.id.clone(),
                recovery_key: recovery_key.clone(),
                attempt: 0,
                next_run_at: Some(now),
                last_error: None,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_voice_job(job);
            existing_keys.insert(recovery_key);
            enqueued += 1;
        }
        enqueued
    }

    /// Run every due job, oldest first, strictly serially so the
    /// guardrail counters stay consistent.
    async fn process_due_jobs(&self, now: DateTime<Utc>) -> ProcessCounters {
        let mut due: Vec<VoiceJob> = self
            .store
            .list_voice_jobs()
            .into_iter()
            .filter(|job| {
                matches!(job.status, VoiceJobStatus::Queued | VoiceJobStatus::Retrying)
                    && job.next_run_at.is_some_and(|t| t <= now)
            })
            .collect();
        due.sort_by_key(|job| job.next_run_at);

        let mut counters = ProcessCounters::default();
        for job in due {
            match self.process_single_job(&job, now).await {
                JobOutcome::Completed => counters.completed += 1,
                JobOutcome::Retried => counters.retried += 1,
                JobOutcome::DeadLetter => counters.dead_letter += 1,
                JobOutcome::Cancelled => counters.cancelled += 1,
            }
        }
        counters
    }

    /// The guardrail ladder; the first failing check decides the job.
    async fn process_single_job(&self, job: &VoiceJob, now: DateTime<Utc>) -> JobOutcome {
        let settings = self.get_settings();

        // 1. Kill switch.
        if settings.kill_switch {
            self.complete_job(&job.id, VoiceJobStatus::Cancelled, Some("kill_switch"), now);
            self.append_alert(
                "VOICE_KILL_SWITCH_ACTIVE",
                "Voice recovery kill switch is active; jobs are being cancelled.",
                AlertSeverity::Warning,
                json!({}),
            );
            return JobOutcome::Cancelled;
        }

        // 2. Cart/user sanity.
        let user = self.store.get_user(&job.user_id);
        let cart = self.store.get_cart(&job.cart_id);
        let (Some(user), Some(cart)) = (user, cart) else {
            self.complete_job(
                &job.id,
                VoiceJobStatus::Cancelled,
                Some("cart_or_user_missing"),
                now,
            );
            self.record_call_event(
                job,
                None,
                None,
                VoiceCallStatus::Skipped,
                Some("cart_or_user_missing"),
                None,
                None,
                None,
                None,
                None,
                now,
            );
            return JobOutcome::Cancelled;
        };
        if cart.item_count == 0 {
            self.complete_job(
                &job.id,
                VoiceJobStatus::Cancelled,
                Some("cart_or_user_missing"),
                now,
            );
            self.record_call_event(
                job,
                Some(&cart),
                Some(&user),
                VoiceCallStatus::Skipped,
                Some("cart_or_user_missing"),
                None,
                None,
                None,
                None,
                None,
                now,
            );
            return JobOutcome::Cancelled;
        }

        // 3. Suppression.
        if self.store.is_suppressed(&user.id) {
            self.complete_job(&job.id, VoiceJobStatus::Cancelled, Some("suppressed_user"), now);
            self.record_call_event(
                job,
                Some(&cart),
                Some(&user),
                VoiceCallStatus::Suppressed,
                Some("suppressed_user"),
                None,
                None,
                None,
                None,
                None,
                now,
            );
            return JobOutcome::Cancelled;
        }

        // 4. Phone present.
        let phone = user.phone.trim().to_owned();
        if phone.is_empty() {
            self.complete_job(&job.id, VoiceJobStatus::Cancelled, Some("missing_phone"), now);
            self.record_call_event(
                job,
                Some(&cart),
                Some(&user),
                VoiceCallStatus::Skipped,
                Some("missing_phone"),
                None,
                None,
                None,
                None,
                None,
                now,
            );
            return JobOutcome::Cancelled;
        }

        // 5. Quiet hours in the user's local time.
        let tz = parse_tz(if user.timezone.trim().is_empty() {
            &settings.default_timezone
        } else {
            &user.timezone
        });
        if in_quiet_hours(now, tz, settings.quiet_hours_start, settings.quiet_hours_end) {
            let next_run =
                next_non_quiet_time(now, tz, settings.quiet_hours_start, settings.quiet_hours_end);
            self.reschedule_job(&job.id, job.attempt, next_run, None, now);
            return JobOutcome::Retried;
        }

        // 6. Daily caps and budget.
        if let Some(reason) = self.budget_and_cap_guardrails(&user.id, &settings, now) {
            self.complete_job(&job.id, VoiceJobStatus::Cancelled, Some(reason), now);
            self.record_call_event(
                job,
                Some(&cart),
                Some(&user),
                VoiceCallStatus::Skipped,
                Some(reason),
                None,
                None,
                None,
                None,
                None,
                now,
            );
            self.append_alert(
                "VOICE_GUARDRAIL_TRIGGERED",
                &format!("Voice call blocked by guardrail: {reason}"),
                AlertSeverity::Warning,
                json!({"userId": user.id, "jobId": job.id}),
            );
            return JobOutcome::Cancelled;
        }

        // 7. Provider configured.
        let campaign = self.campaign_payload(&user, &cart, &settings);
        let assistant_id = settings.assistant_id.trim().to_owned();
        let from_phone = settings.from_phone_number.trim().to_owned();
        if !self.provider.enabled() {
            self.complete_job(
                &job.id,
                VoiceJobStatus::Cancelled,
                Some("provider_not_configured"),
                now,
            );
            self.record_call_event(
                job,
                Some(&cart),
                Some(&user),
                VoiceCallStatus::Skipped,
                Some("provider_not_configured"),
                Some(campaign),
                None,
                None,
                None,
                None,
                now,
            );
            self.append_alert(
                "VOICE_PROVIDER_NOT_CONFIGURED",
                "Voice recovery is enabled but SuperU credentials are missing.",
                AlertSeverity::Critical,
                json!({}),
            );
            return JobOutcome::Cancelled;
        }
        if assistant_id.is_empty() || from_phone.is_empty() {
            self.complete_job(
                &job.id,
                VoiceJobStatus::Cancelled,
                Some("provider_not_configured"),
                now,
            );
            self.record_call_event(
                job,
                Some(&cart),
                Some(&user),
                VoiceCallStatus::Skipped,
                Some("provider_not_configured"),
                Some(campaign),
                None,
                None,
                None,
                None,
                now,
            );
            self.append_alert(
                "VOICE_PROVIDER_NOT_CONFIGURED",
                "Voice settings require assistantId and fromPhoneNumber.",
                AlertSeverity::Critical,
                json!({}),
            );
            return JobOutcome::Cancelled;
        }

        // 8. Dispatch.
        let attempt_number = job.attempt + 1;
        let metadata = json!({
            "campaign": campaign,
            "jobId": job.id,
            "cartId": cart.id,
            "userId": user.id,
        });
        match self
            .provider
            .start_outbound_call(&phone, &assistant_id, &from_phone, metadata)
            .await
        {
            Ok(response) => {
                let provider_call_id = extract_provider_call_id(&response);
                tracing::info!(
                    job_id = %job.id,
                    cart_id = %cart.id,
                    provider_call_id = provider_call_id.as_deref().unwrap_or(""),
                    attempt = attempt_number,
                    "voice call dispatched"
                );
                self.complete_job(&job.id, VoiceJobStatus::Completed, None, now);
                self.record_call_event(
                    job,
                    Some(&cart),
                    Some(&user),
                    VoiceCallStatus::Initiated,
                    None,
                    Some(campaign),
                    Some(response),
                    provider_call_id.as_deref(),
                    Some(attempt_number),
                    None,
                    now,
                );
                self.store.set_voice_idempotency(
                    &job.recovery_key,
                    provider_call_id.as_deref().unwrap_or(&job.id),
                );
                JobOutcome::Completed
            }
            Err(err) => {
                let error = err.to_string();
                let max_attempts = settings.max_attempts_per_cart.max(1);
                if attempt_number >= max_attempts {
                    tracing::warn!(
                        job_id = %job.id,
                        attempt = attempt_number,
                        error = %error,
                        "voice job exhausted retries"
                    );
                    self.complete_job(&job.id, VoiceJobStatus::DeadLetter, Some(&error), now);
                    self.record_call_event(
                        job,
                        Some(&cart),
                        Some(&user),
                        VoiceCallStatus::Failed,
                        Some(&error),
                        Some(campaign),
                        None,
                        None,
                        Some(attempt_number),
                        None,
                        now,
                    );
                    self.append_alert(
                        "VOICE_DEAD_LETTER",
                        "Voice call job moved to dead-letter after max retries.",
                        AlertSeverity::Critical,
                        json!({"jobId": job.id, "error": error}),
                    );
                    return JobOutcome::DeadLetter;
                }

                let backoffs = &settings.retry_backoff_seconds;
                let index = ((attempt_number - 1) as usize).min(backoffs.len().saturating_sub(1));
                let delay = backoffs.get(index).copied().unwrap_or(60);
                let next_run = now + Duration::seconds(i64::from(delay));
                self.reschedule_job(&job.id, attempt_number, next_run, Some(&error), now);
                self.record_call_event(
                    job,
                    Some(&cart),
                    Some(&user),
                    VoiceCallStatus::Retrying,
                    Some(&error),
                    Some(campaign),
                    None,
                    None,
                    Some(attempt_number),
                    Some(next_run),
                    now,
                );
                JobOutcome::Retried
            }
        }
    }

    /// Poll the provider for every active call and apply the latest log.
    async fn poll_provider_updates(&self, now: DateTime<Utc>) -> u32 {
        if !self.provider.enabled() {
            return 0;
        }
        let active: Vec<VoiceCall> = self
            .store
            .list_voice_calls()
            .into_iter()
            .filter(|call| call.status.is_active())
            .filter(|call| {
                call.provider_call_id
                    .as_deref()
                    .is_some_and(|id| !id.trim().is_empty())
            })
            .collect();

        let mut updates = 0;
        for call in active {
            let provider_call_id = call.provider_call_id.clone().unwrap_or_default();
            let rows = match self.provider.fetch_call_logs(&provider_call_id, 1).await {
                Ok(rows) => rows,
                Err(err) => {
                    self.append_alert(
                        "VOICE_POLL_FAILED",
                        &format!("Failed to poll SuperU call logs: {err}"),
                        AlertSeverity::Warning,
                        json!({"callId": call.id, "providerCallId": provider_call_id}),
                    );
                    continue;
                }
            };
            let Some(latest) = rows.last() else {
                continue;
            };
            let status = normalize_provider_status(latest);
            let outcome = extract_outcome(latest);
            match status {
                VoiceCallStatus::Completed | VoiceCallStatus::Failed => {
                    self.update_call_terminal(&call.id, status, &outcome, latest.clone(), now);
                    updates += 1;
                }
                VoiceCallStatus::Ringing | VoiceCallStatus::InProgress => {
                    self.update_call_progress(&call.id, status, latest.clone(), now);
                    updates += 1;
                }
                _ => {}
            }
        }
        updates
    }

    /// Backlog and failure-ratio alerts.
    fn evaluate_alerts(&self, now: DateTime<Utc>) -> u32 {
        let settings = self.get_settings();
        let mut generated = 0;

        let pending = self
            .store
            .list_voice_jobs()
            .into_iter()
            .filter(|job| {
                matches!(job.status, VoiceJobStatus::Queued | VoiceJobStatus::Retrying)
            })
            .count();
        if pending > settings.alert_backlog_threshold as usize {
            self.append_alert(
                "VOICE_BACKLOG_HIGH",
                &format!("Voice job backlog is high ({pending})."),
                AlertSeverity::Warning,
                json!({"pendingJobs": pending}),
            );
            generated += 1;
        }

        let today = now.date_naive();
        let calls_today: Vec<VoiceCall> = self
            .store
            .list_voice_calls()
            .into_iter()
            .filter(|call| call.created_at.date_naive() == today)
            .collect();
        let terminal: Vec<&VoiceCall> = calls_today
            .iter()
            .filter(|call| {
                matches!(
                    call.status,
                    VoiceCallStatus::Completed
                        | VoiceCallStatus::Failed
                        | VoiceCallStatus::Suppressed
                        | VoiceCallStatus::Skipped
                )
            })
            .collect();
        if !terminal.is_empty() {
            let failed = terminal
                .iter()
                .filter(|call| call.status == VoiceCallStatus::Failed)
                .count();
            let ratio = failed as f64 / terminal.len() as f64;
            if ratio > settings.alert_failure_ratio_threshold {
                self.append_alert(
                    "VOICE_FAILURE_RATIO_HIGH",
                    &format!("Voice failure ratio today is {ratio:.2}, above threshold."),
                    AlertSeverity::Critical,
                    json!({"terminalCalls": terminal.len(), "failedCalls": failed, "ratio": ratio}),
                );
                generated += 1;
            }
        }
        generated
    }

    // ── Call records ──────────────────────────────────────────────

    /// Append one attempt to the (single) call for this job's recovery
    /// key, creating the call record on first touch.
    #[allow(clippy::too_many_arguments)]
    fn record_call_event(
        &self,
        job: &VoiceJob,
        cart: Option<&Cart>,
        user: Option<&User>,
        status: VoiceCallStatus,
        error: Option<&str>,
        request: Option<Value>,
        response: Option<Value>,
        provider_call_id: Option<&str>,
        attempt_number: Option<u32>,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let mut call = self.get_or_create_call(job, cart, user, now);
        let attempt = attempt_number.unwrap_or(job.attempt).max(1);
        call.attempts.push(CallAttempt {
            attempt,
            timestamp: now,
            status,
            error: error.map(str::to_owned),
            request: request.unwrap_or(json!({})),
            response: response.unwrap_or(json!({})),
        });
        call.attempt_count = call.attempts.len() as u32;
        call.status = status;
        call.updated_at = now;
        call.last_error = error.map(str::to_owned);
        call.next_retry_at = next_retry_at;
        if let Some(id) = provider_call_id {
            call.provider_call_id = Some(id.to_owned());
        }
        self.store.update_voice_call(call);
    }

    fn get_or_create_call(
        &self,
        job: &VoiceJob,
        cart: Option<&Cart>,
        user: Option<&User>,
        now: DateTime<Utc>,
    ) -> VoiceCall {
        if let Some(existing) = self.store.find_voice_call_by_recovery_key(&job.recovery_key) {
            return existing;
        }
        let settings = self.get_settings();
        let call = VoiceCall {
            id: self.store.ids.next("vcall"),
            recovery_key: job.recovery_key.clone(),
            user_id: user.map(|u| u.id.clone()).unwrap_or_default(),
            session_id: job.session_id.clone(),
            cart_id: job.cart_id.clone(),
            status: VoiceCallStatus::Queued,
            attempt_count: 0,
            attempts: Vec::new(),
            provider: "superu".into(),
            provider_call_id: None,
            provider_event_keys: Vec::new(),
            provider_events: Vec::new(),
            provider_payload: None,
            script_version: settings.script_version.clone(),
            campaign: json!({
                "itemCount": cart.map(|c| c.item_count).unwrap_or(0),
                "cartTotal": cart.map(|c| c.total).unwrap_or(0.0),
                "template": settings.script_template,
            }),
            outcome: String::new(),
            followup_applied: false,
            estimated_cost_usd: settings.estimated_cost_per_call_usd,
            next_retry_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_voice_call(call.clone());
        call
    }

    pub(crate) fn update_call_progress(
        &self,
        call_id: &str,
        status: VoiceCallStatus,
        payload: Value,
        now: DateTime<Utc>,
    ) {
        let Some(mut call) = self.store.get_voice_call(call_id) else {
            return;
        };
        call.status = status;
        call.provider_payload = Some(payload);
        call.updated_at = now;
        self.store.update_voice_call(call);
    }

    /// Terminal transition with the at-most-once follow-up.
    pub(crate) fn update_call_terminal(
        &self,
        call_id: &str,
        status: VoiceCallStatus,
        outcome: &str,
        payload: Value,
        now: DateTime<Utc>,
    ) {
        let Some(mut call) = self.store.get_voice_call(call_id) else {
            return;
        };
        call.status = status;
        call.outcome = outcome.to_owned();
        call.provider_payload = Some(payload);
        call.updated_at = now;
        self.store.update_voice_call(call.clone());
        tracing::info!(
            call_id = %call.id,
            status = status.as_str(),
            outcome = %outcome,
            "voice call reached terminal state"
        );

        if !call.followup_applied {
            self.apply_outcome_actions(&call);
            if let Some(mut latest) = self.store.get_voice_call(call_id) {
                latest.followup_applied = true;
                latest.updated_at = now;
                self.store.update_voice_call(latest);
            }
        }
    }

    // ── Guardrail helpers ─────────────────────────────────────────

    fn budget_and_cap_guardrails(
        &self,
        user_id: &str,
        settings: &VoiceSettings,
        now: DateTime<Utc>,
    ) -> Option<&'static str> {
        let today = now.date_naive();
        let calls_today: Vec<VoiceCall> = self
            .store
            .list_voice_calls()
            .into_iter()
            .filter(|call| call.created_at.date_naive() == today)
            .collect();

        if calls_today.len() >= settings.max_calls_per_day as usize {
            return Some("max_calls_per_day_reached");
        }
        let user_calls_today = calls_today
            .iter()
            .filter(|call| call.user_id == user_id)
            .count();
        if user_calls_today >= settings.max_calls_per_user_per_day as usize {
            return Some("max_calls_per_user_per_day_reached");
        }
        let spend_today = calls_today.len() as f64 * settings.estimated_cost_per_call_usd;
        if spend_today + settings.estimated_cost_per_call_usd > settings.daily_budget_usd {
            return Some("daily_budget_exceeded");
        }
        None
    }

    fn campaign_payload(&self, user: &User, cart: &Cart, settings: &VoiceSettings) -> Value {
        let name = if user.name.trim().is_empty() {
            "there"
        } else {
            user.name.trim()
        };
        let template = if settings.script_template.trim().is_empty() {
            &self.default_script_template
        } else {
            &settings.script_template
        };
        let script = template
            .replace("{name}", name)
            .replace("{item_count}", &cart.item_count.to_string())
            .replace("{cart_total}", &format!("{:.2}", cart.total));

        let items: Vec<Value> = cart
            .items
            .iter()
            .map(|item| {
                json!({
                    "itemId": item.item_id,
                    "productId": item.product_id,
                    "variantId": item.variant_id,
                    "name": item.name,
                    "quantity": item.quantity,
                })
            })
            .collect();

        json!({
            "scriptVersion": settings.script_version,
            "scriptText": script,
            "cart": {
                "id": cart.id,
                "itemCount": cart.item_count,
                "total": (cart.total * 100.0).round() / 100.0,
                "currency": cart.currency,
                "items": items,
            },
            "customer": {
                "id": user.id,
                "name": name,
                "email": user.email,
                "timezone": if user.timezone.trim().is_empty() {
                    settings.default_timezone.clone()
                } else {
                    user.timezone.clone()
                },
            },
        })
    }

    fn has_newer_order(&self, user_id: &str, since: DateTime<Utc>) -> bool {
        self.store
            .list_orders()
            .iter()
            .any(|order| order.user_id == user_id && order.created_at > since)
    }

    // ── Job bookkeeping ───────────────────────────────────────────

    fn reschedule_job(
        &self,
        job_id: &str,
        attempt: u32,
        next_run: DateTime<Utc>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let Some(mut job) = self.store.get_voice_job(job_id) else {
            return;
        };
        job.status = VoiceJobStatus::Retrying;
        job.attempt = attempt;
        job.next_run_at = Some(next_run);
        job.last_error = error.map(str::to_owned);
        job.updated_at = now;
        self.store.update_voice_job(job);
    }

    fn complete_job(
        &self,
        job_id: &str,
        status: VoiceJobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let Some(mut job) = self.store.get_voice_job(job_id) else {
            return;
        };
        job.status = status;
        job.last_error = error.map(str::to_owned);
        job.updated_at = now;
        if matches!(
            status,
            VoiceJobStatus::Completed | VoiceJobStatus::Cancelled | VoiceJobStatus::DeadLetter
        ) {
            job.next_run_at = None;
        }
        self.store.update_voice_job(job);
    }

    pub(crate) fn append_alert(
        &self,
        code: &str,
        message: &str,
        severity: AlertSeverity,
        details: Value,
    ) {
        self.store.append_voice_alert(VoiceAlert {
            id: self.store.ids.next("valert"),
            code: code.to_owned(),
            message: message.to_owned(),
            severity,
            details,
            created_at: self.store.now(),
        });
    }
}

// ── Free helpers ────────────────────────────────────────────────────

/// Per-(cart, snapshot) idempotency key.
pub(crate) fn recovery_key(cart: &Cart) -> String {
    format!(
        "{}::{}",
        cart.id,
        cart.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

pub(crate) fn extract_provider_call_id(payload: &Value) -> Option<String> {
    const DIRECT_KEYS: [&str; 4] = ["call_id", "callId", "id", "uuid"];
    for key in DIRECT_KEYS {
        if let Some(value) = payload.get(key).and_then(Value::as_str) {
            if !value.trim().is_empty() {
                return Some(value.trim().to_owned());
            }
        }
    }
    if let Some(data) = payload.get("data") {
        for key in DIRECT_KEYS {
            if let Some(value) = data.get(key).and_then(Value::as_str) {
                if !value.trim().is_empty() {
                    return Some(value.trim().to_owned());
                }
            }
        }
    }
    None
}

/// Collapse the provider's many status spellings onto the four states
/// the call machine tracks. Unknown statuses count as in-progress.
pub(crate) fn normalize_provider_status(payload: &Value) -> VoiceCallStatus {
    let raw = ["status", "call_status", "state", "event"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .unwrap_or("");
    let value = raw.trim().to_lowercase().replace(['-', ' '], "_");
    match value.as_str() {
        "queued" | "dialing" | "ringing" => VoiceCallStatus::Ringing,
        "connected" | "answered" | "in_progress" | "active" => VoiceCallStatus::InProgress,
        "completed" | "success" | "ended" | "done" => VoiceCallStatus::Completed,
        "failed" | "error" | "busy" | "cancelled" | "canceled" | "no_answer" | "voicemail"
        | "dropped" | "timeout" => VoiceCallStatus::Failed,
        _ => VoiceCallStatus::InProgress,
    }
}

pub(crate) fn extract_outcome(payload: &Value) -> String {
    for key in ["outcome", "disposition", "result", "intent"] {
        if let Some(value) = payload.get(key).and_then(Value::as_str) {
            if !value.trim().is_empty() {
                return value.trim().to_lowercase().replace(['-', ' '], "_");
            }
        }
    }
    normalize_provider_status(payload).as_str().to_owned()
}

fn normalize_backoff_list(raw: &Value) -> Vec<u32> {
    let source: Vec<Value> = match raw {
        Value::Array(items) => items.clone(),
        Value::String(csv) => csv.split(',').map(|part| json!(part.trim())).collect(),
        Value::Null => vec![],
        other => vec![other.clone()],
    };
    let values: Vec<u32> = source
        .iter()
        .filter_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|v| *v > 0.0)
        .map(|v| v as u32)
        .collect();
    if values.is_empty() {
        vec![60, 300, 900]
    } else {
        values
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use oc_domain::error::Error;
    use parking_lot::Mutex;

    /// Provider stub: scripted responses, call log capture.
    pub struct StubProvider {
        pub enabled: bool,
        pub fail_calls: bool,
        pub logs: Mutex<Vec<Value>>,
        pub dispatched: Mutex<Vec<Value>>,
    }

    impl StubProvider {
        fn working() -> Self {
            Self {
                enabled: true,
                fail_calls: false,
                logs: Mutex::new(vec![]),
                dispatched: Mutex::new(vec![]),
            }
        }

        fn failing() -> Self {
            Self {
                fail_calls: true,
                ..Self::working()
            }
        }
    }

    #[async_trait]
    impl VoiceProvider for StubProvider {
        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn start_outbound_call(
            &self,
            _to: &str,
            _assistant_id: &str,
            _from: &str,
            metadata: Value,
        ) -> oc_domain::error::Result<Value> {
            if self.fail_calls {
                return Err(Error::Provider {
                    provider: "superu".into(),
                    message: "dial failed".into(),
                });
            }
            self.dispatched.lock().push(metadata);
            Ok(json!({"call_id": "superu_call_001", "status": "queued"}))
        }

        async fn fetch_call_logs(
            &self,
            _call_id: &str,
            _limit: usize,
        ) -> oc_domain::error::Result<Vec<Value>> {
            Ok(self.logs.lock().clone())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.superu_enabled = true;
        config.superu_api_key = "sk-superu".into();
        config.superu_assistant_id = "asst_1".into();
        config.superu_from_phone_number = "+15550000000".into();
        config.voice_quiet_hours_start = 0;
        config.voice_quiet_hours_end = 0;
        config.voice_max_calls_per_day = 20;
        config.voice_daily_budget_usd = 50.0;
        config
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn seed_user(store: &Store, id: &str, phone: &str) {
        store.upsert_user(User {
            id: id.into(),
            email: format!("{id}@example.com"),
            name: "Jamie".into(),
            phone: phone.into(),
            timezone: String::new(),
            created_at: now() - Duration::days(30),
        });
    }

    fn seed_abandoned_cart(store: &Store, id: &str, user_id: &str, minutes_ago: i64) {
        let updated = now() - Duration::minutes(minutes_ago);
        store.insert_cart(Cart {
            id: id.into(),
            user_id: Some(user_id.into()),
            session_id: format!("sess-{user_id}"),
            items: vec![oc_domain::commerce::CartItem {
                item_id: "item_1".into(),
                product_id: "prod_1".into(),
                variant_id: "var_1".into(),
                name: "Trail Runner X".into(),
                price: 129.0,
                quantity: 1,
                image: String::new(),
            }],
            subtotal: 129.0,
            tax: 10.32,
            shipping: 5.99,
            discount: 0.0,
            total: 145.31,
            item_count: 1,
            currency: "USD".into(),
            applied_discount: None,
            created_at: updated - Duration::hours(1),
            updated_at: updated,
        });
    }

    fn service(store: Arc<Store>, config: Config, provider: Arc<StubProvider>) -> VoiceRecoveryService {
        let support = Arc::new(SupportService::new(store.clone()));
        let notifications = Arc::new(NotificationService::new(store.clone()));
        VoiceRecoveryService::new(store, &config, provider, support, notifications)
    }

    // ── Happy path (literal scenario) ───────────────────────────────

    #[tokio::test]
    async fn abandoned_cart_dispatches_one_call() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let provider = Arc::new(StubProvider::working());
        let service = service(store.clone(), test_config(), provider.clone());

        let report = service.process_due_work(now()).await;
        assert!(report.enqueued >= 1, "{report:?}");
        assert!(report.processed.completed >= 1, "{report:?}");

        let calls = service.list_calls(100, None);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].provider_call_id.as_deref(), Some("superu_call_001"));
        assert_eq!(calls[0].status, VoiceCallStatus::Initiated);
        assert_eq!(provider.dispatched.lock().len(), 1);
    }

    #[tokio::test]
    async fn second_tick_does_not_redial_the_same_snapshot() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let provider = Arc::new(StubProvider::working());
        let service = service(store.clone(), test_config(), provider.clone());

        service.process_due_work(now()).await;
        let report = service.process_due_work(now() + Duration::minutes(1)).await;
        assert_eq!(report.enqueued, 0);
        assert_eq!(provider.dispatched.lock().len(), 1);
        assert_eq!(service.list_calls(100, None).len(), 1);
    }

    #[tokio::test]
    async fn fresh_cart_is_not_abandoned_yet() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 5);
        let service = service(store, test_config(), Arc::new(StubProvider::working()));
        let report = service.process_due_work(now()).await;
        assert_eq!(report.enqueued, 0);
    }

    #[tokio::test]
    async fn newer_order_suppresses_recovery() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        store.insert_order(oc_domain::commerce::Order {
            id: "order_1".into(),
            user_id: "user_1".into(),
            session_id: "sess-user_1".into(),
            items: vec![],
            subtotal: 0.0,
            tax: 0.0,
            shipping: 0.0,
            discount: 0.0,
            total: 50.0,
            status: oc_domain::commerce::OrderStatus::Confirmed,
            shipping_address: None,
            created_at: now() - Duration::minutes(10),
            updated_at: now() - Duration::minutes(10),
        });
        let service = service(store, test_config(), Arc::new(StubProvider::working()));
        let report = service.process_due_work(now()).await;
        assert_eq!(report.enqueued, 0);
    }

    // ── Dead letter (literal scenario) ──────────────────────────────

    #[tokio::test]
    async fn provider_failure_with_single_attempt_dead_letters() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let mut config = test_config();
        config.voice_max_attempts_per_cart = 1;
        let service = service(store.clone(), config, Arc::new(StubProvider::failing()));

        let report = service.process_due_work(now()).await;
        assert!(report.processed.dead_letter >= 1, "{report:?}");
        let alerts = service.list_alerts(50, None);
        assert!(alerts.iter().any(|a| a.code == "VOICE_DEAD_LETTER"));
        let jobs = service.list_jobs(100, Some("dead_letter"));
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_retries_with_bounded_backoff() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let service = service(store.clone(), test_config(), Arc::new(StubProvider::failing()));

        let report = service.process_due_work(now()).await;
        assert!(report.processed.retried >= 1);
        let jobs = service.list_jobs(100, Some("retrying"));
        assert_eq!(jobs.len(), 1);
        // First retry uses the first backoff entry (60s).
        assert_eq!(jobs[0].next_run_at, Some(now() + Duration::seconds(60)));
        assert_eq!(jobs[0].attempt, 1);
    }

    #[tokio::test]
    async fn backoff_list_reuses_last_entry_when_exhausted() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let mut config = test_config();
        config.voice_retry_backoff_seconds_csv = "60,300".into();
        config.voice_max_attempts_per_cart = 5;
        let service = service(store.clone(), config, Arc::new(StubProvider::failing()));

        let mut tick = now();
        service.process_due_work(tick).await; // attempt 1 -> 60s
        tick += Duration::seconds(61);
        service.process_due_work(tick).await; // attempt 2 -> 300s
        tick += Duration::seconds(301);
        service.process_due_work(tick).await; // attempt 3 -> 300s again
        let jobs = service.list_jobs(100, Some("retrying"));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].attempt, 3);
        assert_eq!(jobs[0].next_run_at, Some(tick + Duration::seconds(300)));
    }

    // ── Guardrails ──────────────────────────────────────────────────

    #[tokio::test]
    async fn kill_switch_cancels_and_alerts() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let mut config = test_config();
        config.voice_global_kill_switch = true;
        let service = service(store, config, Arc::new(StubProvider::working()));

        let report = service.process_due_work(now()).await;
        assert!(report.processed.cancelled >= 1);
        assert!(service
            .list_alerts(50, None)
            .iter()
            .any(|a| a.code == "VOICE_KILL_SWITCH_ACTIVE"));
    }

    #[tokio::test]
    async fn suppressed_user_is_never_called() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let provider = Arc::new(StubProvider::working());
        let service = service(store, test_config(), provider.clone());
        service.suppress_user("user_1", "voice_opt_out");

        let report = service.process_due_work(now()).await;
        assert!(report.processed.cancelled >= 1);
        assert!(provider.dispatched.lock().is_empty());
        let calls = service.list_calls(100, Some("suppressed"));
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn missing_phone_skips() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let service = service(store, test_config(), Arc::new(StubProvider::working()));
        let report = service.process_due_work(now()).await;
        assert!(report.processed.cancelled >= 1);
        let calls = service.list_calls(100, Some("skipped"));
        assert_eq!(calls[0].last_error.as_deref(), Some("missing_phone"));
    }

    #[tokio::test]
    async fn quiet_hours_reschedule_instead_of_calling() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let mut config = test_config();
        config.voice_quiet_hours_start = 0;
        config.voice_quiet_hours_end = 23;
        let provider = Arc::new(StubProvider::working());
        let service = service(store, config, provider.clone());

        let report = service.process_due_work(now()).await;
        assert!(report.processed.retried >= 1);
        assert!(provider.dispatched.lock().is_empty());
        let jobs = service.list_jobs(100, Some("retrying"));
        // Rescheduled to 23:00 UTC, the end of the quiet window.
        assert_eq!(
            jobs[0].next_run_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 15, 23, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn per_user_daily_cap_blocks_second_call() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        seed_abandoned_cart(&store, "cart_2", "user_1", 50);
        let mut config = test_config();
        config.voice_max_calls_per_user_per_day = 1;
        let provider = Arc::new(StubProvider::working());
        let service = service(store, config, provider.clone());

        let report = service.process_due_work(now()).await;
        assert_eq!(report.processed.completed, 1);
        assert_eq!(report.processed.cancelled, 1);
        assert_eq!(provider.dispatched.lock().len(), 1);
        assert!(service
            .list_alerts(50, None)
            .iter()
            .any(|a| a.code == "VOICE_GUARDRAIL_TRIGGERED"));
    }

    #[tokio::test]
    async fn budget_ceiling_blocks_dispatch() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let mut config = test_config();
        config.voice_daily_budget_usd = 0.5;
        config.voice_estimated_cost_per_call_usd = 0.7;
        let provider = Arc::new(StubProvider::working());
        let service = service(store, config, provider.clone());

        let report = service.process_due_work(now()).await;
        assert_eq!(report.processed.cancelled, 1);
        assert!(provider.dispatched.lock().is_empty());
        let calls = service.list_calls(100, Some("skipped"));
        assert_eq!(calls[0].last_error.as_deref(), Some("daily_budget_exceeded"));
    }

    #[tokio::test]
    async fn unconfigured_provider_cancels_with_critical_alert() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let provider = Arc::new(StubProvider {
            enabled: false,
            ..StubProvider::working()
        });
        let service = service(store, test_config(), provider);

        let report = service.process_due_work(now()).await;
        assert_eq!(report.processed.cancelled, 1);
        let alerts = service.list_alerts(50, Some("critical"));
        assert!(alerts
            .iter()
            .any(|a| a.code == "VOICE_PROVIDER_NOT_CONFIGURED"));
    }

    // ── Polling & alerts ────────────────────────────────────────────

    #[tokio::test]
    async fn poll_applies_terminal_status_and_followup_once() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let provider = Arc::new(StubProvider::working());
        let service = service(store.clone(), test_config(), provider.clone());
        service.process_due_work(now()).await;

        *provider.logs.lock() = vec![json!({
            "call_id": "superu_call_001",
            "status": "completed",
            "outcome": "converted",
        })];
        let report = service.process_due_work(now() + Duration::minutes(2)).await;
        assert_eq!(report.polled, 1);
        let calls = service.list_calls(100, None);
        assert_eq!(calls[0].status, VoiceCallStatus::Completed);
        assert_eq!(calls[0].outcome, "converted");
        assert!(calls[0].followup_applied);
        // Conversion intent sends exactly one notification.
        assert_eq!(store.list_notifications_for_user("user_1").len(), 1);
    }

    #[tokio::test]
    async fn backlog_alert_fires_above_threshold() {
        let store = Arc::new(Store::new());
        let mut config = test_config();
        config.voice_alert_backlog_threshold = 1;
        // Two abandoned carts, provider disabled so jobs stay queued is
        // not possible (they cancel); instead seed jobs directly.
        for i in 0..3 {
            store.insert_voice_job(VoiceJob {
                id: format!("vjob_seed_{i}"),
                status: VoiceJobStatus::Queued,
                user_id: "user_1".into(),
                session_id: "sess-1".into(),
                cart_id: format!("cart_{i}"),
                recovery_key: format!("cart_{i}::snap"),
                attempt: 0,
                next_run_at: Some(now() + Duration::hours(1)),
                last_error: None,
                created_at: now(),
                updated_at: now(),
            });
        }
        let service = service(store, config, Arc::new(StubProvider::working()));
        let report = service.process_due_work(now()).await;
        assert!(report.alerts_generated >= 1);
        assert!(service
            .list_alerts(50, None)
            .iter()
            .any(|a| a.code == "VOICE_BACKLOG_HIGH"));
    }

    #[tokio::test]
    async fn failure_ratio_alert_is_critical() {
        let store = Arc::new(Store::new());
        seed_user(&store, "user_1", "+15551234567");
        seed_abandoned_cart(&store, "cart_1", "user_1", 45);
        let mut config = test_config();
        config.voice_max_attempts_per_cart = 1;
        let service = service(store, config, Arc::new(StubProvider::failing()));
        service.process_due_work(now()).await;
        let alerts = service.list_alerts(50, Some("critical"));
        assert!(alerts.iter().any(|a| a.code == "VOICE_FAILURE_RATIO_HIGH"));
    }

    // ── Settings ────────────────────────────────────────────────────

    #[test]
    fn update_settings_clamps_fields() {
        let store = Arc::new(Store::new());
        let service = service(store, test_config(), Arc::new(StubProvider::working()));
        let mut updates = JsonMap::new();
        updates.insert("abandonmentMinutes".into(), json!(0));
        updates.insert("quietHoursStart".into(), json!(99));
        updates.insert("alertFailureRatioThreshold".into(), json!(7.5));
        updates.insert("retryBackoffSeconds".into(), json!("10, 20, nope, -3"));
        let settings = service.update_settings(&updates);
        assert_eq!(settings.abandonment_minutes, 1);
        assert_eq!(settings.quiet_hours_start, 23);
        assert_eq!(settings.alert_failure_ratio_threshold, 1.0);
        assert_eq!(settings.retry_backoff_seconds, vec![10, 20]);
    }

    #[test]
    fn stats_reflect_settings_and_counts() {
        let store = Arc::new(Store::new());
        let service = service(store, test_config(), Arc::new(StubProvider::working()));
        let stats = service.stats(now());
        assert_eq!(stats["enabled"], true);
        assert_eq!(stats["totalCalls"], 0);
        assert_eq!(stats["maxCallsPerDay"], 20);
    }

    // ── Normalization helpers ───────────────────────────────────────

    #[test]
    fn provider_status_normalization() {
        for (raw, expected) in [
            ("queued", VoiceCallStatus::Ringing),
            ("dialing", VoiceCallStatus::Ringing),
            ("Connected", VoiceCallStatus::InProgress),
            ("in-progress", VoiceCallStatus::InProgress),
            ("ended", VoiceCallStatus::Completed),
            ("no answer", VoiceCallStatus::Failed),
            ("voicemail", VoiceCallStatus::Failed),
            ("mystery", VoiceCallStatus::InProgress),
        ] {
            assert_eq!(
                normalize_provider_status(&json!({"status": raw})),
                expected,
                "status {raw}"
            );
        }
    }

    #[test]
    fn outcome_normalizes_separators() {
        assert_eq!(
            extract_outcome(&json!({"disposition": "Do-Not Call"})),
            "do_not_call"
        );
        // Falls back to status when no outcome key is present.
        assert_eq!(extract_outcome(&json!({"status": "ended"})), "completed");
    }

    #[test]
    fn provider_call_id_extraction_checks_nested_data() {
        assert_eq!(
            extract_provider_call_id(&json!({"call_id": "abc"})).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_provider_call_id(&json!({"data": {"uuid": "xyz"}})).as_deref(),
            Some("xyz")
        );
        assert_eq!(extract_provider_call_id(&json!({"other": 1})), None);
    }
}
