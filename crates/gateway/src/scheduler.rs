//! The voice-recovery control loop: one long-running task that ticks
//! `process_due_work` at `max(5s, configured interval)` until shutdown.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use oc_domain::config::Config;
use oc_voice::VoiceRecoveryService;

/// Spawn the scheduler. Returns immediately; the sender side of the
/// shutdown channel stops the loop between iterations (never
/// mid-provider-call).
pub fn spawn(
    config: &Config,
    voice: Arc<VoiceRecoveryService>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let period = config.voice_scan_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(period_secs = period.as_secs(), "voice scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = voice.process_due_work(Utc::now()).await;
                    if report.enqueued > 0
                        || report.polled > 0
                        || report.processed.completed > 0
                        || report.processed.retried > 0
                        || report.processed.dead_letter > 0
                        || report.processed.cancelled > 0
                    {
                        tracing::info!(
                            enqueued = report.enqueued,
                            completed = report.processed.completed,
                            retried = report.processed.retried,
                            dead_letter = report.processed.dead_letter,
                            cancelled = report.processed.cancelled,
                            polled = report.polled,
                            alerts = report.alerts_generated,
                            "voice scheduler tick"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("voice scheduler stopping");
                        break;
                    }
                }
            }
        }
    })
}
