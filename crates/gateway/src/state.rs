//! Shared application state passed to all API handlers.

use std::sync::Arc;

use oc_commerce::AdminActivityService;
use oc_domain::config::Config;
use oc_domain::rate_limit::SlidingWindowRateLimiter;
use oc_orchestrator::Orchestrator;
use oc_store::Store;
use oc_voice::VoiceRecoveryService;

/// Fields are grouped by concern:
/// - **Core** — config and the shared store
/// - **Conversation** — the orchestrator entry point
/// - **Voice** — the recovery service (admin routes + webhook + scheduler)
/// - **Audit & ingress** — hash-chained activity log, rate limiter
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub orchestrator: Arc<Orchestrator>,
    pub voice: Arc<VoiceRecoveryService>,
    pub admin_activity: Arc<AdminActivityService>,
    pub rate_limiter: Arc<SlidingWindowRateLimiter>,
}
