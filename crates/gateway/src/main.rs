//! Binary entry point: configuration, tracing, the composition root,
//! the HTTP server, and graceful shutdown.

mod api;
mod scheduler;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use oc_agents::{Agent, AgentRegistry, CartAgent, MemoryAgent, OrderAgent, ProductAgent, SupportAgent};
use oc_commerce::{
    AdminActivityService, CartService, InteractionService, MemoryService, NotificationService,
    OrderService, ProductService, SessionService, SupportService,
};
use oc_domain::config::{Config, ConfigSeverity};
use oc_domain::rate_limit::SlidingWindowRateLimiter;
use oc_llm::{LanguagePlanner, LlmClient};
use oc_orchestrator::{ContextBuilder, IntentClassifier, Orchestrator, OrchestratorDeps};
use oc_store::Store;
use oc_voice::{HttpSuperUClient, VoiceRecoveryService};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .init();

    let config = Config::from_env();
    let issues = config.validate();
    let mut fatal = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => {
                tracing::error!("{issue}");
                fatal = true;
            }
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if fatal {
        anyhow::bail!("configuration has errors; refusing to start");
    }

    let state = build_state(config.clone());

    // Voice scheduler runs on its own task; the watch channel stops it
    // between ticks at shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = if config.voice_recovery_scheduler_enabled {
        Some(scheduler::spawn(&config, state.voice.clone(), shutdown_rx))
    } else {
        tracing::info!("voice scheduler disabled by configuration");
        None
    };

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "commerce gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    Ok(())
}

/// Composition root. Constructor injection keeps the service graph
/// acyclic: carts read products, orders read carts, voice reads carts,
/// support, and notifications.
fn build_state(config: Config) -> AppState {
    let store = Arc::new(Store::new());

    let products = Arc::new(ProductService::new(store.clone()));
    let carts = Arc::new(CartService::new(store.clone(), &config));
    let sessions = Arc::new(SessionService::new(store.clone()));
    let interactions = Arc::new(InteractionService::new(store.clone()));
    let memory = Arc::new(MemoryService::new(store.clone()));
    let support = Arc::new(SupportService::new(store.clone()));
    let notifications = Arc::new(NotificationService::new(store.clone()));
    let orders = Arc::new(OrderService::new(
        store.clone(),
        carts.clone(),
        notifications.clone(),
    ));
    let admin_activity = Arc::new(AdminActivityService::new(
        store.clone(),
        &config.token_secret,
    ));

    let llm_client = LlmClient::new(config.clone());
    let planner: Option<Arc<dyn LanguagePlanner>> = if llm_client.enabled() {
        Some(Arc::new(llm_client))
    } else {
        None
    };

    let agents = AgentRegistry::new(vec![
        Arc::new(ProductAgent::new(products.clone())) as Arc<dyn Agent>,
        Arc::new(CartAgent::new(carts.clone(), products)),
        Arc::new(OrderAgent::new(orders, carts.clone())),
        Arc::new(SupportAgent::new(support.clone())),
        Arc::new(MemoryAgent::new(memory.clone())),
    ]);

    let orchestrator = Arc::new(Orchestrator::new(OrchestratorDeps {
        config: config.clone(),
        classifier: IntentClassifier::new(planner.clone()),
        context_builder: ContextBuilder::new(sessions.clone(), carts, memory.clone()),
        interactions,
        sessions,
        memory,
        agents,
        planner,
    }));

    let provider = Arc::new(HttpSuperUClient::new(&config));
    let voice = Arc::new(VoiceRecoveryService::new(
        store.clone(),
        &config,
        provider,
        support,
        notifications,
    ));

    AppState {
        config: Arc::new(config),
        store,
        orchestrator,
        voice,
        admin_activity,
        rate_limiter: Arc::new(SlidingWindowRateLimiter::new()),
    }
}
