use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ActionBackendKind, Config, StoreBackend};
use crate::repository::{InMemoryRunStore, PgRunStore, RunStore};
use crate::service::action::{ActionBackend, HttpBackend, SimulatedBackend};
use crate::service::{
    Orchestrator, OrchestratorSettings, RetryPolicy, RunDispatcher, StageRegistry,
    TriggerService, Watchdog,
};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conveyor Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;

    let store = create_store(&config).await?;
    let actions = create_action_backend(&config)?;

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        actions,
        OrchestratorSettings::from(&config),
    ));

    // Run queue worker
    let (dispatcher, queue) = RunDispatcher::channel(config.run_queue_capacity);
    tokio::spawn(queue.run(
        orchestrator.clone(),
        config.max_concurrent_runs,
        RetryPolicy::default(),
    ));

    // Stalled run watchdog
    let watchdog = Watchdog::new(
        store.clone(),
        config.stale_run_timeout,
        config.watchdog_interval,
    );
    tokio::spawn(watchdog.run());

    let state = api::AppState {
        store: store.clone(),
        registry: StageRegistry::new(store.clone()),
        orchestrator,
        trigger: TriggerService::new(store, dispatcher, config.default_template_id),
        actions: Arc::new(SimulatedBackend::new(
            config.aws.clone(),
            config.jenkins.clone(),
        )),
        webhook_secret: config.webhook_secret.clone(),
    };

    if state.webhook_secret.is_none() {
        tracing::warn!("GITHUB_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
    }

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}

async fn create_store(config: &Config) -> anyhow::Result<Arc<dyn RunStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok(Arc::new(PgRunStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory run store, state is lost on restart");
            Ok(Arc::new(InMemoryRunStore::with_default_template()))
        }
    }
}

fn create_action_backend(config: &Config) -> anyhow::Result<Arc<dyn ActionBackend>> {
    match config.action_backend {
        ActionBackendKind::Simulated => {
            tracing::info!("Using simulated stage actions");
            Ok(Arc::new(SimulatedBackend::new(
                config.aws.clone(),
                config.jenkins.clone(),
            )))
        }
        ActionBackendKind::Http => {
            let base_url = config
                .actions_base_url
                .clone()
                .context("ACTIONS_BASE_URL is required for the http action backend")?;
            tracing::info!("Invoking stage actions at {}", base_url);
            Ok(Arc::new(HttpBackend::new(
                base_url,
                config.actions_token.clone(),
            )))
        }
    }
}
