//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod action;
pub mod deployment;
pub mod error;
pub mod health;
pub mod run;
pub mod template;
pub mod webhook;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::repository::RunStore;
use crate::service::action::ActionBackend;
use crate::service::{Orchestrator, StageRegistry, TriggerService};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStore>,
    pub registry: StageRegistry,
    pub orchestrator: Arc<Orchestrator>,
    pub trigger: TriggerService,
    /// Backend serving the standalone `/actions/{function}` endpoints
    pub actions: Arc<dyn ActionBackend>,
    pub webhook_secret: Option<String>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Triggers
        .route("/webhook/github", post(webhook::github_webhook))
        .route("/pipeline/launch", post(run::launch_run))
        .route("/pipeline/run", post(run::execute_run))
        // Run endpoints
        .route("/run/list", get(run::list_runs))
        .route("/run/{id}", get(run::get_run))
        .route("/run/{id}/stages", get(run::get_run_stages))
        // Deployments and templates
        .route("/deployment/list", get(deployment::list_deployments))
        .route("/template/{id}/stages", get(template::get_template_stages))
        // Stage actions
        .route("/actions/{function}", post(action::invoke_action))
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::AwsSettings;
    use crate::repository::InMemoryRunStore;
    use crate::service::action::SimulatedBackend;
    use crate::service::testing::{ScriptedBackend, test_settings};
    use crate::service::{RunDispatcher, RunQueue};
    use conveyor_core::domain::template::DEFAULT_TEMPLATE_ID;

    pub const SECRET: &str = "s3cret";

    /// State over an in-memory store; the queue is returned undriven
    pub fn test_state(queue_capacity: usize) -> (AppState, RunQueue, Arc<InMemoryRunStore>) {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let (dispatcher, queue) = RunDispatcher::channel(queue_capacity);
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            Arc::new(ScriptedBackend::succeeding("registry/app:v42")),
            test_settings(),
        ));

        let aws = AwsSettings {
            region: Some("us-east-1".to_string()),
            ecr_repository_uri: Some("registry/app".to_string()),
            ecs_cluster: Some("prod".to_string()),
            ecs_service: Some("app".to_string()),
            log_group: None,
        };

        let state = AppState {
            store: store.clone(),
            registry: StageRegistry::new(store.clone()),
            orchestrator,
            trigger: TriggerService::new(store.clone(), dispatcher, DEFAULT_TEMPLATE_ID),
            actions: Arc::new(SimulatedBackend::new(aws, None)),
            webhook_secret: Some(SECRET.to_string()),
        };

        (state, queue, store)
    }
}
