//! Run API Handlers
//!
//! HTTP endpoints to start, execute and inspect pipeline runs.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use conveyor_core::domain::run::PipelineRun;
use conveyor_core::domain::stage::BuildStage;
use conveyor_core::dto::run::{LaunchResponse, LaunchRun, RunDetails, RunOutcome, TriggerRun};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// `?limit=` for list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// POST /pipeline/launch
/// Create a run with pending stages and queue it
pub async fn launch_run(
    State(state): State<AppState>,
    Json(req): Json<LaunchRun>,
) -> ApiResult<Json<LaunchResponse>> {
    tracing::info!("Launching pipeline for {}", req.repository);

    let response = state.trigger.launch_run(req).await?;
    Ok(Json(response))
}

/// POST /pipeline/run
/// Execute a created run to completion and report the outcome
pub async fn execute_run(
    State(state): State<AppState>,
    Json(req): Json<TriggerRun>,
) -> ApiResult<Json<RunOutcome>> {
    tracing::info!("Executing run {} for {}", req.run_id, req.source_reference);

    let outcome = state
        .orchestrator
        .execute_run(req.run_id, &req.source_reference)
        .await?;
    Ok(Json(outcome))
}

/// GET /run/list
/// List the most recent runs
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    tracing::debug!("Listing runs");

    let runs = state.store.list_runs(query.limit()).await?;
    Ok(Json(runs))
}

/// GET /run/{id}
/// Get a run with its stages and deployment
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunDetails>> {
    tracing::debug!("Getting run: {}", id);

    let run = state
        .store
        .find_run(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))?;
    let stages = state.store.list_stages(id).await?;
    let deployment = state.store.find_deployment(id).await?;

    Ok(Json(RunDetails {
        run,
        stages,
        deployment,
    }))
}

/// GET /run/{id}/stages
/// Get the stages of a run in execution order
pub async fn get_run_stages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BuildStage>>> {
    tracing::debug!("Getting stages for run: {}", id);

    if state.store.find_run(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Run {} not found", id)));
    }

    let stages = state.store.list_stages(id).await?;
    Ok(Json(stages))
}
