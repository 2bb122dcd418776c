//! Deployment API Handlers

use axum::{
    Json,
    extract::{Query, State},
};
use conveyor_core::domain::deployment::Deployment;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::run::ListQuery;

/// GET /deployment/list
/// List the most recent deployments
pub async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Deployment>>> {
    tracing::debug!("Listing deployments");

    let deployments = state.store.list_deployments(query.limit()).await?;
    Ok(Json(deployments))
}
