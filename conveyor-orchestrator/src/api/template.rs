//! Template API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use conveyor_core::domain::template::StageDescriptor;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /template/{id}/stages
/// Resolved stage list of a template, in execution order
pub async fn get_template_stages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<StageDescriptor>>> {
    tracing::debug!("Resolving stages for template: {}", id);

    let stages = state.registry.resolve_stages(id).await?;
    Ok(Json(stages))
}
