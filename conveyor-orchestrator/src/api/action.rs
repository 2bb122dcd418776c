//! Stage Action Handlers
//!
//! Each stage action can be invoked on its own, outside of a run.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use conveyor_core::domain::action::ActionKind;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::action::decode_action;

/// POST /actions/{function}
/// Run one action; a failed action answers 500 with its outcome
pub async fn invoke_action(
    State(state): State<AppState>,
    Path(function): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let kind = ActionKind::from_function_name(&function)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown action '{}'", function)))?;

    let input = if body.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };
    let action = decode_action(kind, input)
        .map_err(|e| ApiError::BadRequest(format!("Invalid input for {}: {}", kind, e)))?;

    tracing::info!("Invoking action {}", kind);

    let outcome = state
        .actions
        .execute(&action)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;

    async fn invoke(function: &str, body: &'static [u8]) -> StatusCode {
        let (state, _queue, _store) = test_state(4);
        match invoke_action(
            State(state),
            Path(function.to_string()),
            Bytes::from_static(body),
        )
        .await
        {
            Ok(response) => response.status(),
            Err(e) => e.into_response().status(),
        }
    }

    #[tokio::test]
    async fn test_action_status_codes() {
        assert_eq!(
            invoke("docker-ecr-push", b"{\"imageTag\":\"v42\"}").await,
            StatusCode::OK
        );
        assert_eq!(
            invoke("trigger-jenkins", b"{\"repoUrl\":\"https://github.com/acme/app.git\"}").await,
            StatusCode::OK
        );
        // No log group configured in the test state
        assert_eq!(invoke("cloudwatch-logs", b"").await, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(invoke("ecs-deploy", b"{}").await, StatusCode::BAD_REQUEST);
        assert_eq!(invoke("run-pipeline", b"{}").await, StatusCode::NOT_FOUND);
    }
}
