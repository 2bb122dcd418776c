//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::StoreError;
use crate::service::dispatcher::DispatchError;
use crate::service::orchestrator::OrchestratorError;
use crate::service::registry::RegistryError;
use crate::service::trigger::TriggerError;
use crate::service::webhook::WebhookError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    ServiceUnavailable(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => ApiError::DatabaseError(e),
            StoreError::RunNotFound(id) => ApiError::NotFound(format!("Run {} not found", id)),
            StoreError::StageNotFound(id) => {
                ApiError::NotFound(format!("Stage {} not found", id))
            }
            e @ (StoreError::InvalidTransition { .. }
            | StoreError::RunNotActive { .. }
            | StoreError::Conflict(_)) => ApiError::Conflict(e.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::TemplateNotFound(id) => {
                ApiError::NotFound(format!("Template {} not found", id))
            }
            e @ (RegistryError::EmptyTemplate(_) | RegistryError::DuplicateStage { .. }) => {
                ApiError::BadRequest(e.to_string())
            }
            RegistryError::Store(e) => e.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            TriggerError::Registry(e) => e.into(),
            TriggerError::Store(e) => e.into(),
            TriggerError::Dispatch(e) => e.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::RunNotFound(id) => {
                ApiError::NotFound(format!("Run {} not found", id))
            }
            e @ (OrchestratorError::AlreadyFinished { .. }
            | OrchestratorError::AlreadyRunning(_)) => ApiError::Conflict(e.to_string()),
            OrchestratorError::Start { source, .. } => source.into(),
            OrchestratorError::Registry(e) => e.into(),
            OrchestratorError::Store(e) => e.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            e @ WebhookError::SecretNotConfigured => ApiError::InternalError(e.to_string()),
            e @ (WebhookError::MissingSignature | WebhookError::InvalidSignature) => {
                ApiError::Unauthorized(e.to_string())
            }
            e @ (WebhookError::InvalidRepositoryUrl(_)
            | WebhookError::NoCommits
            | WebhookError::InvalidPayload(_)) => ApiError::BadRequest(e.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
