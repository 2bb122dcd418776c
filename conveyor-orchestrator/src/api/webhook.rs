//! GitHub Webhook Handler

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use conveyor_core::dto::webhook::IgnoredEvent;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::webhook::{
    EVENT_HEADER, SIGNATURE_HEADER, parse_push_event, verify_signature,
};

/// POST /webhook/github
/// Verify the signature, then start a run for push events
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    tracing::info!("GitHub webhook received");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    verify_signature(state.webhook_secret.as_deref(), &body, signature)?;

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    tracing::debug!("GitHub event type: {:?}", event);

    if event.as_deref() != Some("push") {
        return Ok(Json(IgnoredEvent {
            message: "Event ignored".to_string(),
            event,
        })
        .into_response());
    }

    let push = parse_push_event(&body)?;
    let response = state.trigger.handle_push_event(push).await?;

    Ok(Json(response).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{SECRET, test_state};
    use crate::repository::RunStore;
    use crate::service::testing::sign;
    use axum::http::{HeaderValue, StatusCode};
    use conveyor_core::domain::run::TriggerOrigin;

    fn push_body(clone_url: &str) -> Bytes {
        Bytes::from(
            serde_json::to_vec(&serde_json::json!({
                "repository": { "full_name": "acme/app", "clone_url": clone_url },
                "commits": [{ "id": "bbb", "message": "Add feature" }],
            }))
            .unwrap(),
        )
    }

    fn headers(event: &str, signature: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(EVENT_HEADER, HeaderValue::from_str(event).unwrap());
        if let Some(signature) = signature {
            headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(signature).unwrap());
        }
        headers
    }

    async fn status(state: AppState, headers: HeaderMap, body: Bytes) -> StatusCode {
        match github_webhook(State(state), headers, body).await {
            Ok(response) => response.status(),
            Err(e) => e.into_response().status(),
        }
    }

    #[tokio::test]
    async fn test_signed_push_creates_run() {
        let (state, mut queue, store) = test_state(4);
        let body = push_body("https://github.com/acme/app.git");
        let signature = sign(SECRET, &body);

        let response = github_webhook(State(state), headers("push", Some(&signature)), body)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let job = queue.try_next().unwrap();
        let run = store.find_run(job.run_id).await.unwrap().unwrap();
        assert_eq!(run.triggered_by, TriggerOrigin::Webhook);
        assert_eq!(run.commit_sha.as_deref(), Some("bbb"));
    }

    #[tokio::test]
    async fn test_signature_is_required() {
        let (state, _queue, store) = test_state(4);
        let body = push_body("https://github.com/acme/app.git");

        assert_eq!(
            status(state.clone(), headers("push", None), body.clone()).await,
            StatusCode::UNAUTHORIZED
        );
        let wrong = sign("not-the-secret", &body);
        assert_eq!(
            status(state.clone(), headers("push", Some(&wrong)), body.clone()).await,
            StatusCode::UNAUTHORIZED
        );

        let mut unconfigured = state;
        unconfigured.webhook_secret = None;
        let signature = sign(SECRET, &body);
        assert_eq!(
            status(unconfigured, headers("push", Some(&signature)), body).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );

        assert!(store.list_runs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let (state, mut queue, _store) = test_state(4);
        let body = Bytes::from_static(b"{\"zen\":\"Design for failure.\"}");
        let signature = sign(SECRET, &body);

        assert_eq!(
            status(state, headers("ping", Some(&signature)), body).await,
            StatusCode::OK
        );
        assert!(queue.try_next().is_none());
    }

    #[tokio::test]
    async fn test_invalid_clone_url_is_rejected() {
        let (state, _queue, store) = test_state(4);
        let body = push_body("https://evil.example.com/acme/app.git");
        let signature = sign(SECRET, &body);

        assert_eq!(
            status(state, headers("push", Some(&signature)), body).await,
            StatusCode::BAD_REQUEST
        );
        assert!(store.list_runs(10).await.unwrap().is_empty());
    }
}
