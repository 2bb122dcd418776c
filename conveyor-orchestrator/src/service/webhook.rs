//! GitHub webhook checks
//!
//! Signature verification (`x-hub-signature-256`) and payload validation for
//! push events.

use std::sync::LazyLock;

use conveyor_core::dto::webhook::GithubPushEvent;
use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

static CLONE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/[a-zA-Z0-9_-]+/[a-zA-Z0-9_.-]+(\.git)?$")
        .expect("clone URL pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook secret not configured")]
    SecretNotConfigured,

    #[error("No signature provided")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid repository URL")]
    InvalidRepositoryUrl(String),

    #[error("No commits in push event")]
    NoCommits,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Check a `sha256=<hex>` signature of `body` against the shared secret
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    let secret = secret.ok_or(WebhookError::SecretNotConfigured)?;
    let signature = signature.ok_or(WebhookError::MissingSignature)?;

    let expected = signature
        .strip_prefix("sha256=")
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .ok_or(WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SecretNotConfigured)?;
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Parse a push event and check it can start a run
pub fn parse_push_event(body: &[u8]) -> Result<GithubPushEvent, WebhookError> {
    let event: GithubPushEvent =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    if !CLONE_URL.is_match(&event.repository.clone_url) {
        return Err(WebhookError::InvalidRepositoryUrl(
            event.repository.clone_url.clone(),
        ));
    }

    if event.latest_commit().is_none() {
        return Err(WebhookError::NoCommits);
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::sign;

    fn push_body(clone_url: &str, commits: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "repository": { "full_name": "acme/app", "clone_url": clone_url },
            "commits": commits,
            "pusher": { "name": "octocat" }
        }))
        .unwrap()
    }

    #[test]
    fn test_signature_round_trip() {
        let body = b"{\"zen\":\"Keep it logically awesome.\"}";
        let signature = sign("s3cret", body);

        assert!(verify_signature(Some("s3cret"), body, Some(&signature)).is_ok());
        assert!(matches!(
            verify_signature(Some("other"), body, Some(&signature)),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_known_signature() {
        // Example from GitHub's webhook documentation
        let signature = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert!(verify_signature(Some("It's a Secret to Everybody"), b"Hello, World!", Some(signature)).is_ok());
    }

    #[test]
    fn test_signature_errors() {
        let body = b"{}";
        assert!(matches!(
            verify_signature(None, body, Some("sha256=00")),
            Err(WebhookError::SecretNotConfigured)
        ));
        assert!(matches!(
            verify_signature(Some("s"), body, None),
            Err(WebhookError::MissingSignature)
        ));
        assert!(matches!(
            verify_signature(Some("s"), body, Some("sha1=abc")),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature(Some("s"), body, Some("sha256=not-hex")),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_push_event_validation() {
        let commits = serde_json::json!([
            { "id": "aaa", "message": "first" },
            { "id": "bbb", "message": "second" }
        ]);

        let event = parse_push_event(&push_body("https://github.com/acme/app.git", commits.clone()))
            .unwrap();
        assert_eq!(event.latest_commit().unwrap().id, "bbb");

        assert!(parse_push_event(&push_body("https://github.com/acme/my.app", commits.clone())).is_ok());

        for bad in [
            "http://github.com/acme/app.git",
            "https://gitlab.com/acme/app.git",
            "https://github.com/acme/app.git; rm -rf /",
            "https://github.com/acme",
        ] {
            assert!(matches!(
                parse_push_event(&push_body(bad, commits.clone())),
                Err(WebhookError::InvalidRepositoryUrl(_))
            ));
        }

        assert!(matches!(
            parse_push_event(&push_body("https://github.com/acme/app.git", serde_json::json!([]))),
            Err(WebhookError::NoCommits)
        ));
        assert!(matches!(
            parse_push_event(b"not json"),
            Err(WebhookError::InvalidPayload(_))
        ));
    }
}
