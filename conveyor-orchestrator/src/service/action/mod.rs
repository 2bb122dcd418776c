//! Stage actions
//!
//! An `ActionBackend` executes one resolved `StageAction` and reports its
//! outcome. Action faults are returned as `ActionOutcome { success: false }`;
//! only transport and encoding problems surface as `ActionError`.
//!
//! Source stages have no action; the orchestrator completes them itself and
//! backends answer them with a failed outcome.

use async_trait::async_trait;
use conveyor_core::domain::action::{
    ActionKind, ActionOutcome, BuildInput, DeployInput, ImagePublishInput, StageAction,
};

pub mod http;
pub mod simulated;

pub use http::HttpBackend;
pub use simulated::SimulatedBackend;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("action transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("action {function} returned an unreadable response (status {status})")]
    InvalidResponse { function: String, status: u16 },

    #[error("cannot encode action input: {0}")]
    Encode(#[from] serde_json::Error),
}

pub const NO_ACTION_MESSAGE: &str = "Stage has no action to execute";

/// Executes stage actions
#[async_trait]
pub trait ActionBackend: Send + Sync {
    async fn execute(&self, action: &StageAction) -> Result<ActionOutcome, ActionError>;
}

/// Build a typed action from a function's JSON input
pub fn decode_action(
    kind: ActionKind,
    input: serde_json::Value,
) -> Result<StageAction, serde_json::Error> {
    Ok(match kind {
        ActionKind::Build => StageAction::Build(serde_json::from_value::<BuildInput>(input)?),
        ActionKind::ImagePublish => {
            StageAction::ImagePublish(serde_json::from_value::<ImagePublishInput>(input)?)
        }
        ActionKind::Deploy => StageAction::Deploy(serde_json::from_value::<DeployInput>(input)?),
        ActionKind::Monitor => StageAction::Monitor,
    })
}

/// Log lines of a stage without an action, written by the orchestrator
pub fn source_trigger_logs(source_reference: &str) -> Vec<String> {
    vec![
        "Received webhook from GitHub...".to_string(),
        format!("Repository: {}", source_reference),
        "Pipeline triggered successfully ✓".to_string(),
    ]
}

pub(crate) fn timestamped(line: impl AsRef<str>) -> String {
    format!("[{}] {}", chrono::Utc::now().to_rfc3339(), line.as_ref())
}
