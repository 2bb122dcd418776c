//! Stage action types
//!
//! A stage action is the executable behaviour bound to a stage. Each variant
//! carries its own typed input; the JSON shapes below are also the wire format
//! of the independently invocable action endpoints.

use serde::{Deserialize, Serialize};

/// Kind of action a stage descriptor can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Build,
    ImagePublish,
    Deploy,
    Monitor,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Build,
        ActionKind::ImagePublish,
        ActionKind::Deploy,
        ActionKind::Monitor,
    ];

    /// Name of the invocable function backing this action
    pub fn function_name(&self) -> &'static str {
        match self {
            ActionKind::Build => "trigger-jenkins",
            ActionKind::ImagePublish => "docker-ecr-push",
            ActionKind::Deploy => "ecs-deploy",
            ActionKind::Monitor => "cloudwatch-logs",
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.function_name() == name)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.function_name())
    }
}

/// Input of the build action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInput {
    pub repo_url: String,
}

/// Input of the image-publish action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePublishInput {
    pub image_tag: String,
}

/// Input of the deploy action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployInput {
    pub image_uri: String,
}

/// A resolved stage action with its typed input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageAction {
    /// Informational stage; echoes the source reference
    SourceTrigger { source_reference: String },
    Build(BuildInput),
    ImagePublish(ImagePublishInput),
    Deploy(DeployInput),
    Monitor,
}

impl StageAction {
    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            StageAction::SourceTrigger { .. } => None,
            StageAction::Build(_) => Some(ActionKind::Build),
            StageAction::ImagePublish(_) => Some(ActionKind::ImagePublish),
            StageAction::Deploy(_) => Some(ActionKind::Deploy),
            StageAction::Monitor => Some(ActionKind::Monitor),
        }
    }

    /// JSON body sent to the action endpoint
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            StageAction::SourceTrigger { .. } | StageAction::Monitor => Ok(serde_json::json!({})),
            StageAction::Build(input) => serde_json::to_value(input),
            StageAction::ImagePublish(input) => serde_json::to_value(input),
            StageAction::Deploy(input) => serde_json::to_value(input),
        }
    }
}

/// Result of a single action invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default)]
    pub logs: Vec<String>,
    /// Artifact produced by the image-publish action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(message: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            success: true,
            logs,
            image_uri: None,
            message: Some(message.into()),
            error: None,
        }
    }

    /// A failed outcome whose single log line carries the reason
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            success: false,
            logs: vec![format!(
                "[{}] ✗ Error: {}",
                chrono::Utc::now().to_rfc3339(),
                reason
            )],
            image_uri: None,
            message: None,
            error: Some(reason),
        }
    }

    pub fn with_image_uri(mut self, image_uri: impl Into<String>) -> Self {
        self.image_uri = Some(image_uri.into());
        self
    }

    /// Human-readable reason for a failed outcome
    pub fn failure_reason(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        if !self.logs.is_empty() {
            return self.logs.join("; ");
        }
        "Stage failed".to_string()
    }
}
