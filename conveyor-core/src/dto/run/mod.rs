//! Run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deployment::Deployment;
use crate::domain::run::{PipelineRun, TriggerOrigin};
use crate::domain::stage::BuildStage;

/// Trigger entry point: execute an existing run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRun {
    pub run_id: Uuid,
    pub source_reference: String,
}

/// Result of driving a run to completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub success: bool,
    pub run_id: Uuid,
    pub message: String,
}

/// Manual request to start a new run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRun {
    /// Repository reference recorded on the run (e.g. "owner/name")
    pub repository: String,
    /// Reference handed to the build stage; defaults to `repository`
    #[serde(default)]
    pub source_reference: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
}

/// Response of a trigger that created and queued a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
    pub success: bool,
    pub run_id: Uuid,
    pub message: String,
}

/// Insert request for a new run record
#[derive(Debug, Clone)]
pub struct NewPipelineRun {
    pub repository: String,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub triggered_by: TriggerOrigin,
    pub template_id: Uuid,
}

/// A run with its stages (in execution order) and deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetails {
    pub run: PipelineRun,
    pub stages: Vec<BuildStage>,
    pub deployment: Option<Deployment>,
}
