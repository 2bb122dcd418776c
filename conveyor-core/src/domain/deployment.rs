//! Deployment domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deployment record emitted once per fully successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub pipeline_run_id: Uuid,
    pub image_tag: String,
    pub image_uri: Option<String>,
    /// Target service the image was rolled out to
    pub service_name: Option<String>,
    pub status: DeploymentStatus,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Deployed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Deployed => "deployed",
        }
    }
}

/// Tag portion of an image reference: whatever follows the last `:`
///
/// Falls back to `latest` when the reference carries no tag.
pub fn image_tag_from_uri(image_uri: &str) -> String {
    match image_uri.rsplit_once(':') {
        Some((_, tag)) if !tag.is_empty() && !tag.contains('/') => tag.to_string(),
        _ => "latest".to_string(),
    }
}
