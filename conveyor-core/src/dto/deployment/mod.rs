//! Deployment DTOs

use uuid::Uuid;

/// Insert request for a deployment record
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub pipeline_run_id: Uuid,
    pub image_uri: String,
    pub service_name: Option<String>,
}
