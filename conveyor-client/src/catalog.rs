//! Deployment, template and health endpoints

use conveyor_core::domain::deployment::Deployment;
use conveyor_core::domain::template::StageDescriptor;
use serde::Deserialize;
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;

/// Body of `GET /health`
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl OrchestratorClient {
    /// List the most recent deployments
    pub async fn list_deployments(&self, limit: Option<i64>) -> Result<Vec<Deployment>> {
        let mut request = self.client.get(self.url("/deployment/list"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Resolved stage list of a template
    pub async fn template_stages(&self, template_id: Uuid) -> Result<Vec<StageDescriptor>> {
        let response = self
            .client
            .get(self.url(&format!("/template/{}/stages", template_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(self.url("/health")).send().await?;

        self.handle_response(response).await
    }
}
