//! Run-related API endpoints

use conveyor_core::domain::run::PipelineRun;
use conveyor_core::domain::stage::BuildStage;
use conveyor_core::dto::run::{LaunchResponse, LaunchRun, RunDetails, RunOutcome, TriggerRun};
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    // =============================================================================
    // Triggers
    // =============================================================================

    /// Create a run and queue it for execution
    ///
    /// Returns as soon as the run is queued; poll `get_run` to follow it.
    ///
    /// # Example
    /// ```no_run
    /// # use conveyor_client::OrchestratorClient;
    /// # use conveyor_core::dto::run::LaunchRun;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let launched = client.launch_run(LaunchRun {
    ///     repository: "acme/app".to_string(),
    ///     source_reference: Some("https://github.com/acme/app.git".to_string()),
    ///     commit_sha: None,
    ///     commit_message: None,
    ///     template_id: None,
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn launch_run(&self, req: LaunchRun) -> Result<LaunchResponse> {
        tracing::debug!("Launching run for {}", req.repository);

        let response = self
            .client
            .post(self.url("/pipeline/launch"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Execute an existing run and wait for its outcome
    ///
    /// A run that fails a stage still answers with `success: false`;
    /// only orchestration errors come back as `Err`.
    pub async fn execute_run(&self, run_id: Uuid, source_reference: &str) -> Result<RunOutcome> {
        let response = self
            .client
            .post(self.url("/pipeline/run"))
            .json(&TriggerRun {
                run_id,
                source_reference: source_reference.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Observation
    // =============================================================================

    /// List the most recent runs, newest first
    pub async fn list_runs(&self, limit: Option<i64>) -> Result<Vec<PipelineRun>> {
        let mut request = self.client.get(self.url("/run/list"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Get a run with its stages and deployment
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunDetails> {
        let response = self
            .client
            .get(self.url(&format!("/run/{}", run_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get the stages of a run in execution order
    pub async fn get_run_stages(&self, run_id: Uuid) -> Result<Vec<BuildStage>> {
        let response = self
            .client
            .get(self.url(&format!("/run/{}/stages", run_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
