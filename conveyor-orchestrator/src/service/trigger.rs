//! Trigger Service
//!
//! Creates runs from manual launches and GitHub push events, then hands them
//! to the dispatcher. The stage list is resolved before anything is written,
//! so configuration errors leave no rows behind.

use std::sync::Arc;

use chrono::Utc;
use conveyor_core::domain::run::{RunStatus, TriggerOrigin};
use conveyor_core::dto::run::{LaunchResponse, LaunchRun, NewPipelineRun};
use conveyor_core::dto::webhook::GithubPushEvent;
use tracing::{error, info};
use uuid::Uuid;

use crate::repository::{RunStore, StoreError};
use crate::service::dispatcher::{DispatchError, RunDispatcher, RunJob};
use crate::service::registry::{RegistryError, StageRegistry};

pub const WEBHOOK_MESSAGE: &str = "Webhook processed successfully";
pub const LAUNCH_MESSAGE: &str = "Pipeline run queued";

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Clone)]
pub struct TriggerService {
    store: Arc<dyn RunStore>,
    registry: StageRegistry,
    dispatcher: RunDispatcher,
    default_template_id: Uuid,
}

impl TriggerService {
    pub fn new(
        store: Arc<dyn RunStore>,
        dispatcher: RunDispatcher,
        default_template_id: Uuid,
    ) -> Self {
        Self {
            registry: StageRegistry::new(store.clone()),
            store,
            dispatcher,
            default_template_id,
        }
    }

    /// Start a run on request
    pub async fn launch_run(&self, req: LaunchRun) -> Result<LaunchResponse, TriggerError> {
        let repository = req.repository.trim().to_string();
        if repository.is_empty() {
            return Err(TriggerError::InvalidRequest(
                "repository cannot be empty".to_string(),
            ));
        }

        let source_reference = req
            .source_reference
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| repository.clone());

        let new = NewPipelineRun {
            repository,
            commit_sha: req.commit_sha,
            commit_message: req.commit_message,
            triggered_by: TriggerOrigin::Manual,
            template_id: req.template_id.unwrap_or(self.default_template_id),
        };

        let run_id = self.start(new, source_reference).await?;
        Ok(LaunchResponse {
            success: true,
            run_id,
            message: LAUNCH_MESSAGE.to_string(),
        })
    }

    /// Start a run for a validated GitHub push event
    pub async fn handle_push_event(
        &self,
        event: GithubPushEvent,
    ) -> Result<LaunchResponse, TriggerError> {
        info!("Received push webhook for {}", event.repository.full_name);

        let commit = event.latest_commit().cloned();
        let new = NewPipelineRun {
            repository: event.repository.full_name.clone(),
            commit_sha: commit.as_ref().map(|c| c.id.clone()),
            commit_message: commit.map(|c| c.message),
            triggered_by: TriggerOrigin::Webhook,
            template_id: self.default_template_id,
        };

        let run_id = self.start(new, event.repository.clone_url).await?;
        Ok(LaunchResponse {
            success: true,
            run_id,
            message: WEBHOOK_MESSAGE.to_string(),
        })
    }

    async fn start(
        &self,
        new: NewPipelineRun,
        source_reference: String,
    ) -> Result<Uuid, TriggerError> {
        let descriptors = self.registry.resolve_stages(new.template_id).await?;
        let (run, stages) = self.store.create_run(new, &descriptors).await?;

        info!(
            "Pipeline run {} created for {} with {} stage(s)",
            run.id,
            run.repository,
            stages.len()
        );

        if let Err(e) = self.dispatcher.dispatch(RunJob {
            run_id: run.id,
            source_reference,
        }) {
            error!("Could not queue run {}: {}", run.id, e);
            // The run will never execute
            if let Err(store_err) = self
                .store
                .finish_run(run.id, RunStatus::Failed, Utc::now(), None)
                .await
            {
                error!("Could not mark run {} failed: {}", run.id, store_err);
            }
            return Err(e.into());
        }

        Ok(run.id)
    }
}
