//! Pipeline Orchestrator
//!
//! Drives one run to completion: walks the template's stages in order,
//! executes each stage's action, persists every transition and writes the
//! deployment record when the whole pipeline succeeded.
//!
//! A run is claimed atomically before anything executes, so a second
//! execution of the same run is rejected instead of racing the first. If the
//! run is finished elsewhere while stages are executing (the watchdog), the
//! store rejects the next stage write and the orchestrator stops there.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conveyor_core::domain::action::{
    ActionKind, ActionOutcome, BuildInput, DeployInput, ImagePublishInput, StageAction,
};
use conveyor_core::domain::run::RunStatus;
use conveyor_core::domain::stage::{BuildStage, StageStatus};
use conveyor_core::domain::template::StageDescriptor;
use conveyor_core::dto::deployment::NewDeployment;
use conveyor_core::dto::run::RunOutcome;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::repository::{RunStore, StoreError};
use crate::service::action::{ActionBackend, source_trigger_logs};
use crate::service::registry::{RegistryError, StageRegistry};

pub const SUCCESS_MESSAGE: &str = "Pipeline completed successfully";
pub const FAILURE_MESSAGE: &str = "Pipeline failed";

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("run {run_id} already finished as {status}")]
    AlreadyFinished { run_id: Uuid, status: RunStatus },

    #[error("run {0} is already being executed")]
    AlreadyRunning(Uuid),

    #[error("failed to mark run {run_id} as running: {source}")]
    Start {
        run_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// Only a failed start is worth retrying: nothing has executed yet
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Start {
                source: StoreError::Database(_),
                ..
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Pause after each successful stage
    pub stage_delay: Duration,
    pub stage_timeout: Duration,
    /// Recorded on the deployment
    pub service_name: Option<String>,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            stage_delay: config.stage_delay,
            stage_timeout: config.stage_timeout,
            service_name: config.aws.ecs_service.clone(),
        }
    }
}

/// How a single stage ended
enum StageResult {
    Succeeded { image_uri: Option<String> },
    Failed,
}

/// How the walk over the stages ended
enum RunProgress {
    Completed { image_uri: Option<String> },
    StageFailed,
    /// The run was finished by someone else
    Ended(RunStatus),
}

pub struct Orchestrator {
    store: Arc<dyn RunStore>,
    registry: StageRegistry,
    actions: Arc<dyn ActionBackend>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RunStore>,
        actions: Arc<dyn ActionBackend>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry: StageRegistry::new(store.clone()),
            store,
            actions,
            settings,
        }
    }

    /// Claim a pending run and execute every stage
    pub async fn execute_run(
        &self,
        run_id: Uuid,
        source_reference: &str,
    ) -> Result<RunOutcome, OrchestratorError> {
        let run = self.store.claim_run(run_id).await.map_err(|e| match e {
            StoreError::RunNotFound(id) => OrchestratorError::RunNotFound(id),
            StoreError::RunNotActive { run_id, status } if status.is_terminal() => {
                OrchestratorError::AlreadyFinished { run_id, status }
            }
            StoreError::RunNotActive { run_id, .. } => OrchestratorError::AlreadyRunning(run_id),
            source => OrchestratorError::Start { run_id, source },
        })?;

        info!("Starting pipeline run {} for {}", run_id, source_reference);

        let stages = match self.registry.resolve_stages(run.template_id).await {
            Ok(stages) => stages,
            Err(e) => {
                error!("Cannot resolve stages for run {}: {}", run_id, e);
                self.mark_run_failed(run_id).await;
                return Err(e.into());
            }
        };

        let progress = match self.run_stages(run_id, source_reference, &stages).await {
            Ok(progress) => progress,
            Err(e) => {
                error!("Store failure while executing run {}: {}", run_id, e);
                self.mark_run_failed(run_id).await;
                return Err(e.into());
            }
        };

        let (status, deployment) = match progress {
            RunProgress::Completed { image_uri } => (
                RunStatus::Success,
                image_uri.map(|image_uri| NewDeployment {
                    pipeline_run_id: run_id,
                    image_uri,
                    service_name: self.settings.service_name.clone(),
                }),
            ),
            RunProgress::StageFailed => (RunStatus::Failed, None),
            RunProgress::Ended(status) => return Ok(ended_elsewhere(run_id, status)),
        };

        match self
            .store
            .finish_run(run_id, status, Utc::now(), deployment)
            .await
        {
            Ok(Some(deployment)) => info!(
                "Deployment {} recorded for run {} ({})",
                deployment.id, run_id, deployment.image_tag
            ),
            Ok(None) => {}
            Err(StoreError::RunNotActive { status, .. }) => {
                return Ok(ended_elsewhere(run_id, status));
            }
            Err(e) => return Err(e.into()),
        }

        info!("Pipeline run {} finished: {}", run_id, status);

        Ok(outcome(run_id, status == RunStatus::Success))
    }

    /// Walk the stages in order, stopping at the first failure
    ///
    /// Stops early without touching anything once the store reports the run
    /// is no longer running.
    async fn run_stages(
        &self,
        run_id: Uuid,
        source_reference: &str,
        descriptors: &[StageDescriptor],
    ) -> Result<RunProgress, StoreError> {
        let mut image_uri: Option<String> = None;
        let mut delay_pending = false;

        for descriptor in descriptors {
            let Some(stage) = self.store.find_stage(run_id, &descriptor.stage_name).await? else {
                warn!(
                    "Run {} has no stage '{}', skipping",
                    run_id, descriptor.stage_name
                );
                continue;
            };

            if delay_pending {
                tokio::time::sleep(self.settings.stage_delay).await;
            }

            let action = resolve_action(descriptor, source_reference, image_uri.as_deref());

            match self.run_stage(&stage, action).await {
                Ok(StageResult::Succeeded { image_uri: produced }) => {
                    if produced.is_some() {
                        image_uri = produced;
                    }
                    delay_pending = true;
                }
                Ok(StageResult::Failed) => return Ok(RunProgress::StageFailed),
                Err(StoreError::RunNotActive { status, .. }) => {
                    return Ok(RunProgress::Ended(status));
                }
                Err(e) => {
                    self.mark_stage_failed(&stage, &e).await;
                    return Err(e);
                }
            }
        }

        Ok(RunProgress::Completed { image_uri })
    }

    async fn run_stage(
        &self,
        stage: &BuildStage,
        action: Result<StageAction, String>,
    ) -> Result<StageResult, StoreError> {
        self.store.start_stage(stage.id, Utc::now()).await?;
        info!("Stage '{}' started", stage.stage_name);

        let outcome = match action {
            Ok(action) => self.invoke(action).await,
            Err(reason) => ActionOutcome::failed(reason),
        };

        if outcome.success {
            self.store
                .finish_stage(stage.id, StageStatus::Success, outcome.logs, Utc::now())
                .await?;
            info!("Stage '{}' succeeded", stage.stage_name);
            return Ok(StageResult::Succeeded {
                image_uri: outcome.image_uri,
            });
        }

        let reason = outcome.failure_reason();
        self.store
            .finish_stage(
                stage.id,
                StageStatus::Failed,
                vec![format!("Error: {}", reason)],
                Utc::now(),
            )
            .await?;
        warn!("Stage '{}' failed: {}", stage.stage_name, reason);

        Ok(StageResult::Failed)
    }

    /// Await one action result under the stage timeout
    async fn invoke(&self, action: StageAction) -> ActionOutcome {
        if let StageAction::SourceTrigger { source_reference } = &action {
            return ActionOutcome::succeeded(
                "Source received",
                source_trigger_logs(source_reference),
            );
        }

        match tokio::time::timeout(self.settings.stage_timeout, self.actions.execute(&action))
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ActionOutcome::failed(e.to_string()),
            Err(_) => ActionOutcome::failed(format!(
                "Stage timed out after {}s",
                self.settings.stage_timeout.as_secs_f64()
            )),
        }
    }

    async fn mark_stage_failed(&self, stage: &BuildStage, cause: &StoreError) {
        let logs = vec![format!("Error: {}", cause)];
        if let Err(e) = self
            .store
            .finish_stage(stage.id, StageStatus::Failed, logs, Utc::now())
            .await
        {
            error!("Could not mark stage {} failed: {}", stage.id, e);
        }
    }

    async fn mark_run_failed(&self, run_id: Uuid) {
        match self
            .store
            .finish_run(run_id, RunStatus::Failed, Utc::now(), None)
            .await
        {
            Ok(_) | Err(StoreError::RunNotActive { .. }) => {}
            Err(e) => error!("Could not mark run {} failed: {}", run_id, e),
        }
    }
}

fn ended_elsewhere(run_id: Uuid, status: RunStatus) -> RunOutcome {
    warn!(
        "Run {} was finished elsewhere as {}, stopping execution",
        run_id, status
    );
    outcome(run_id, status == RunStatus::Success)
}

fn outcome(run_id: Uuid, success: bool) -> RunOutcome {
    RunOutcome {
        success,
        run_id,
        message: if success {
            SUCCESS_MESSAGE
        } else {
            FAILURE_MESSAGE
        }
        .to_string(),
    }
}

/// Build a stage's action input from the results of earlier stages
fn resolve_action(
    descriptor: &StageDescriptor,
    source_reference: &str,
    image_uri: Option<&str>,
) -> Result<StageAction, String> {
    let Some(kind) = descriptor.action else {
        return Ok(StageAction::SourceTrigger {
            source_reference: source_reference.to_string(),
        });
    };

    Ok(match kind {
        ActionKind::Build => StageAction::Build(BuildInput {
            repo_url: source_reference.to_string(),
        }),
        ActionKind::ImagePublish => StageAction::ImagePublish(ImagePublishInput {
            image_tag: format!("v{}", Utc::now().timestamp_millis()),
        }),
        ActionKind::Deploy => {
            let image_uri = image_uri.ok_or_else(|| "No image available to deploy".to_string())?;
            StageAction::Deploy(DeployInput {
                image_uri: image_uri.to_string(),
            })
        }
        ActionKind::Monitor => StageAction::Monitor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRunStore;
    use crate::service::testing::{ScriptedBackend, create_default_run, test_settings};
    use crate::service::watchdog::{STALLED_LOG_LINE, Watchdog};
    use conveyor_core::domain::template::PipelineTemplate;
    use conveyor_core::view::PipelineView;

    const SOURCE: &str = "https://github.com/acme/app.git";

    fn orchestrator(store: Arc<InMemoryRunStore>, backend: ScriptedBackend) -> Orchestrator {
        Orchestrator::new(store, Arc::new(backend), test_settings())
    }

    fn spaced_orchestrator(
        store: Arc<InMemoryRunStore>,
        backend: ScriptedBackend,
        stage_delay: Duration,
    ) -> Arc<Orchestrator> {
        let settings = OrchestratorSettings {
            stage_delay,
            ..test_settings()
        };
        Arc::new(Orchestrator::new(store, Arc::new(backend), settings))
    }

    /// Age the run's heartbeat and let the watchdog fail it
    async fn stall(store: &Arc<InMemoryRunStore>, run_id: Uuid) {
        store
            .set_heartbeat(run_id, Utc::now() - chrono::Duration::hours(1))
            .await;
        let watchdog = Watchdog::new(
            store.clone(),
            Duration::from_secs(600),
            Duration::from_secs(60),
        );
        assert_eq!(watchdog.sweep().await.unwrap(), vec![run_id]);
    }

    async fn view(store: &InMemoryRunStore, run_id: Uuid) -> PipelineView {
        let run = store.find_run(run_id).await.unwrap().unwrap();
        let stages = store.list_stages(run_id).await.unwrap();
        PipelineView::project(&run, &stages)
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        let backend = ScriptedBackend::succeeding("registry/app:v42");
        let calls = backend.calls();

        let outcome = orchestrator(store.clone(), backend)
            .execute_run(run_id, SOURCE)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.run_id, run_id);
        assert_eq!(outcome.message, SUCCESS_MESSAGE);

        let run = store.find_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.completed_at.is_some());

        let stages = store.list_stages(run_id).await.unwrap();
        assert_eq!(stages.len(), 5);
        assert!(stages.iter().all(|s| s.status == StageStatus::Success));
        assert!(stages.iter().all(|s| s.completed_at.is_some()));
        assert_eq!(stages[0].logs[1], format!("Repository: {}", SOURCE));

        let deployment = store.find_deployment(run_id).await.unwrap().unwrap();
        assert_eq!(deployment.image_uri.as_deref(), Some("registry/app:v42"));
        assert_eq!(deployment.image_tag, "v42");
        assert_eq!(deployment.service_name.as_deref(), Some("app"));
        assert_eq!(store.list_deployments(10).await.unwrap().len(), 1);

        // build gets the source, deploy gets the published image
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0],
            StageAction::Build(BuildInput {
                repo_url: SOURCE.to_string()
            })
        );
        match &calls[1] {
            StageAction::ImagePublish(input) => assert!(input.image_tag.starts_with('v')),
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(
            calls[2],
            StageAction::Deploy(DeployInput {
                image_uri: "registry/app:v42".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_build_failure_aborts_remaining_stages() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        let backend = ScriptedBackend::succeeding("registry/app:v42").with_outcome(
            ActionKind::Build,
            ActionOutcome {
                success: false,
                logs: vec!["compile error".to_string()],
                image_uri: None,
                message: None,
                error: None,
            },
        );
        let calls = backend.calls();

        let outcome = orchestrator(store.clone(), backend)
            .execute_run(run_id, SOURCE)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.message, FAILURE_MESSAGE);

        let stages = store.list_stages(run_id).await.unwrap();
        let statuses: Vec<_> = stages.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StageStatus::Success,
                StageStatus::Failed,
                StageStatus::Pending,
                StageStatus::Pending,
                StageStatus::Pending,
            ]
        );
        assert_eq!(stages[1].logs, vec!["Error: compile error".to_string()]);

        let run = store.find_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(store.find_deployment(run_id).await.unwrap().is_none());
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(view(&store, run_id).await.is_consistent());
    }

    #[tokio::test]
    async fn test_kth_stage_failure_leaves_remainder_pending() {
        for (failing, k) in [
            (ActionKind::ImagePublish, 3),
            (ActionKind::Deploy, 4),
            (ActionKind::Monitor, 5),
        ] {
            let store = Arc::new(InMemoryRunStore::with_default_template());
            let run_id = create_default_run(&store).await;
            let backend = ScriptedBackend::succeeding("registry/app:v42")
                .with_outcome(failing, ActionOutcome::failed("boom"));

            let outcome = orchestrator(store.clone(), backend)
                .execute_run(run_id, SOURCE)
                .await
                .unwrap();
            assert!(!outcome.success);

            let stages = store.list_stages(run_id).await.unwrap();
            let terminal = stages.iter().filter(|s| s.status.is_terminal()).count();
            let succeeded = stages
                .iter()
                .filter(|s| s.status == StageStatus::Success)
                .count();
            let pending = stages
                .iter()
                .filter(|s| s.status == StageStatus::Pending)
                .count();
            assert_eq!(terminal, k);
            assert_eq!(succeeded, k - 1);
            assert_eq!(pending, 5 - k);
            assert!(store.find_deployment(run_id).await.unwrap().is_none());
            assert!(view(&store, run_id).await.is_consistent());
        }
    }

    #[tokio::test]
    async fn test_missing_stage_row_is_skipped() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        store.remove_stage(run_id, "ecs_deploy").await;

        let outcome = orchestrator(store.clone(), ScriptedBackend::succeeding("registry/app:v42"))
            .execute_run(run_id, SOURCE)
            .await
            .unwrap();

        assert!(outcome.success);
        let stages = store.list_stages(run_id).await.unwrap();
        assert_eq!(stages.len(), 4);
        assert!(stages.iter().all(|s| s.status == StageStatus::Success));
        assert!(store.find_deployment(run_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_action_timeout_fails_stage() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        let backend = ScriptedBackend::succeeding("registry/app:v42").hanging(ActionKind::Deploy);

        let outcome = orchestrator(store.clone(), backend)
            .execute_run(run_id, SOURCE)
            .await
            .unwrap();

        assert!(!outcome.success);
        let stage = store.find_stage(run_id, "ecs_deploy").await.unwrap().unwrap();
        assert_eq!(stage.status, StageStatus::Failed);
        assert!(stage.logs[0].starts_with("Error: Stage timed out"));
        let monitoring = store.find_stage(run_id, "monitoring").await.unwrap().unwrap();
        assert_eq!(monitoring.status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn test_transport_error_fails_stage() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        let backend =
            ScriptedBackend::succeeding("registry/app:v42").transport_error(ActionKind::Build);

        let outcome = orchestrator(store.clone(), backend)
            .execute_run(run_id, SOURCE)
            .await
            .unwrap();

        assert!(!outcome.success);
        let stage = store.find_stage(run_id, "jenkins_build").await.unwrap().unwrap();
        assert_eq!(stage.status, StageStatus::Failed);
        assert!(stage.logs[0].starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_deploy_without_image_fails() {
        let store = Arc::new(InMemoryRunStore::new());
        let template_id = Uuid::new_v4();
        store
            .insert_template(
                PipelineTemplate {
                    id: template_id,
                    name: "deploy only".to_string(),
                    description: None,
                },
                vec![StageDescriptor::new(
                    "deploy",
                    "Deploy",
                    Some(ActionKind::Deploy),
                    1,
                )],
            )
            .await;
        let run_id = crate::service::testing::create_run(&store, template_id).await;

        let outcome = orchestrator(store.clone(), ScriptedBackend::succeeding("unused"))
            .execute_run(run_id, SOURCE)
            .await
            .unwrap();

        assert!(!outcome.success);
        let stage = store.find_stage(run_id, "deploy").await.unwrap().unwrap();
        assert_eq!(stage.logs, vec!["Error: No image available to deploy".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_template_marks_run_failed() {
        let store = Arc::new(InMemoryRunStore::new());
        let run_id = crate::service::testing::create_run(&store, Uuid::new_v4()).await;

        let err = orchestrator(store.clone(), ScriptedBackend::succeeding("unused"))
            .execute_run(run_id, SOURCE)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Registry(RegistryError::TemplateNotFound(_))
        ));
        assert!(!err.is_retryable());
        let run = store.find_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_and_finished_runs_are_rejected() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let orchestrator =
            orchestrator(store.clone(), ScriptedBackend::succeeding("registry/app:v42"));

        let missing = Uuid::new_v4();
        assert!(matches!(
            orchestrator.execute_run(missing, SOURCE).await,
            Err(OrchestratorError::RunNotFound(id)) if id == missing
        ));

        let run_id = create_default_run(&store).await;
        orchestrator.execute_run(run_id, SOURCE).await.unwrap();
        assert!(matches!(
            orchestrator.execute_run(run_id, SOURCE).await,
            Err(OrchestratorError::AlreadyFinished { .. })
        ));
        assert_eq!(store.list_deployments(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_is_retryable() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        store.fail_next_run_writes(1);

        let err = orchestrator(store.clone(), ScriptedBackend::succeeding("registry/app:v42"))
            .execute_run(run_id, SOURCE)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        let stages = store.list_stages(run_id).await.unwrap();
        assert!(stages.iter().all(|s| s.status == StageStatus::Pending));
    }

    #[tokio::test]
    async fn test_runs_for_same_source_are_independent() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let first = create_default_run(&store).await;
        let second = create_default_run(&store).await;
        let orchestrator = Arc::new(orchestrator(
            store.clone(),
            ScriptedBackend::succeeding("registry/app:v42"),
        ));

        let (a, b) = tokio::join!(
            orchestrator.execute_run(first, SOURCE),
            orchestrator.execute_run(second, SOURCE)
        );
        assert!(a.unwrap().success);
        assert!(b.unwrap().success);

        for run_id in [first, second] {
            let stages = store.list_stages(run_id).await.unwrap();
            assert!(stages.iter().all(|s| s.status == StageStatus::Success));
            assert!(store.find_deployment(run_id).await.unwrap().is_some());
        }
        assert_eq!(store.list_deployments(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_execution_of_running_run_is_rejected() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        let orchestrator = spaced_orchestrator(
            store.clone(),
            ScriptedBackend::succeeding("registry/app:v42"),
            Duration::from_millis(100),
        );

        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.execute_run(run_id, SOURCE).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = orchestrator.execute_run(run_id, SOURCE).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRunning(id) if id == run_id));
        assert!(!err.is_retryable());

        // the rejected execution leaves the run to its owner
        let run = store.find_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);

        let outcome = first.await.unwrap().unwrap();
        assert!(outcome.success);

        let run = store.find_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        let stages = store.list_stages(run_id).await.unwrap();
        assert!(stages.iter().all(|s| s.status == StageStatus::Success));
        assert_eq!(store.list_deployments(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_failed_between_stages_is_not_continued() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        let backend = ScriptedBackend::succeeding("registry/app:v42");
        let calls = backend.calls();
        let orchestrator = spaced_orchestrator(store.clone(), backend, Duration::from_millis(300));

        let execution = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.execute_run(run_id, SOURCE).await }
        });
        // github_commit is done, the pause before jenkins_build is running
        tokio::time::sleep(Duration::from_millis(50)).await;
        stall(&store, run_id).await;

        let outcome = execution.await.unwrap().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, FAILURE_MESSAGE);

        let run = store.find_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let statuses: Vec<_> = store
            .list_stages(run_id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                StageStatus::Success,
                StageStatus::Pending,
                StageStatus::Pending,
                StageStatus::Pending,
                StageStatus::Pending,
            ]
        );
        assert!(store.find_deployment(run_id).await.unwrap().is_none());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_failed_during_stage_keeps_watchdog_result() {
        let store = Arc::new(InMemoryRunStore::with_default_template());
        let run_id = create_default_run(&store).await;
        let backend = ScriptedBackend::succeeding("registry/app:v42").hanging(ActionKind::Build);
        let orchestrator = spaced_orchestrator(store.clone(), backend, Duration::ZERO);

        let execution = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.execute_run(run_id, SOURCE).await }
        });
        // jenkins_build is waiting on its action
        tokio::time::sleep(Duration::from_millis(50)).await;
        stall(&store, run_id).await;

        let outcome = execution.await.unwrap().unwrap();
        assert!(!outcome.success);

        let build = store.find_stage(run_id, "jenkins_build").await.unwrap().unwrap();
        assert_eq!(build.status, StageStatus::Failed);
        assert_eq!(build.logs, vec![STALLED_LOG_LINE.to_string()]);
        let publish = store.find_stage(run_id, "docker_ecr").await.unwrap().unwrap();
        assert_eq!(publish.status, StageStatus::Pending);

        let run = store.find_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(store.find_deployment(run_id).await.unwrap().is_none());
    }
}
