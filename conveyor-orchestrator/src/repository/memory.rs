//! In-memory run store
//!
//! Used for `STORE_BACKEND=memory` and by the service tests. Enforces the
//! same transition and uniqueness rules as the Postgres store.

use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::domain::deployment::{Deployment, DeploymentStatus, image_tag_from_uri};
use conveyor_core::domain::run::{PipelineRun, RunStatus};
use conveyor_core::domain::stage::{BuildStage, StageStatus};
use conveyor_core::domain::template::{
    PipelineTemplate, StageDescriptor, default_stage_descriptors, default_template,
};
use conveyor_core::dto::deployment::NewDeployment;
use conveyor_core::dto::run::NewPipelineRun;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RunStore, StoreError, StoreResult};

#[derive(Default)]
struct State {
    runs: HashMap<Uuid, PipelineRun>,
    stages: HashMap<Uuid, BuildStage>,
    /// Keyed by run ID
    deployments: HashMap<Uuid, Deployment>,
    templates: HashMap<Uuid, (PipelineTemplate, Vec<StageDescriptor>)>,
}

impl State {
    fn touch_run_of(&mut self, stage_id: Uuid) {
        let Some(run_id) = self.stages.get(&stage_id).map(|s| s.pipeline_run_id) else {
            return;
        };
        if let Some(run) = self.runs.get_mut(&run_id) {
            run.heartbeat_at = Utc::now();
        }
    }

    fn transition(
        &mut self,
        stage_id: Uuid,
        to: StageStatus,
    ) -> StoreResult<&mut BuildStage> {
        let run_id = self
            .stages
            .get(&stage_id)
            .map(|s| s.pipeline_run_id)
            .ok_or(StoreError::StageNotFound(stage_id))?;
        if let Some(run) = self
            .runs
            .get(&run_id)
            .filter(|r| r.status != RunStatus::Running)
        {
            return Err(StoreError::RunNotActive {
                run_id,
                status: run.status,
            });
        }

        let stage = self
            .stages
            .get_mut(&stage_id)
            .ok_or(StoreError::StageNotFound(stage_id))?;

        if !stage.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                stage_id,
                from: stage.status,
                to,
            });
        }

        stage.status = to;
        Ok(stage)
    }
}

#[derive(Default)]
pub struct InMemoryRunStore {
    state: Mutex<State>,
    #[cfg(test)]
    run_write_failures: AtomicUsize,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with the default template, like a migrated database
    pub fn with_default_template() -> Self {
        let template = default_template();
        let mut state = State::default();
        state
            .templates
            .insert(template.id, (template, default_stage_descriptors()));

        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    pub async fn insert_template(
        &self,
        template: PipelineTemplate,
        descriptors: Vec<StageDescriptor>,
    ) {
        let mut state = self.state.lock().await;
        state.templates.insert(template.id, (template, descriptors));
    }

    /// Make the next `count` run claims or finishes fail with a database error
    #[cfg(test)]
    pub(crate) fn fail_next_run_writes(&self, count: usize) {
        self.run_write_failures.store(count, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn injected_failure(&self) -> StoreResult<()> {
        if self
            .run_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn set_heartbeat(&self, run_id: Uuid, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(run) = state.runs.get_mut(&run_id) {
            run.heartbeat_at = at;
        }
    }

    #[cfg(test)]
    pub(crate) async fn remove_stage(&self, run_id: Uuid, stage_name: &str) {
        let mut state = self.state.lock().await;
        state
            .stages
            .retain(|_, s| !(s.pipeline_run_id == run_id && s.stage_name == stage_name));
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(
        &self,
        new: NewPipelineRun,
        descriptors: &[StageDescriptor],
    ) -> StoreResult<(PipelineRun, Vec<BuildStage>)> {
        let now = Utc::now();
        let run = PipelineRun {
            id: Uuid::new_v4(),
            repository: new.repository,
            commit_sha: new.commit_sha,
            commit_message: new.commit_message,
            status: RunStatus::Pending,
            triggered_by: new.triggered_by,
            template_id: new.template_id,
            started_at: now,
            completed_at: None,
            heartbeat_at: now,
        };

        let mut names = std::collections::HashSet::new();
        if let Some(dup) = descriptors
            .iter()
            .find(|d| !names.insert(d.stage_name.as_str()))
        {
            return Err(StoreError::Conflict(format!(
                "duplicate stage '{}'",
                dup.stage_name
            )));
        }

        let stages: Vec<BuildStage> = descriptors
            .iter()
            .map(|descriptor| BuildStage {
                id: Uuid::new_v4(),
                pipeline_run_id: run.id,
                stage_name: descriptor.stage_name.clone(),
                order_index: descriptor.order_index,
                status: StageStatus::Pending,
                logs: Vec::new(),
                started_at: None,
                completed_at: None,
                created_at: now,
            })
            .collect();

        let mut state = self.state.lock().await;
        state.runs.insert(run.id, run.clone());
        for stage in &stages {
            state.stages.insert(stage.id, stage.clone());
        }

        Ok((run, stages))
    }

    async fn find_run(&self, id: Uuid) -> StoreResult<Option<PipelineRun>> {
        Ok(self.state.lock().await.runs.get(&id).cloned())
    }

    async fn list_runs(&self, limit: i64) -> StoreResult<Vec<PipelineRun>> {
        let state = self.state.lock().await;
        let mut runs: Vec<PipelineRun> = state.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn claim_run(&self, id: Uuid) -> StoreResult<PipelineRun> {
        #[cfg(test)]
        self.injected_failure()?;

        let mut state = self.state.lock().await;
        let run = state.runs.get_mut(&id).ok_or(StoreError::RunNotFound(id))?;
        if run.status != RunStatus::Pending {
            return Err(StoreError::RunNotActive {
                run_id: id,
                status: run.status,
            });
        }

        run.status = RunStatus::Running;
        run.heartbeat_at = Utc::now();
        Ok(run.clone())
    }

    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        completed_at: DateTime<Utc>,
        deployment: Option<NewDeployment>,
    ) -> StoreResult<Option<Deployment>> {
        #[cfg(test)]
        self.injected_failure()?;

        let mut state = self.state.lock().await;
        let current = state
            .runs
            .get(&id)
            .map(|r| r.status)
            .ok_or(StoreError::RunNotFound(id))?;
        if current.is_terminal() {
            return Err(StoreError::RunNotActive {
                run_id: id,
                status: current,
            });
        }
        if deployment.is_some() && state.deployments.contains_key(&id) {
            return Err(StoreError::Conflict(format!(
                "run {} already has a deployment",
                id
            )));
        }

        let deployment = deployment.map(|new| Deployment {
            id: Uuid::new_v4(),
            pipeline_run_id: id,
            image_tag: image_tag_from_uri(&new.image_uri),
            image_uri: Some(new.image_uri),
            service_name: new.service_name,
            status: DeploymentStatus::Deployed,
            deployed_at: Utc::now(),
        });
        if let Some(deployment) = &deployment {
            state.deployments.insert(id, deployment.clone());
        }

        if let Some(run) = state.runs.get_mut(&id) {
            run.status = status;
            run.completed_at = Some(completed_at);
            run.heartbeat_at = Utc::now();
        }
        Ok(deployment)
    }

    async fn find_stage(
        &self,
        run_id: Uuid,
        stage_name: &str,
    ) -> StoreResult<Option<BuildStage>> {
        let state = self.state.lock().await;
        Ok(state
            .stages
            .values()
            .find(|s| s.pipeline_run_id == run_id && s.stage_name == stage_name)
            .cloned())
    }

    async fn list_stages(&self, run_id: Uuid) -> StoreResult<Vec<BuildStage>> {
        let state = self.state.lock().await;
        let mut stages: Vec<BuildStage> = state
            .stages
            .values()
            .filter(|s| s.pipeline_run_id == run_id)
            .cloned()
            .collect();
        stages.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.stage_name.cmp(&b.stage_name))
        });
        Ok(stages)
    }

    async fn start_stage(&self, stage_id: Uuid, started_at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let stage = state.transition(stage_id, StageStatus::Running)?;
        stage.started_at = Some(started_at);
        state.touch_run_of(stage_id);
        Ok(())
    }

    async fn finish_stage(
        &self,
        stage_id: Uuid,
        status: StageStatus,
        logs: Vec<String>,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !status.is_terminal() {
            let from = state
                .stages
                .get(&stage_id)
                .map(|s| s.status)
                .ok_or(StoreError::StageNotFound(stage_id))?;
            return Err(StoreError::InvalidTransition {
                stage_id,
                from,
                to: status,
            });
        }

        let stage = state.transition(stage_id, status)?;
        stage.logs = logs;
        stage.completed_at = Some(completed_at);
        state.touch_run_of(stage_id);
        Ok(())
    }

    async fn find_deployment(&self, run_id: Uuid) -> StoreResult<Option<Deployment>> {
        Ok(self.state.lock().await.deployments.get(&run_id).cloned())
    }

    async fn list_deployments(&self, limit: i64) -> StoreResult<Vec<Deployment>> {
        let state = self.state.lock().await;
        let mut deployments: Vec<Deployment> = state.deployments.values().cloned().collect();
        deployments.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        deployments.truncate(limit.max(0) as usize);
        Ok(deployments)
    }

    async fn find_template(&self, id: Uuid) -> StoreResult<Option<PipelineTemplate>> {
        let state = self.state.lock().await;
        Ok(state.templates.get(&id).map(|(template, _)| template.clone()))
    }

    async fn list_stage_descriptors(
        &self,
        template_id: Uuid,
    ) -> StoreResult<Vec<StageDescriptor>> {
        let state = self.state.lock().await;
        Ok(state
            .templates
            .get(&template_id)
            .map(|(_, descriptors)| descriptors.clone())
            .unwrap_or_default())
    }

    async fn fail_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
        log_line: &str,
    ) -> StoreResult<Vec<Uuid>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut failed = Vec::new();
        for run in state.runs.values_mut() {
            if run.status == RunStatus::Running && run.heartbeat_at < cutoff {
                run.status = RunStatus::Failed;
                run.completed_at = Some(now);
                failed.push(run.id);
            }
        }

        for stage in state.stages.values_mut() {
            if failed.contains(&stage.pipeline_run_id) && stage.status == StageStatus::Running {
                stage.status = StageStatus::Failed;
                stage.completed_at = Some(now);
                stage.logs.push(log_line.to_string());
            }
        }

        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::domain::run::TriggerOrigin;
    use conveyor_core::domain::template::DEFAULT_TEMPLATE_ID;

    fn new_run() -> NewPipelineRun {
        NewPipelineRun {
            repository: "acme/app".to_string(),
            commit_sha: Some("abc123".to_string()),
            commit_message: Some("fix build".to_string()),
            triggered_by: TriggerOrigin::Manual,
            template_id: DEFAULT_TEMPLATE_ID,
        }
    }

    #[tokio::test]
    async fn test_create_run_creates_pending_stages() {
        let store = InMemoryRunStore::with_default_template();
        let (run, stages) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(stages.len(), 5);
        assert!(stages.iter().all(|s| s.status == StageStatus::Pending));

        let listed = store.list_stages(run.id).await.unwrap();
        let names: Vec<_> = listed.iter().map(|s| s.stage_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "github_commit",
                "jenkins_build",
                "docker_ecr",
                "ecs_deploy",
                "monitoring"
            ]
        );
    }

    #[tokio::test]
    async fn test_stage_transitions_are_monotonic() {
        let store = InMemoryRunStore::with_default_template();
        let (run, stages) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();
        store.claim_run(run.id).await.unwrap();
        let stage_id = stages[0].id;

        // pending -> success is not allowed
        let err = store
            .finish_stage(stage_id, StageStatus::Success, vec![], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store.start_stage(stage_id, Utc::now()).await.unwrap();
        store
            .finish_stage(stage_id, StageStatus::Success, vec!["ok".into()], Utc::now())
            .await
            .unwrap();

        // terminal stages are never revisited
        assert!(store.start_stage(stage_id, Utc::now()).await.is_err());
        assert!(
            store
                .finish_stage(stage_id, StageStatus::Failed, vec![], Utc::now())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_stage_transition_refreshes_heartbeat() {
        let store = InMemoryRunStore::with_default_template();
        let (run, stages) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();
        store.claim_run(run.id).await.unwrap();
        let old = Utc::now() - chrono::Duration::hours(1);
        store.set_heartbeat(run.id, old).await;

        store.start_stage(stages[0].id, Utc::now()).await.unwrap();

        let run = store.find_run(run.id).await.unwrap().unwrap();
        assert!(run.heartbeat_at > old);
    }

    #[tokio::test]
    async fn test_run_is_claimed_once() {
        let store = InMemoryRunStore::with_default_template();
        let (run, _) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();

        let claimed = store.claim_run(run.id).await.unwrap();
        assert_eq!(claimed.status, RunStatus::Running);

        let err = store.claim_run(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::RunNotActive { status: RunStatus::Running, .. }
        ));

        let missing = Uuid::new_v4();
        assert!(matches!(
            store.claim_run(missing).await,
            Err(StoreError::RunNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_finish_run_records_deployment_once() {
        let store = InMemoryRunStore::with_default_template();
        let (run, _) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();
        store.claim_run(run.id).await.unwrap();

        let new = NewDeployment {
            pipeline_run_id: run.id,
            image_uri: "registry/app:v42".to_string(),
            service_name: Some("app".to_string()),
        };
        let deployment = store
            .finish_run(run.id, RunStatus::Success, Utc::now(), Some(new.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deployment.image_tag, "v42");

        // a finished run is never rewritten
        let err = store
            .finish_run(run.id, RunStatus::Failed, Utc::now(), Some(new))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::RunNotActive { status: RunStatus::Success, .. }
        ));

        let run = store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(store.list_deployments(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stages_only_move_while_run_is_running() {
        let store = InMemoryRunStore::with_default_template();
        let (run, stages) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();

        // not claimed yet
        assert!(matches!(
            store.start_stage(stages[0].id, Utc::now()).await,
            Err(StoreError::RunNotActive { status: RunStatus::Pending, .. })
        ));

        store.claim_run(run.id).await.unwrap();
        store.start_stage(stages[0].id, Utc::now()).await.unwrap();
        store
            .finish_run(run.id, RunStatus::Failed, Utc::now(), None)
            .await
            .unwrap();

        assert!(matches!(
            store
                .finish_stage(stages[0].id, StageStatus::Success, vec![], Utc::now())
                .await,
            Err(StoreError::RunNotActive { status: RunStatus::Failed, .. })
        ));
        assert!(matches!(
            store.start_stage(stages[1].id, Utc::now()).await,
            Err(StoreError::RunNotActive { status: RunStatus::Failed, .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_stale_runs() {
        let store = InMemoryRunStore::with_default_template();
        let (stale, stale_stages) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();
        let (fresh, _) = store
            .create_run(new_run(), &default_stage_descriptors())
            .await
            .unwrap();

        for id in [stale.id, fresh.id] {
            store.claim_run(id).await.unwrap();
        }
        store.start_stage(stale_stages[0].id, Utc::now()).await.unwrap();
        store
            .set_heartbeat(stale.id, Utc::now() - chrono::Duration::hours(2))
            .await;

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let failed = store.fail_stale_runs(cutoff, "stalled").await.unwrap();
        assert_eq!(failed, vec![stale.id]);

        let stale = store.find_run(stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, RunStatus::Failed);
        assert!(stale.completed_at.is_some());

        let stage = store
            .find_stage(stale.id, "github_commit")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stage.status, StageStatus::Failed);
        assert_eq!(stage.logs.last().map(String::as_str), Some("stalled"));

        let fresh = store.find_run(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_list_runs_respects_limit() {
        let store = InMemoryRunStore::with_default_template();
        for _ in 0..3 {
            store
                .create_run(new_run(), &default_stage_descriptors())
                .await
                .unwrap();
        }
        assert_eq!(store.list_runs(2).await.unwrap().len(), 2);
        assert_eq!(store.list_runs(10).await.unwrap().len(), 3);
    }
}
