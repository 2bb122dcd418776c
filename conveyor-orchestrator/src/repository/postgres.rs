//! Postgres-backed run store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::domain::deployment::Deployment;
use conveyor_core::domain::run::{PipelineRun, RunStatus};
use conveyor_core::domain::stage::{BuildStage, StageStatus};
use conveyor_core::domain::template::{PipelineTemplate, StageDescriptor};
use conveyor_core::dto::deployment::NewDeployment;
use conveyor_core::dto::run::NewPipelineRun;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    RunStore, StoreError, StoreResult, deployment_repository, run_repository, stage_repository,
    template_repository,
};

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a guarded run update touched no rows
    async fn rejected_run(&self, run_id: Uuid) -> StoreError {
        match run_repository::current_status(&self.pool, run_id).await {
            Ok(Some(status)) => StoreError::RunNotActive { run_id, status },
            Ok(None) => StoreError::RunNotFound(run_id),
            Err(e) => StoreError::Database(e),
        }
    }

    /// Explain why a guarded stage update touched no rows
    async fn rejected_transition(&self, stage_id: Uuid, to: StageStatus) -> StoreError {
        match run_repository::status_by_stage(&self.pool, stage_id).await {
            Ok(Some((run_id, status))) if status != RunStatus::Running => {
                return StoreError::RunNotActive { run_id, status };
            }
            Ok(_) => {}
            Err(e) => return StoreError::Database(e),
        }

        match stage_repository::current_status(&self.pool, stage_id).await {
            Ok(Some(from)) => StoreError::InvalidTransition { stage_id, from, to },
            Ok(None) => StoreError::StageNotFound(stage_id),
            Err(e) => StoreError::Database(e),
        }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(
        &self,
        new: NewPipelineRun,
        descriptors: &[StageDescriptor],
    ) -> StoreResult<(PipelineRun, Vec<BuildStage>)> {
        let mut tx = self.pool.begin().await?;
        let run = run_repository::create(&mut tx, new).await?;
        let stages = stage_repository::create_pending(&mut tx, run.id, descriptors).await?;
        tx.commit().await?;
        Ok((run, stages))
    }

    async fn find_run(&self, id: Uuid) -> StoreResult<Option<PipelineRun>> {
        Ok(run_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_runs(&self, limit: i64) -> StoreResult<Vec<PipelineRun>> {
        Ok(run_repository::list_recent(&self.pool, limit).await?)
    }

    async fn claim_run(&self, id: Uuid) -> StoreResult<PipelineRun> {
        match run_repository::claim(&self.pool, id).await? {
            Some(run) => Ok(run),
            None => Err(self.rejected_run(id).await),
        }
    }

    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        completed_at: DateTime<Utc>,
        deployment: Option<NewDeployment>,
    ) -> StoreResult<Option<Deployment>> {
        let mut tx = self.pool.begin().await?;
        if !run_repository::finish(&mut tx, id, status, completed_at).await? {
            tx.rollback().await?;
            return Err(self.rejected_run(id).await);
        }

        let deployment = match deployment {
            Some(new) => Some(
                deployment_repository::create(&mut tx, new)
                    .await
                    .map_err(|e| match e {
                        sqlx::Error::Database(db) if db.is_unique_violation() => {
                            StoreError::Conflict(format!("run {} already has a deployment", id))
                        }
                        other => StoreError::Database(other),
                    })?,
            ),
            None => None,
        };

        tx.commit().await?;
        Ok(deployment)
    }

    async fn find_stage(
        &self,
        run_id: Uuid,
        stage_name: &str,
    ) -> StoreResult<Option<BuildStage>> {
        Ok(stage_repository::find_by_name(&self.pool, run_id, stage_name).await?)
    }

    async fn list_stages(&self, run_id: Uuid) -> StoreResult<Vec<BuildStage>> {
        Ok(stage_repository::list_by_run(&self.pool, run_id).await?)
    }

    async fn start_stage(&self, stage_id: Uuid, started_at: DateTime<Utc>) -> StoreResult<()> {
        if !stage_repository::mark_running(&self.pool, stage_id, started_at).await? {
            return Err(self.rejected_transition(stage_id, StageStatus::Running).await);
        }
        run_repository::touch_by_stage(&self.pool, stage_id).await?;
        Ok(())
    }

    async fn finish_stage(
        &self,
        stage_id: Uuid,
        status: StageStatus,
        logs: Vec<String>,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !status.is_terminal() {
            return Err(self.rejected_transition(stage_id, status).await);
        }
        if !stage_repository::mark_finished(&self.pool, stage_id, status, &logs, completed_at)
            .await?
        {
            return Err(self.rejected_transition(stage_id, status).await);
        }
        run_repository::touch_by_stage(&self.pool, stage_id).await?;
        Ok(())
    }

    async fn find_deployment(&self, run_id: Uuid) -> StoreResult<Option<Deployment>> {
        Ok(deployment_repository::find_by_run(&self.pool, run_id).await?)
    }

    async fn list_deployments(&self, limit: i64) -> StoreResult<Vec<Deployment>> {
        Ok(deployment_repository::list_recent(&self.pool, limit).await?)
    }

    async fn find_template(&self, id: Uuid) -> StoreResult<Option<PipelineTemplate>> {
        Ok(template_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_stage_descriptors(
        &self,
        template_id: Uuid,
    ) -> StoreResult<Vec<StageDescriptor>> {
        Ok(template_repository::list_stages(&self.pool, template_id).await?)
    }

    async fn fail_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
        log_line: &str,
    ) -> StoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let run_ids = run_repository::fail_stale(&mut tx, cutoff).await?;
        stage_repository::fail_running_for_runs(&mut tx, &run_ids, log_line).await?;
        tx.commit().await?;
        Ok(run_ids)
    }
}
