//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each table module handles database operations for a specific domain entity;
//! `RunStore` is the seam the services depend on, with a Postgres and an
//! in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::domain::deployment::Deployment;
use conveyor_core::domain::run::{PipelineRun, RunStatus};
use conveyor_core::domain::stage::{BuildStage, StageStatus};
use conveyor_core::domain::template::{PipelineTemplate, StageDescriptor};
use conveyor_core::dto::deployment::NewDeployment;
use conveyor_core::dto::run::NewPipelineRun;
use uuid::Uuid;

pub mod deployment;
pub mod memory;
pub mod postgres;
pub mod run;
pub mod stage;
pub mod template;

// Re-export for convenience
pub use deployment as deployment_repository;
pub use memory::InMemoryRunStore;
pub use postgres::PgRunStore;
pub use run as run_repository;
pub use stage as stage_repository;
pub use template as template_repository;

/// Errors raised by a run store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("stage {0} not found")]
    StageNotFound(Uuid),

    #[error("stage {stage_id} cannot move from {from} to {to}")]
    InvalidTransition {
        stage_id: Uuid,
        from: StageStatus,
        to: StageStatus,
    },

    /// The run is not in a status that allows the write
    #[error("run {run_id} is {status}")]
    RunNotActive { run_id: Uuid, status: RunStatus },

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record of pipeline runs, their stages and deployments
///
/// Stage transitions are monotonic: implementations reject anything other
/// than pending -> running -> success | failed. Stages only move while their
/// run is `running`, and every stage transition refreshes the run's
/// heartbeat. Runs move pending -> running -> success | failed, and each of
/// those writes is conditional on the current status.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a pending run together with one pending stage per descriptor
    async fn create_run(
        &self,
        new: NewPipelineRun,
        descriptors: &[StageDescriptor],
    ) -> StoreResult<(PipelineRun, Vec<BuildStage>)>;

    async fn find_run(&self, id: Uuid) -> StoreResult<Option<PipelineRun>>;

    /// Most recent runs first
    async fn list_runs(&self, limit: i64) -> StoreResult<Vec<PipelineRun>>;

    /// Move a pending run to running
    ///
    /// Exactly one caller wins a given run. Everyone else gets
    /// `RunNotActive` with the status they lost to.
    async fn claim_run(&self, id: Uuid) -> StoreResult<PipelineRun>;

    /// Move a pending or running run to a terminal status, recording its
    /// deployment in the same write
    ///
    /// Fails with `RunNotActive` if the run already finished, and with
    /// `Conflict` if the run already has a deployment.
    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        completed_at: DateTime<Utc>,
        deployment: Option<NewDeployment>,
    ) -> StoreResult<Option<Deployment>>;

    async fn find_stage(&self, run_id: Uuid, stage_name: &str)
    -> StoreResult<Option<BuildStage>>;

    /// Stages of a run in execution order
    async fn list_stages(&self, run_id: Uuid) -> StoreResult<Vec<BuildStage>>;

    /// Fails with `RunNotActive` once the run is no longer running
    async fn start_stage(&self, stage_id: Uuid, started_at: DateTime<Utc>) -> StoreResult<()>;

    /// Finish a running stage of a running run, replacing its logs
    async fn finish_stage(
        &self,
        stage_id: Uuid,
        status: StageStatus,
        logs: Vec<String>,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn find_deployment(&self, run_id: Uuid) -> StoreResult<Option<Deployment>>;

    async fn list_deployments(&self, limit: i64) -> StoreResult<Vec<Deployment>>;

    async fn find_template(&self, id: Uuid) -> StoreResult<Option<PipelineTemplate>>;

    /// Configured stages of a template, in no particular order
    async fn list_stage_descriptors(&self, template_id: Uuid)
    -> StoreResult<Vec<StageDescriptor>>;

    /// Fail running runs whose heartbeat is older than `cutoff`, along with
    /// their running stage, which gets `log_line` appended
    async fn fail_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
        log_line: &str,
    ) -> StoreResult<Vec<Uuid>>;
}
