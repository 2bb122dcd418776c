//! Run Repository
//!
//! Handles all database operations related to pipeline runs.

use chrono::{DateTime, Utc};
use conveyor_core::domain::run::{PipelineRun, RunStatus, TriggerOrigin};
use conveyor_core::dto::run::NewPipelineRun;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Insert a new run in `pending`
pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    req: NewPipelineRun,
) -> Result<PipelineRun, sqlx::Error> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let run = PipelineRun {
        id,
        repository: req.repository,
        commit_sha: req.commit_sha,
        commit_message: req.commit_message,
        status: RunStatus::Pending,
        triggered_by: req.triggered_by,
        template_id: req.template_id,
        started_at: now,
        completed_at: None,
        heartbeat_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO pipeline_runs (
            id, github_repo, commit_sha, commit_message, status,
            triggered_by, template_id, started_at, heartbeat_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(run.id)
    .bind(&run.repository)
    .bind(&run.commit_sha)
    .bind(&run.commit_message)
    .bind(run.status.as_str())
    .bind(run.triggered_by.as_str())
    .bind(run.template_id)
    .bind(run.started_at)
    .bind(run.heartbeat_at)
    .execute(&mut **tx)
    .await?;

    Ok(run)
}

/// Find a run by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PipelineRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, github_repo, commit_sha, commit_message, status, triggered_by,
               template_id, started_at, completed_at, heartbeat_at
        FROM pipeline_runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List the most recent runs
pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRun>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, github_repo, commit_sha, commit_message, status, triggered_by,
               template_id, started_at, completed_at, heartbeat_at
        FROM pipeline_runs
        ORDER BY started_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Move a pending run to running
/// Returns None when the run does not exist or is not pending
pub async fn claim(pool: &PgPool, id: Uuid) -> Result<Option<PipelineRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        UPDATE pipeline_runs
        SET status = $1, heartbeat_at = $2
        WHERE id = $3 AND status = $4
        RETURNING id, github_repo, commit_sha, commit_message, status, triggered_by,
                  template_id, started_at, completed_at, heartbeat_at
        "#,
    )
    .bind(RunStatus::Running.as_str())
    .bind(Utc::now())
    .bind(id)
    .bind(RunStatus::Pending.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Move a pending or running run to a terminal status
/// Returns false when the run does not exist or already finished
pub async fn finish(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: RunStatus,
    completed_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET status = $1, completed_at = $2, heartbeat_at = $3
        WHERE id = $4 AND status IN ($5, $6)
        "#,
    )
    .bind(status.as_str())
    .bind(completed_at)
    .bind(Utc::now())
    .bind(id)
    .bind(RunStatus::Pending.as_str())
    .bind(RunStatus::Running.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Read the current status of a run, if it exists
pub async fn current_status(pool: &PgPool, id: Uuid) -> Result<Option<RunStatus>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM pipeline_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(status,)| string_to_status(&status)))
}

/// ID and status of the run owning a stage
pub async fn status_by_stage(
    pool: &PgPool,
    stage_id: Uuid,
) -> Result<Option<(Uuid, RunStatus)>, sqlx::Error> {
    let row: Option<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT r.id, r.status
        FROM pipeline_runs r
        JOIN build_stages s ON s.pipeline_run_id = r.id
        WHERE s.id = $1
        "#,
    )
    .bind(stage_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, status)| (id, string_to_status(&status))))
}

/// Refresh the heartbeat of the run owning a stage
pub async fn touch_by_stage(pool: &PgPool, stage_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET heartbeat_at = $1
        WHERE id = (SELECT pipeline_run_id FROM build_stages WHERE id = $2)
        "#,
    )
    .bind(Utc::now())
    .bind(stage_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark running runs without a recent heartbeat as failed
/// Returns the IDs of the runs that were failed
pub async fn fail_stale(
    tx: &mut Transaction<'_, Postgres>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let now = Utc::now();

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        UPDATE pipeline_runs
        SET status = $1, completed_at = $2
        WHERE status = $3 AND heartbeat_at < $4
        RETURNING id
        "#,
    )
    .bind(RunStatus::Failed.as_str())
    .bind(now)
    .bind(RunStatus::Running.as_str())
    .bind(cutoff)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

pub(crate) fn string_to_status(s: &str) -> RunStatus {
    match s {
        "pending" => RunStatus::Pending,
        "running" => RunStatus::Running,
        "success" => RunStatus::Success,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Pending,
    }
}

fn string_to_origin(s: &str) -> TriggerOrigin {
    match s {
        "webhook" => TriggerOrigin::Webhook,
        _ => TriggerOrigin::Manual,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    github_repo: String,
    commit_sha: Option<String>,
    commit_message: Option<String>,
    status: String,
    triggered_by: String,
    template_id: Uuid,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    heartbeat_at: DateTime<Utc>,
}

impl From<RunRow> for PipelineRun {
    fn from(row: RunRow) -> Self {
        PipelineRun {
            id: row.id,
            repository: row.github_repo,
            commit_sha: row.commit_sha,
            commit_message: row.commit_message,
            status: string_to_status(&row.status),
            triggered_by: string_to_origin(&row.triggered_by),
            template_id: row.template_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            heartbeat_at: row.heartbeat_at,
        }
    }
}
