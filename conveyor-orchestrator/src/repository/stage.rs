//! Stage Repository
//!
//! Handles all database operations related to build stages.
//! Status updates are guarded in SQL so a stage only moves forward, and
//! only while its run is running.

use chrono::{DateTime, Utc};
use conveyor_core::domain::run::RunStatus;
use conveyor_core::domain::stage::{BuildStage, StageStatus};
use conveyor_core::domain::template::StageDescriptor;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Insert one pending stage row per descriptor
pub async fn create_pending(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    descriptors: &[StageDescriptor],
) -> Result<Vec<BuildStage>, sqlx::Error> {
    let now = Utc::now();
    let mut stages = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let stage = BuildStage {
            id: Uuid::new_v4(),
            pipeline_run_id: run_id,
            stage_name: descriptor.stage_name.clone(),
            order_index: descriptor.order_index,
            status: StageStatus::Pending,
            logs: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO build_stages (
                id, pipeline_run_id, stage_name, order_index, status, logs, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(stage.id)
        .bind(stage.pipeline_run_id)
        .bind(&stage.stage_name)
        .bind(stage.order_index)
        .bind(stage.status.as_str())
        .bind(&stage.logs)
        .bind(stage.created_at)
        .execute(&mut **tx)
        .await?;

        stages.push(stage);
    }

    Ok(stages)
}

/// Find the stage of a run by name
pub async fn find_by_name(
    pool: &PgPool,
    run_id: Uuid,
    stage_name: &str,
) -> Result<Option<BuildStage>, sqlx::Error> {
    let row = sqlx::query_as::<_, StageRow>(
        r#"
        SELECT id, pipeline_run_id, stage_name, order_index, status, logs,
               started_at, completed_at, created_at
        FROM build_stages
        WHERE pipeline_run_id = $1 AND stage_name = $2
        "#,
    )
    .bind(run_id)
    .bind(stage_name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List the stages of a run in execution order
pub async fn list_by_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<BuildStage>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StageRow>(
        r#"
        SELECT id, pipeline_run_id, stage_name, order_index, status, logs,
               started_at, completed_at, created_at
        FROM build_stages
        WHERE pipeline_run_id = $1
        ORDER BY order_index ASC, stage_name ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Move a pending stage of a running run to running
/// Returns false when the stage was not pending or its run was not running
pub async fn mark_running(
    pool: &PgPool,
    stage_id: Uuid,
    started_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_stages
        SET status = $1, started_at = $2
        WHERE id = $3 AND status = $4
          AND EXISTS (
              SELECT 1 FROM pipeline_runs r
              WHERE r.id = build_stages.pipeline_run_id AND r.status = $5
          )
        "#,
    )
    .bind(StageStatus::Running.as_str())
    .bind(started_at)
    .bind(stage_id)
    .bind(StageStatus::Pending.as_str())
    .bind(RunStatus::Running.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a running stage of a running run to a terminal status, replacing its logs
/// Returns false when the stage was not running or its run was not running
pub async fn mark_finished(
    pool: &PgPool,
    stage_id: Uuid,
    status: StageStatus,
    logs: &[String],
    completed_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_stages
        SET status = $1, logs = $2, completed_at = $3
        WHERE id = $4 AND status = $5
          AND EXISTS (
              SELECT 1 FROM pipeline_runs r
              WHERE r.id = build_stages.pipeline_run_id AND r.status = $6
          )
        "#,
    )
    .bind(status.as_str())
    .bind(logs)
    .bind(completed_at)
    .bind(stage_id)
    .bind(StageStatus::Running.as_str())
    .bind(RunStatus::Running.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail every running stage of the given runs, appending one log line
pub async fn fail_running_for_runs(
    tx: &mut Transaction<'_, Postgres>,
    run_ids: &[Uuid],
    log_line: &str,
) -> Result<u64, sqlx::Error> {
    if run_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        UPDATE build_stages
        SET status = $1, completed_at = $2, logs = array_append(logs, $3)
        WHERE pipeline_run_id = ANY($4) AND status = $5
        "#,
    )
    .bind(StageStatus::Failed.as_str())
    .bind(Utc::now())
    .bind(log_line)
    .bind(run_ids)
    .bind(StageStatus::Running.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

/// Read the current status of a stage, if it exists
pub async fn current_status(
    pool: &PgPool,
    stage_id: Uuid,
) -> Result<Option<StageStatus>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM build_stages WHERE id = $1")
        .bind(stage_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(status,)| string_to_status(&status)))
}

// =============================================================================
// Helper Functions
// =============================================================================

fn string_to_status(s: &str) -> StageStatus {
    match s {
        "pending" => StageStatus::Pending,
        "running" => StageStatus::Running,
        "success" => StageStatus::Success,
        "failed" => StageStatus::Failed,
        _ => StageStatus::Pending,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StageRow {
    id: Uuid,
    pipeline_run_id: Uuid,
    stage_name: String,
    order_index: i32,
    status: String,
    logs: Vec<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<StageRow> for BuildStage {
    fn from(row: StageRow) -> Self {
        BuildStage {
            id: row.id,
            pipeline_run_id: row.pipeline_run_id,
            stage_name: row.stage_name,
            order_index: row.order_index,
            status: string_to_status(&row.status),
            logs: row.logs,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}
