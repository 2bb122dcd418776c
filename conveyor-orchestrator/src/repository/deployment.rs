//! Deployment Repository

use chrono::{DateTime, Utc};
use conveyor_core::domain::deployment::{Deployment, DeploymentStatus, image_tag_from_uri};
use conveyor_core::dto::deployment::NewDeployment;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Insert a deployment record
///
/// The unique constraint on `pipeline_run_id` rejects a second record for
/// the same run.
pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    req: NewDeployment,
) -> Result<Deployment, sqlx::Error> {
    let deployment = Deployment {
        id: Uuid::new_v4(),
        pipeline_run_id: req.pipeline_run_id,
        image_tag: image_tag_from_uri(&req.image_uri),
        image_uri: Some(req.image_uri),
        service_name: req.service_name,
        status: DeploymentStatus::Deployed,
        deployed_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO deployments (
            id, pipeline_run_id, image_tag, image_uri, ecs_service, status, deployed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(deployment.id)
    .bind(deployment.pipeline_run_id)
    .bind(&deployment.image_tag)
    .bind(&deployment.image_uri)
    .bind(&deployment.service_name)
    .bind(deployment.status.as_str())
    .bind(deployment.deployed_at)
    .execute(&mut **tx)
    .await?;

    Ok(deployment)
}

pub async fn find_by_run(pool: &PgPool, run_id: Uuid) -> Result<Option<Deployment>, sqlx::Error> {
    let row = sqlx::query_as::<_, DeploymentRow>(
        r#"
        SELECT id, pipeline_run_id, image_tag, image_uri, ecs_service, deployed_at
        FROM deployments
        WHERE pipeline_run_id = $1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List the most recent deployments
pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(
        r#"
        SELECT id, pipeline_run_id, image_tag, image_uri, ecs_service, deployed_at
        FROM deployments
        ORDER BY deployed_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    pipeline_run_id: Uuid,
    image_tag: String,
    image_uri: Option<String>,
    ecs_service: Option<String>,
    deployed_at: DateTime<Utc>,
}

impl From<DeploymentRow> for Deployment {
    fn from(row: DeploymentRow) -> Self {
        Deployment {
            id: row.id,
            pipeline_run_id: row.pipeline_run_id,
            image_tag: row.image_tag,
            image_uri: row.image_uri,
            service_name: row.ecs_service,
            // Only deployed records are ever written
            status: DeploymentStatus::Deployed,
            deployed_at: row.deployed_at,
        }
    }
}
