use conveyor_core::domain::template::{default_stage_descriptors, default_template};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create templates table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_templates (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create stage registry table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_stages_config (
            id UUID PRIMARY KEY,
            template_id UUID NOT NULL REFERENCES pipeline_templates(id) ON DELETE CASCADE,
            stage_name VARCHAR(255) NOT NULL,
            display_name VARCHAR(255) NOT NULL,
            description TEXT,
            icon VARCHAR(100),
            function_name VARCHAR(100),
            order_index INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (template_id, stage_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create runs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id UUID PRIMARY KEY,
            github_repo VARCHAR(255) NOT NULL,
            commit_sha VARCHAR(255),
            commit_message TEXT,
            status VARCHAR(20) NOT NULL,
            triggered_by VARCHAR(20) NOT NULL,
            template_id UUID NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ,
            heartbeat_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create stages table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_stages (
            id UUID PRIMARY KEY,
            pipeline_run_id UUID NOT NULL REFERENCES pipeline_runs(id) ON DELETE CASCADE,
            stage_name VARCHAR(255) NOT NULL,
            order_index INTEGER NOT NULL,
            status VARCHAR(20) NOT NULL,
            logs TEXT[] NOT NULL DEFAULT '{}',
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            UNIQUE (pipeline_run_id, stage_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create deployments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id UUID PRIMARY KEY,
            pipeline_run_id UUID NOT NULL UNIQUE REFERENCES pipeline_runs(id) ON DELETE CASCADE,
            image_tag VARCHAR(255) NOT NULL,
            image_uri TEXT,
            ecs_service VARCHAR(255),
            status VARCHAR(20) NOT NULL,
            deployed_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_status ON pipeline_runs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_started_at ON pipeline_runs(started_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_stages_run ON build_stages(pipeline_run_id, order_index)",
    )
    .execute(pool)
    .await?;

    seed_default_template(pool).await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Insert the default template and its stages if they are missing
async fn seed_default_template(pool: &PgPool) -> Result<(), sqlx::Error> {
    let template = default_template();

    sqlx::query(
        r#"
        INSERT INTO pipeline_templates (id, name, description)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(template.id)
    .bind(&template.name)
    .bind(&template.description)
    .execute(pool)
    .await?;

    for stage in default_stage_descriptors() {
        sqlx::query(
            r#"
            INSERT INTO pipeline_stages_config (
                id, template_id, stage_name, display_name, description,
                icon, function_name, order_index
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (template_id, stage_name) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(template.id)
        .bind(&stage.stage_name)
        .bind(&stage.display_name)
        .bind(&stage.description)
        .bind(&stage.icon)
        .bind(stage.action.map(|kind| kind.function_name()))
        .bind(stage.order_index)
        .execute(pool)
        .await?;
    }

    Ok(())
}
