//! Template Repository
//!
//! Read-only access to pipeline templates and their stage configuration.

use conveyor_core::domain::action::ActionKind;
use conveyor_core::domain::template::{PipelineTemplate, StageDescriptor};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PipelineTemplate>, sqlx::Error> {
    let row = sqlx::query_as::<_, TemplateRow>(
        "SELECT id, name, description FROM pipeline_templates WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List the configured stages of a template, unordered
pub async fn list_stages(
    pool: &PgPool,
    template_id: Uuid,
) -> Result<Vec<StageDescriptor>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StageConfigRow>(
        r#"
        SELECT stage_name, display_name, description, icon, function_name, order_index
        FROM pipeline_stages_config
        WHERE template_id = $1
        "#,
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    description: Option<String>,
}

impl From<TemplateRow> for PipelineTemplate {
    fn from(row: TemplateRow) -> Self {
        PipelineTemplate {
            id: row.id,
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StageConfigRow {
    stage_name: String,
    display_name: String,
    description: Option<String>,
    icon: Option<String>,
    function_name: Option<String>,
    order_index: i32,
}

impl From<StageConfigRow> for StageDescriptor {
    fn from(row: StageConfigRow) -> Self {
        // Unknown function names leave the stage without an action
        let action = row
            .function_name
            .as_deref()
            .and_then(ActionKind::from_function_name);

        if action.is_none() && row.function_name.is_some() {
            tracing::warn!(
                "Stage '{}' references unknown function {:?}",
                row.stage_name,
                row.function_name
            );
        }

        StageDescriptor {
            stage_name: row.stage_name,
            display_name: row.display_name,
            description: row.description,
            icon: row.icon,
            action,
            order_index: row.order_index,
        }
    }
}
