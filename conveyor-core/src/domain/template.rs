//! Pipeline template and stage registry types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::ActionKind;

/// Template seeded at startup and used when a trigger does not name one
pub const DEFAULT_TEMPLATE_ID: Uuid = Uuid::from_u128(1);

/// A named pipeline template owning an ordered list of stage descriptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Registry entry describing one stage of a template
///
/// The same ordered list drives stage-row creation at trigger time and
/// execution order in the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub stage_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    /// `None` marks an informational stage executed inline by the orchestrator
    pub action: Option<ActionKind>,
    pub order_index: i32,
}

impl StageDescriptor {
    pub fn new(
        stage_name: impl Into<String>,
        display_name: impl Into<String>,
        action: Option<ActionKind>,
        order_index: i32,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            display_name: display_name.into(),
            description: None,
            icon: None,
            action,
            order_index,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// The default template record
pub fn default_template() -> PipelineTemplate {
    PipelineTemplate {
        id: DEFAULT_TEMPLATE_ID,
        name: "Default CI/CD Pipeline".to_string(),
        description: Some("GitHub -> Jenkins -> ECR -> ECS -> CloudWatch".to_string()),
    }
}

/// Stage descriptors of the default template, in execution order
pub fn default_stage_descriptors() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new("github_commit", "GitHub Commit", None, 1)
            .with_description("Source commit received")
            .with_icon("github"),
        StageDescriptor::new("jenkins_build", "Jenkins Build", Some(ActionKind::Build), 2)
            .with_description("Build and test the source")
            .with_icon("hammer"),
        StageDescriptor::new("docker_ecr", "Docker → ECR", Some(ActionKind::ImagePublish), 3)
            .with_description("Build the image and push it to the registry")
            .with_icon("container"),
        StageDescriptor::new("ecs_deploy", "ECS Deploy", Some(ActionKind::Deploy), 4)
            .with_description("Roll the image out to the service")
            .with_icon("cloud"),
        StageDescriptor::new("monitoring", "CloudWatch", Some(ActionKind::Monitor), 5)
            .with_description("Collect health metrics and logs")
            .with_icon("activity"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_id() {
        assert_eq!(
            DEFAULT_TEMPLATE_ID.to_string(),
            "00000000-0000-0000-0000-000000000001"
        );
    }

    #[test]
    fn test_default_stages_are_ordered_and_unique() {
        let stages = default_stage_descriptors();
        assert_eq!(stages.len(), 5);
        assert!(stages.windows(2).all(|w| w[0].order_index < w[1].order_index));

        let names: std::collections::HashSet<_> =
            stages.iter().map(|s| s.stage_name.as_str()).collect();
        assert_eq!(names.len(), 5);
        assert_eq!(stages[0].action, None);
        assert_eq!(stages[2].action, Some(ActionKind::ImagePublish));
    }
}
