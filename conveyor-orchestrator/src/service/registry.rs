//! Stage Registry
//!
//! Resolves the ordered stage list of a pipeline template from the store.

use std::collections::HashSet;
use std::sync::Arc;

use conveyor_core::domain::template::StageDescriptor;
use uuid::Uuid;

use crate::repository::{RunStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("pipeline template {0} not found")]
    TemplateNotFound(Uuid),

    #[error("pipeline template {0} has no stages configured")]
    EmptyTemplate(Uuid),

    #[error("pipeline template {template_id} configures stage '{stage_name}' more than once")]
    DuplicateStage { template_id: Uuid, stage_name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// Whether the error comes from template configuration rather than storage
    pub fn is_configuration(&self) -> bool {
        !matches!(self, RegistryError::Store(_))
    }
}

#[derive(Clone)]
pub struct StageRegistry {
    store: Arc<dyn RunStore>,
}

impl StageRegistry {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    /// Ordered stages of a template
    ///
    /// Ordered by `order_index`, ties broken by stage name.
    pub async fn resolve_stages(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<StageDescriptor>, RegistryError> {
        if self.store.find_template(template_id).await?.is_none() {
            return Err(RegistryError::TemplateNotFound(template_id));
        }

        let mut stages = self.store.list_stage_descriptors(template_id).await?;
        if stages.is_empty() {
            return Err(RegistryError::EmptyTemplate(template_id));
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.stage_name.as_str()) {
                return Err(RegistryError::DuplicateStage {
                    template_id,
                    stage_name: stage.stage_name.clone(),
                });
            }
        }

        stages.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.stage_name.cmp(&b.stage_name))
        });

        Ok(stages)
    }
}
