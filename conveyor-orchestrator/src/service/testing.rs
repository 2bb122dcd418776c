//! Shared fixtures for service and API tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conveyor_core::domain::action::{ActionKind, ActionOutcome, StageAction};
use conveyor_core::domain::run::TriggerOrigin;
use conveyor_core::domain::template::DEFAULT_TEMPLATE_ID;
use conveyor_core::dto::run::NewPipelineRun;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::repository::{InMemoryRunStore, RunStore};
use crate::service::action::{ActionBackend, ActionError, NO_ACTION_MESSAGE};
use crate::service::orchestrator::OrchestratorSettings;

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        stage_delay: Duration::ZERO,
        stage_timeout: Duration::from_millis(200),
        service_name: Some("app".to_string()),
    }
}

pub async fn create_run(store: &InMemoryRunStore, template_id: Uuid) -> Uuid {
    let descriptors = store.list_stage_descriptors(template_id).await.unwrap();
    let (run, _) = store
        .create_run(
            NewPipelineRun {
                repository: "acme/app".to_string(),
                commit_sha: Some("abc123".to_string()),
                commit_message: Some("Add feature".to_string()),
                triggered_by: TriggerOrigin::Manual,
                template_id,
            },
            &descriptors,
        )
        .await
        .unwrap();
    run.id
}

pub async fn create_default_run(store: &InMemoryRunStore) -> Uuid {
    create_run(store, DEFAULT_TEMPLATE_ID).await
}

enum Script {
    Outcome(ActionOutcome),
    Hang,
    TransportError,
}

/// Action backend answering from a per-kind script
pub struct ScriptedBackend {
    scripts: HashMap<ActionKind, Script>,
    calls: Arc<Mutex<Vec<StageAction>>>,
}

impl ScriptedBackend {
    /// Every action succeeds; image publishing yields `image_uri`
    pub fn succeeding(image_uri: &str) -> Self {
        let mut scripts = HashMap::new();
        for kind in ActionKind::ALL {
            let outcome = ActionOutcome::succeeded(
                format!("{} ok", kind),
                vec![format!("{} done", kind)],
            );
            let outcome = if kind == ActionKind::ImagePublish {
                outcome.with_image_uri(image_uri)
            } else {
                outcome
            };
            scripts.insert(kind, Script::Outcome(outcome));
        }

        Self {
            scripts,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_outcome(mut self, kind: ActionKind, outcome: ActionOutcome) -> Self {
        self.scripts.insert(kind, Script::Outcome(outcome));
        self
    }

    /// The action never answers
    pub fn hanging(mut self, kind: ActionKind) -> Self {
        self.scripts.insert(kind, Script::Hang);
        self
    }

    pub fn transport_error(mut self, kind: ActionKind) -> Self {
        self.scripts.insert(kind, Script::TransportError);
        self
    }

    /// Actions received so far, in order
    pub fn calls(&self) -> Arc<Mutex<Vec<StageAction>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl ActionBackend for ScriptedBackend {
    async fn execute(&self, action: &StageAction) -> Result<ActionOutcome, ActionError> {
        self.calls.lock().unwrap().push(action.clone());

        let Some(kind) = action.kind() else {
            return Ok(ActionOutcome::failed(NO_ACTION_MESSAGE));
        };

        match self.scripts.get(&kind) {
            Some(Script::Outcome(outcome)) => Ok(outcome.clone()),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ActionOutcome::failed("hung action answered"))
            }
            Some(Script::TransportError) | None => Err(ActionError::InvalidResponse {
                function: kind.function_name().to_string(),
                status: 502,
            }),
        }
    }
}

/// Compute the `x-hub-signature-256` value for a body, as GitHub does
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
