//! Remote action backend
//!
//! Invokes action endpoints over HTTP: `POST <base>/actions/<function-name>`
//! with the camelCase action input as the body.

use async_trait::async_trait;
use conveyor_core::domain::action::{ActionOutcome, StageAction};
use reqwest::Client;
use tracing::debug;

use super::{ActionBackend, ActionError, NO_ACTION_MESSAGE};

pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ActionBackend for HttpBackend {
    async fn execute(&self, action: &StageAction) -> Result<ActionOutcome, ActionError> {
        let Some(kind) = action.kind() else {
            return Ok(ActionOutcome::failed(NO_ACTION_MESSAGE));
        };

        let function = kind.function_name();
        let url = format!("{}/actions/{}", self.base_url, function);
        debug!("Invoking action {} at {}", function, url);

        let payload = action.payload()?;
        let mut request = self.client.post(&url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        // Failed actions still answer with an outcome body
        let body = response.bytes().await?;
        serde_json::from_slice::<ActionOutcome>(&body).map_err(|_| ActionError::InvalidResponse {
            function: function.to_string(),
            status: status.as_u16(),
        })
    }
}
