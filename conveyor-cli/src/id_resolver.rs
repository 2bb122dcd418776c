//! ID resolver module
//!
//! Resolves run ID prefixes to full UUIDs by listing recent runs, so users
//! can type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use conveyor_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// How many recent runs are searched for a prefix
const RESOLVE_WINDOW: i64 = 500;

/// Resolve a run ID or prefix to a full UUID
///
/// Full UUIDs are returned without contacting the orchestrator.
///
/// # Errors
/// Returns an error if:
/// - No recent run matches the prefix
/// - Multiple runs match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_run_id(client: &OrchestratorClient, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let runs = client
        .list_runs(Some(RESOLVE_WINDOW))
        .await
        .context("Failed to fetch runs for ID resolution")?;

    pick_unique(id_or_prefix, runs.iter().map(|run| run.id))
}

fn pick_unique(id_or_prefix: &IdOrPrefix, ids: impl Iterator<Item = Uuid>) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.filter(|id| id_or_prefix.matches(id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No run found with ID starting with '{}'",
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple runs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}
