//! GitHub webhook payloads
//!
//! Only the fields of a `push` event the trigger path needs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubPushEvent {
    pub repository: GithubRepository,
    #[serde(default)]
    pub commits: Vec<GithubCommit>,
    #[serde(default)]
    pub pusher: Option<GithubPusher>,
}

impl GithubPushEvent {
    /// The commit a push event builds: the last one listed
    pub fn latest_commit(&self) -> Option<&GithubCommit> {
        self.commits.last()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubRepository {
    pub full_name: String,
    pub clone_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubCommit {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubPusher {
    pub name: String,
}

/// Response for events other than `push`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoredEvent {
    pub message: String,
    pub event: Option<String>,
}
