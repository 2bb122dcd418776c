//! Observer-side projection of a run
//!
//! A `PipelineView` is derived purely from persisted run and stage records.
//! Observers rebuild it on every poll; it holds no state of its own.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{PipelineRun, RunStatus};
use crate::domain::stage::{BuildStage, StageStatus};

/// Snapshot of a run's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineView {
    pub run_id: Uuid,
    pub run_status: RunStatus,
    pub nodes: Vec<StageNode>,
}

/// One stage as an observer sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageNode {
    pub name: String,
    pub status: StageStatus,
    pub last_log: Option<String>,
    pub log_count: usize,
    pub duration_secs: Option<i64>,
}

impl PipelineView {
    /// Build the view from a run and its stages (any order)
    pub fn project(run: &PipelineRun, stages: &[BuildStage]) -> Self {
        let mut ordered: Vec<&BuildStage> = stages.iter().collect();
        ordered.sort_by_key(|stage| stage.order_index);

        let nodes = ordered
            .into_iter()
            .map(|stage| StageNode {
                name: stage.stage_name.clone(),
                status: stage.status,
                last_log: stage.logs.last().cloned(),
                log_count: stage.logs.len(),
                duration_secs: match (stage.started_at, stage.completed_at) {
                    (Some(started), Some(completed)) => {
                        Some(completed.signed_duration_since(started).num_seconds())
                    }
                    _ => None,
                },
            })
            .collect();

        Self {
            run_id: run.id,
            run_status: run.status,
            nodes,
        }
    }

    /// The stage currently executing, if any
    pub fn active_stage(&self) -> Option<&StageNode> {
        self.nodes
            .iter()
            .find(|node| node.status == StageStatus::Running)
    }

    pub fn failed_stage(&self) -> Option<&StageNode> {
        self.nodes
            .iter()
            .find(|node| node.status == StageStatus::Failed)
    }

    pub fn completed_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.status == StageStatus::Success)
            .count()
    }

    pub fn progress_percent(&self) -> u8 {
        if self.nodes.is_empty() {
            return 0;
        }
        ((self.completed_count() * 100) / self.nodes.len()) as u8
    }

    pub fn is_finished(&self) -> bool {
        self.run_status.is_terminal()
    }

    /// Stage statuses must read: successes, at most one running or failed
    /// stage, then pending stages.
    pub fn is_consistent(&self) -> bool {
        let mut statuses = self.nodes.iter().map(|node| node.status).peekable();

        while statuses.peek() == Some(&StageStatus::Success) {
            statuses.next();
        }
        if matches!(
            statuses.peek(),
            Some(StageStatus::Running) | Some(StageStatus::Failed)
        ) {
            statuses.next();
        }
        statuses.all(|status| status == StageStatus::Pending)
    }
}
