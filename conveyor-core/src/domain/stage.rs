//! Build stage domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-run record of one pipeline stage
///
/// Created in `Pending` by the trigger path, then driven forward by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStage {
    pub id: Uuid,
    pub pipeline_run_id: Uuid,
    /// Unique within a run
    pub stage_name: String,
    pub order_index: i32,
    pub status: StageStatus,
    /// Replaced wholesale on each update
    pub logs: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Failed)
    }

    /// Statuses only move forward: pending -> running -> success | failed
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Running)
                | (StageStatus::Running, StageStatus::Success)
                | (StageStatus::Running, StageStatus::Failed)
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(StageStatus::Pending.can_transition_to(StageStatus::Running));
        assert!(StageStatus::Running.can_transition_to(StageStatus::Success));
        assert!(StageStatus::Running.can_transition_to(StageStatus::Failed));
    }

    #[test]
    fn test_terminal_stages_never_revisited() {
        for terminal in [StageStatus::Success, StageStatus::Failed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(StageStatus::Pending));
            assert!(!terminal.can_transition_to(StageStatus::Running));
        }
    }

    #[test]
    fn test_pending_cannot_skip_running() {
        assert!(!StageStatus::Pending.can_transition_to(StageStatus::Success));
        assert!(!StageStatus::Pending.can_transition_to(StageStatus::Failed));
        assert!(!StageStatus::Running.can_transition_to(StageStatus::Running));
    }
}
