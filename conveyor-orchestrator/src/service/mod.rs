//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between the run store, the stage registry and the
//! action backends.

pub mod action;
pub mod dispatcher;
pub mod orchestrator;
pub mod registry;
pub mod trigger;
pub mod watchdog;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

// Re-export for convenience
pub use dispatcher::{RetryPolicy, RunDispatcher, RunJob, RunQueue};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use registry::StageRegistry;
pub use trigger::TriggerService;
pub use watchdog::Watchdog;
