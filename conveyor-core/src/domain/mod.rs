//! Core domain types
//!
//! This module contains the core domain structures used across Conveyor services.
//! These types mirror the persisted records and are shared between the
//! orchestrator (which writes them) and observers such as the CLI (which read them).

pub mod action;
pub mod deployment;
pub mod run;
pub mod stage;
pub mod template;
