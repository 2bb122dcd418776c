//! Data Transfer Objects for the HTTP boundary
//!
//! This module contains DTOs exchanged between the orchestrator, its trigger
//! sources (webhooks, CLI) and the persistence layer. Field names on the wire
//! are camelCase to match the action and trigger contracts.

pub mod deployment;
pub mod run;
pub mod webhook;
