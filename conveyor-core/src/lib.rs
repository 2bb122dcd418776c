//! Conveyor Core
//!
//! Core types and abstractions for the Conveyor CI/CD pipeline.
//!
//! This crate contains:
//! - Domain types: Core business entities (PipelineRun, BuildStage, Deployment, etc.)
//! - DTOs: Data transfer objects for the HTTP boundary
//! - View: Observer-side projection of a run's state

pub mod domain;
pub mod dto;
pub mod view;
