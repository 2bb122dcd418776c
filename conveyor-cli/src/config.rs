//! Configuration module
//!
//! CLI configuration, resolved from flags and the environment.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator service
    pub orchestrator_url: String,
}
