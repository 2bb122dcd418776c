//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deployment;
mod run;
mod template;

pub use deployment::DeploymentCommands;
pub use run::RunCommands;
pub use template::TemplateCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use conveyor_client::OrchestratorClient;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Pipeline templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Deployment history
    Deployment {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
    /// Check that the orchestrator is reachable
    Health,
}

/// Route a command to its handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        Commands::Run { command } => run::handle_run_command(command, &client).await,
        Commands::Template { command } => {
            template::handle_template_command(command, &client).await
        }
        Commands::Deployment { command } => {
            deployment::handle_deployment_command(command, &client).await
        }
        Commands::Health => health(&client).await,
    }
}

async fn health(client: &OrchestratorClient) -> Result<()> {
    let health = client.health().await?;

    println!(
        "{} {} {} at {}",
        "✓".green(),
        health.service.bold(),
        health.version.dimmed(),
        client.base_url()
    );
    println!("  Status: {}", health.status.green());

    Ok(())
}
