//! Deployment command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use conveyor_client::OrchestratorClient;

/// Deployment subcommands
#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// List recent deployments
    List {
        /// Maximum number of deployments to show
        #[arg(short, long)]
        limit: Option<i64>,
    },
}

pub async fn handle_deployment_command(
    command: DeploymentCommands,
    client: &OrchestratorClient,
) -> Result<()> {
    match command {
        DeploymentCommands::List { limit } => {
            let deployments = client.list_deployments(limit).await?;

            if deployments.is_empty() {
                println!("{}", "No deployments found.".yellow());
                return Ok(());
            }

            println!(
                "{}",
                format!("Found {} deployment(s):", deployments.len()).bold()
            );
            println!();
            for deployment in deployments {
                println!(
                    "  {} {} {}",
                    "▸".cyan(),
                    deployment.image_tag.bold(),
                    deployment
                        .deployed_at
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                        .dimmed()
                );
                println!(
                    "    Run:     {}",
                    deployment.pipeline_run_id.to_string().dimmed()
                );
                if let Some(image_uri) = &deployment.image_uri {
                    println!("    Image:   {}", image_uri);
                }
                if let Some(service) = &deployment.service_name {
                    println!("    Service: {}", service);
                }
                println!();
            }
            Ok(())
        }
    }
}
