//! Template command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use conveyor_client::OrchestratorClient;
use conveyor_core::domain::template::DEFAULT_TEMPLATE_ID;
use uuid::Uuid;

/// Template subcommands
#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Show the resolved stage list of a template
    Stages {
        /// Template ID (defaults to the built-in template)
        id: Option<Uuid>,
    },
}

pub async fn handle_template_command(
    command: TemplateCommands,
    client: &OrchestratorClient,
) -> Result<()> {
    match command {
        TemplateCommands::Stages { id } => {
            let template_id = id.unwrap_or(DEFAULT_TEMPLATE_ID);
            let stages = client.template_stages(template_id).await?;

            println!(
                "{}",
                format!("Template {} ({} stage(s)):", template_id, stages.len()).bold()
            );
            println!();
            for (position, stage) in stages.iter().enumerate() {
                let action = stage
                    .action
                    .map(|kind| kind.function_name().to_string())
                    .unwrap_or_else(|| "inline".to_string());
                println!(
                    "  {}. {} {}",
                    position + 1,
                    stage.display_name.bold(),
                    format!("({})", stage.stage_name).dimmed()
                );
                println!("     Action: {}", action.cyan());
                if let Some(description) = &stage.description {
                    println!("     {}", description.dimmed());
                }
            }
            Ok(())
        }
    }
}
