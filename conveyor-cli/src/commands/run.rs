//! Run command handlers
//!
//! Starting runs, listing them, and following a run stage by stage.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use conveyor_client::OrchestratorClient;
use conveyor_core::domain::run::{PipelineRun, RunStatus};
use conveyor_core::domain::stage::{BuildStage, StageStatus};
use conveyor_core::dto::run::{LaunchRun, RunDetails};
use conveyor_core::view::{PipelineView, StageNode};
use uuid::Uuid;

use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Create a run and queue it
    Launch {
        /// Repository reference (e.g. acme/app)
        repository: String,

        /// Clone URL handed to the build stage
        #[arg(short, long)]
        source: Option<String>,

        #[arg(long)]
        commit: Option<String>,

        #[arg(short, long)]
        message: Option<String>,

        /// Template to build the run from
        #[arg(short, long)]
        template: Option<Uuid>,

        /// Follow the run until it finishes
        #[arg(short, long)]
        watch: bool,
    },
    /// Execute an existing run and wait for the outcome
    Execute {
        /// Run ID or unambiguous prefix
        id: String,

        /// Source reference handed to the build stage
        #[arg(short, long)]
        source: String,
    },
    /// List recent runs
    List {
        #[arg(short, long)]
        limit: Option<i64>,
    },
    /// Show a run with its stages and deployment
    Get {
        /// Run ID or unambiguous prefix
        id: String,

        /// Print every log line of every stage
        #[arg(short, long)]
        logs: bool,

        /// Print the raw JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Follow a run until it finishes
    Watch {
        /// Run ID or unambiguous prefix
        id: String,

        /// Poll interval in seconds
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },
}

pub async fn handle_run_command(command: RunCommands, client: &OrchestratorClient) -> Result<()> {
    match command {
        RunCommands::Launch {
            repository,
            source,
            commit,
            message,
            template,
            watch,
        } => {
            let launched = client
                .launch_run(LaunchRun {
                    repository,
                    source_reference: source,
                    commit_sha: commit,
                    commit_message: message,
                    template_id: template,
                })
                .await?;

            println!("{} {}", "✓".green(), launched.message);
            println!("  Run ID: {}", launched.run_id.to_string().cyan());

            if watch {
                println!();
                watch_run(client, launched.run_id, Duration::from_secs(2)).await?;
            }
            Ok(())
        }
        RunCommands::Execute { id, source } => {
            let run_id = resolve_run_id(client, &IdOrPrefix::parse(&id)).await?;
            let outcome = client.execute_run(run_id, &source).await?;

            if outcome.success {
                println!("{} {}", "✓".green(), outcome.message);
                Ok(())
            } else {
                println!("{} {}", "✗".red(), outcome.message);
                bail!("run {} failed", run_id)
            }
        }
        RunCommands::List { limit } => list_runs(client, limit).await,
        RunCommands::Get { id, logs, json } => {
            let run_id = resolve_run_id(client, &IdOrPrefix::parse(&id)).await?;
            let details = client.get_run(run_id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                print_run_details(&details, logs);
            }
            Ok(())
        }
        RunCommands::Watch { id, interval } => {
            let run_id = resolve_run_id(client, &IdOrPrefix::parse(&id)).await?;
            watch_run(client, run_id, Duration::from_secs(interval.max(1))).await
        }
    }
}

async fn list_runs(client: &OrchestratorClient, limit: Option<i64>) -> Result<()> {
    let runs = client.list_runs(limit).await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in runs {
            print_run_summary(&run);
        }
    }

    Ok(())
}

/// Poll the run and print each stage transition as it is observed
async fn watch_run(client: &OrchestratorClient, run_id: Uuid, interval: Duration) -> Result<()> {
    let mut seen: HashMap<String, StageStatus> = HashMap::new();

    println!("{}", format!("Watching run {}", run_id).bold());

    loop {
        let details = client.get_run(run_id).await?;
        let view = PipelineView::project(&details.run, &details.stages);

        for node in &view.nodes {
            if seen.get(&node.name) != Some(&node.status) {
                seen.insert(node.name.clone(), node.status);
                if node.status != StageStatus::Pending {
                    print_stage_transition(node);
                }
            }
        }

        if view.is_finished() {
            println!();
            println!(
                "Run {} ({}/{} stages, {}%)",
                colorize_run_status(view.run_status),
                view.completed_count(),
                view.nodes.len(),
                view.progress_percent()
            );
            if let Some(failed) = view.failed_stage() {
                println!("  Failed stage: {}", failed.name.red());
            }
            if let Some(deployment) = &details.deployment {
                println!("  Deployed:     {}", deployment.image_tag.green());
            }
            return match view.run_status {
                RunStatus::Success => Ok(()),
                _ => bail!("run {} did not succeed", run_id),
            };
        }

        tokio::time::sleep(interval).await;
    }
}

fn print_stage_transition(node: &StageNode) {
    let duration = node
        .duration_secs
        .map(|secs| format!(" in {}s", secs))
        .unwrap_or_default();

    println!(
        "  {} {}{}",
        colorize_stage_status(node.status),
        node.name.bold(),
        duration.dimmed()
    );
    if let Some(line) = &node.last_log {
        println!("      {}", line.dimmed());
    }
}

fn print_run_summary(run: &PipelineRun) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Repository: {}", run.repository);
    println!("    Status:     {}", colorize_run_status(run.status));
    println!("    Trigger:    {}", run.triggered_by);
    println!(
        "    Started:    {}",
        run.started_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_run_details(details: &RunDetails, all_logs: bool) {
    let run = &details.run;

    println!("{}", "Run Details:".bold());
    println!("  ID:         {}", run.id.to_string().cyan());
    println!("  Repository: {}", run.repository);
    println!("  Status:     {}", colorize_run_status(run.status));
    println!("  Trigger:    {}", run.triggered_by);
    println!("  Template:   {}", run.template_id.to_string().dimmed());
    if let Some(sha) = &run.commit_sha {
        println!("  Commit:     {}", sha);
    }
    if let Some(message) = &run.commit_message {
        println!("  Message:    {}", message);
    }
    println!(
        "  Started:    {}",
        run.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(completed) = run.completed_at {
        println!("  Completed:  {}", completed.format("%Y-%m-%d %H:%M:%S"));
        let duration = completed.signed_duration_since(run.started_at);
        println!("  Duration:   {}s", duration.num_seconds());
    }

    println!("\n{}", "Stages:".bold());
    let mut stages: Vec<&BuildStage> = details.stages.iter().collect();
    stages.sort_by_key(|stage| stage.order_index);
    for stage in stages {
        println!(
            "  {} {}",
            colorize_stage_status(stage.status),
            stage.stage_name.bold()
        );
        let lines: &[String] = if all_logs {
            &stage.logs
        } else {
            stage.logs.last().map(std::slice::from_ref).unwrap_or(&[])
        };
        for line in lines {
            let line = if line.starts_with("Error:") {
                line.red()
            } else {
                line.dimmed()
            };
            println!("      {}", line);
        }
    }

    if let Some(deployment) = &details.deployment {
        println!("\n{}", "Deployment:".bold());
        println!("  Tag:     {}", deployment.image_tag.green());
        if let Some(image_uri) = &deployment.image_uri {
            println!("  Image:   {}", image_uri);
        }
        if let Some(service) = &deployment.service_name {
            println!("  Service: {}", service);
        }
    }
}

fn colorize_run_status(status: RunStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        RunStatus::Pending => label.yellow(),
        RunStatus::Running => label.cyan(),
        RunStatus::Success => label.green(),
        RunStatus::Failed => label.red(),
    }
}

fn colorize_stage_status(status: StageStatus) -> ColoredString {
    match status {
        StageStatus::Pending => "○".dimmed(),
        StageStatus::Running => "●".cyan(),
        StageStatus::Success => "✓".green(),
        StageStatus::Failed => "✗".red(),
    }
}
