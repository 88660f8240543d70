mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use events::{EventKind, ProgressEvent};
use orchestrator::{
    parse_plan, FilePlanStore, OrchestratorError, PlanStore, RunnerDeps, ScriptedChatModel,
    WorkflowRunner,
};
use taskflow_core::TaskStatus;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Loaded, TaskflowConfig, CONFIG_FILE, TASKFLOW_DIR};

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(about = "Run task-driven agent workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and the plans directory
    Init,
    /// Run one workflow with a scripted model
    Run {
        #[arg(short, long)]
        session: String,

        #[arg(short, long)]
        query: String,

        /// JSON array of model replies
        #[arg(long)]
        script: PathBuf,
    },
    /// Inspect stored plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Print the latest plan version
    Show {
        #[arg(short, long)]
        session: String,
    },
    /// List every stored plan version
    History {
        #[arg(short, long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    if let Commands::Init = cli.command {
        return init_project(&cwd).await;
    }

    let config = load_config(&cwd).await;
    let plans = FilePlanStore::new(config::plans_dir(&cwd, &config));

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Run {
            session,
            query,
            script,
        } => run(&config, plans, &session, &query, &script).await,
        Commands::Plan { command } => match command {
            PlanCommands::Show { session } => show_plan(&plans, &session).await,
            PlanCommands::History { session } => plan_history(&plans, &session).await,
        },
    }
}

/// Read the config and install tracing at its log level.
async fn load_config(root: &Path) -> TaskflowConfig {
    let loaded = config::load(root).await;
    let level = match &loaded {
        Loaded::Found(config) => config.logging.level.clone(),
        _ => TaskflowConfig::default().logging.level,
    };
    init_tracing(&level);

    match &loaded {
        Loaded::Found(_) => {}
        Loaded::Missing => tracing::debug!("No config file found, using defaults"),
        Loaded::Invalid(reason) => {
            tracing::warn!(reason = %reason, "Ignoring unusable config file, using defaults")
        }
    }
    loaded.into_config()
}

async fn init_project(root: &Path) -> Result<()> {
    let taskflow_dir = root.join(TASKFLOW_DIR);
    let config_path = config::config_path(root);

    if config_path.exists() {
        println!("Project already initialized at {}", taskflow_dir.display());
        return Ok(());
    }

    let config = TaskflowConfig::default();
    let plans_dir = config::plans_dir(root, &config);
    tokio::fs::create_dir_all(&plans_dir)
        .await
        .with_context(|| format!("Failed to create {}", plans_dir.display()))?;

    let content = toml::to_string_pretty(&config)?;
    tokio::fs::write(&config_path, content)
        .await
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!();
    println!("Initialized taskflow in {}", root.display());
    println!();
    println!("Created:");
    println!("  {}/", TASKFLOW_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  └── plans/");
    println!();
    println!("Next: taskflow run --session demo --query \"...\" --script replies.json");

    Ok(())
}

async fn run(
    config: &TaskflowConfig,
    plans: FilePlanStore,
    session: &str,
    query: &str,
    script: &Path,
) -> Result<()> {
    let model = ScriptedChatModel::from_file(script)
        .await
        .with_context(|| format!("Failed to load script {}", script.display()))?;
    plans
        .ensure_directory()
        .await
        .context("Failed to prepare plans directory")?;

    let deps = RunnerDeps::new(Arc::new(model)).with_plan_store(Arc::new(plans));
    let runner = WorkflowRunner::new(deps, config.runner.clone());

    let mut handle = runner.start_run(session, query, Vec::new())?;
    tracing::info!(session_id = %session, run_id = %handle.run_id(), "Started run");

    while let Some(event) = handle.next_event().await {
        print_event(&event);
    }

    let Some(report) = handle.report().await else {
        bail!("Run task ended without a report");
    };

    println!();
    if let Some(answer) = &report.answer {
        println!("{}", answer);
        println!();
    }
    if !report.final_plan.is_empty() {
        println!("{}", report.final_plan.to_markdown());
        println!();
    }
    println!(
        "{} steps, {} dropped events",
        report.steps, report.dropped_events
    );

    match report.error {
        Some(error) => bail!("Run failed in {}: {}", report.final_state, error),
        None => Ok(()),
    }
}

fn print_event(event: &ProgressEvent) {
    let kind = match event.kind {
        EventKind::Start => "start".cyan(),
        EventKind::Complete => "complete".green(),
        EventKind::ResultChunk => "chunk".blue(),
        EventKind::Done => "done".green().bold(),
        EventKind::Error => "error".red().bold(),
    };

    match &event.error {
        Some(error) => println!("{:>4} {:<9} {:<13} {}", event.sequence, kind, event.label, error),
        None => println!(
            "{:>4} {:<9} {:<13} {}",
            event.sequence, kind, event.label, event.message
        ),
    }
}

async fn show_plan(plans: &FilePlanStore, session: &str) -> Result<()> {
    match plans.get_latest(session).await {
        Ok(version) => {
            println!("Plan for {} (version {})", session, version.version);
            println!();
            println!("{}", version.content);
            Ok(())
        }
        Err(OrchestratorError::PlanNotFound(_)) => {
            println!("No plan stored for session {}", session);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn plan_history(plans: &FilePlanStore, session: &str) -> Result<()> {
    let versions = plans.history(session).await?;
    if versions.is_empty() {
        println!("No plan stored for session {}", session);
        return Ok(());
    }

    println!();
    println!("Plan history for {} ({} versions):", session, versions.len());
    for version in &versions {
        let progress = match parse_plan(&version.content) {
            Ok(plan) => format!(
                "{}/{} done, {} failed",
                plan.count(TaskStatus::Completed),
                plan.len(),
                plan.count(TaskStatus::Failed)
            ),
            Err(_) => "unparseable".to_string(),
        };
        println!(
            "  v{:<3} {}  {}",
            version.version,
            version.written_at.to_rfc3339(),
            progress
        );
    }
    println!();

    Ok(())
}

fn init_tracing(level: &str) {
    let default_filter = format!("taskflow={level},orchestrator={level},events={level}");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
