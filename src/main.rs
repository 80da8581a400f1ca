use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

use phasegate::errors::{ErrorStage, GateError};

/// Exit code for an evaluation whose gate verdict does not allow proceeding.
const EXIT_GATE_BLOCKED: i32 = 2;

/// Exit code for failures that carry no gate stage.
const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "phasegate")]
#[command(version, about = "Phase quality gate for directives")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Executor command. Overrides PHASEGATE_EXECUTOR_CMD and phasegate.toml.
    #[arg(long, global = true)]
    pub executor: Option<String>,

    /// Database path. Overrides PHASEGATE_DB and phasegate.toml.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Run capabilities concurrently
    #[arg(long, global = true, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Run capabilities one at a time
    #[arg(long, global = true)]
    pub sequential: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn parallel_override(&self) -> Option<bool> {
        match (self.parallel, self.sequential) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new phasegate project
    Init,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Import or inspect directives
    Directive {
        #[command(subcommand)]
        command: DirectiveCommands,
    },
    /// Import or list historical issue patterns
    Patterns {
        #[command(subcommand)]
        command: PatternsCommands,
    },
    /// Score free text against every capability's keyword profile
    Score {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        json: bool,
    },
    /// Show which capabilities a directive requires for a phase
    Requirements {
        /// Directive uuid, id, legacy id or key
        id: String,
        #[arg(short, long)]
        phase: String,
        #[arg(long)]
        json: bool,
    },
    /// Run the quality gate for a directive and phase
    Evaluate {
        /// Directive uuid, id, legacy id or key
        id: String,
        #[arg(short, long)]
        phase: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List stored execution results for a directive
    History {
        /// Directive uuid, id, legacy id or key
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default phasegate.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum DirectiveCommands {
    /// Import directives from a JSON file (one object or an array)
    Import { file: PathBuf },
    /// Show a stored directive
    Show {
        /// Directive uuid, id, legacy id or key
        id: String,
    },
    /// List stored directives
    List,
}

#[derive(Subcommand, Clone)]
pub enum PatternsCommands {
    /// Import issue patterns from a JSON file (one object or an array)
    Import { file: PathBuf },
    /// List stored issue patterns
    List,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_env("PHASEGATE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if cli.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// The gate stage of the first [`GateError`] in an error chain, if any.
fn error_stage(err: &anyhow::Error) -> Option<ErrorStage> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<GateError>())
        .map(GateError::stage)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(err) = run(&cli).await {
        match error_stage(&err) {
            Some(stage) => {
                eprintln!("Error [{}]: {:#}", stage, err);
                std::process::exit(stage.exit_code());
            }
            None => {
                eprintln!("Error: {:#}", err);
                std::process::exit(EXIT_FAILURE);
            }
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Directive { command } => {
            let config = cmd::load_config(cli, &project_dir)?;
            cmd::cmd_directive(&config, command.clone()).await?
        }
        Commands::Patterns { command } => {
            let config = cmd::load_config(cli, &project_dir)?;
            cmd::cmd_patterns(&config, command.clone()).await?
        }
        Commands::Score {
            title,
            description,
            json,
        } => {
            let config = cmd::load_config(cli, &project_dir)?;
            cmd::cmd_score(&config, title, description, *json).await?
        }
        Commands::Requirements { id, phase, json } => {
            let config = cmd::load_config(cli, &project_dir)?;
            cmd::cmd_requirements(&config, id, phase, *json).await?
        }
        Commands::Evaluate {
            id,
            phase,
            session,
            json,
        } => {
            let config = cmd::load_config(cli, &project_dir)?;
            let can_proceed =
                cmd::cmd_evaluate(&config, id, phase, session.as_deref(), *json).await?;
            if !can_proceed {
                std::process::exit(EXIT_GATE_BLOCKED);
            }
        }
        Commands::History { id, json } => {
            let config = cmd::load_config(cli, &project_dir)?;
            cmd::cmd_history(&config, id, *json).await?
        }
    }

    Ok(())
}
