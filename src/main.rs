use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskboard::board::Column;
use taskboard::config::BoardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version, about = "Kanban task board with drag-and-drop ordering")]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to taskboard.toml. Defaults to <config dir>/taskboard/taskboard.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file. Overrides [store] path and TASKBOARD_DB
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Owner id for new projects and tasks. Overrides [board] owner_id and TASKBOARD_OWNER
    #[arg(long, global = true)]
    pub owner: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the board database
    Init,
    /// Create, list or delete projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Add, move or delete tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Show or watch a project's board
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ProjectCommands {
    Create {
        name: String,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a project together with all of its tasks
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    Add {
        /// Project to add the task to
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long, default_value = "todo")]
        column: Column,
        title: String,
    },
    /// Drop a task onto a column
    Move {
        task_id: String,
        #[arg(short, long)]
        project: String,
        #[arg(short, long)]
        column: Column,
        /// Pointer position within the column, in pixels from its top
        #[arg(long, allow_negative_numbers = true, conflicts_with = "before")]
        pointer_y: Option<f64>,
        /// Insert before this task instead of resolving a pointer position
        #[arg(long)]
        before: Option<String>,
    },
    /// Delete a task (the burn barrel)
    Delete {
        task_id: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum BoardCommands {
    Show {
        #[arg(short, long)]
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// Print every snapshot of the board as a JSON line until Ctrl-C
    Watch {
        #[arg(short, long)]
        project: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

/// File → environment → CLI flags.
fn resolve_config(cli: &Cli) -> Result<BoardConfig> {
    let mut config = match cli.config.clone().or_else(BoardConfig::default_path) {
        Some(path) => BoardConfig::load_or_default(&path)?,
        None => BoardConfig::default(),
    };
    config.apply_env();
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }
    if let Some(owner) = &cli.owner {
        config.board.owner_id = owner.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    taskboard::logging::init(level, config.logging.mode).context("Failed to initialize logging")?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Project { command } => cmd::cmd_project(&config, command.clone()).await?,
        Commands::Task { command } => cmd::cmd_task(&config, command.clone()).await?,
        Commands::Board { command } => cmd::cmd_board(&config, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&cli, &config, command.clone())?,
    }

    Ok(())
}
