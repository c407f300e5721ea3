//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

use crate::engine::PassFilters;

/// Keep tasks mirrored between two task services
#[derive(Parser, Debug)]
#[command(name = "tasksync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ./tasksync.yaml)
    #[arg(long, global = true, env = "TASKSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the mapping stores
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mirror high-priority or labelled tasks into one list, completing back
    Sync(PassArgs),

    /// Mirror every project into a list of the same name
    Mirror(PassArgs),

    /// Recreate completed "every! N days" tasks N days after completion
    Recur(PassArgs),

    /// Gather starred items from every list into one list
    Starred(PassArgs),

    /// Show each tool's mapping store
    Status,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Flags shared by every sync command.
#[derive(Args, Debug, Clone, Default)]
pub struct PassArgs {
    /// Plan and log actions without touching either service or the store
    #[arg(long)]
    pub dry_run: bool,

    /// Keep running, one pass per interval
    #[arg(long)]
    pub daemon: bool,

    /// Minutes between daemon passes (overrides interval-minutes)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Act on at most N eligible tasks
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only act on tasks in this project or list
    #[arg(long)]
    pub project: Option<String>,
}

impl PassArgs {
    #[must_use]
    pub fn filters(&self) -> PassFilters {
        PassFilters {
            limit: self.limit,
            project: self.project.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Supported shells for completion generation.
#[derive(ValueEnum, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    #[value(name = "powershell")]
    #[value(alias = "pwsh")]
    /// `PowerShell`
    PowerShell,
    /// Elvish
    Elvish,
}
