use clap::Parser;
use std::io::{self, IsTerminal};
use tasksync::cli::commands;
use tasksync::cli::{Cli, Commands};
use tasksync::config;
use tasksync::logging::init_logging;
use tasksync::policy::Tool;
use tasksync::{StructuredError, SyncError};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let result = run(&cli);

    if let Err(e) = result {
        handle_error(&e, cli.json);
    }
}

fn run(cli: &Cli) -> tasksync::Result<()> {
    let (tool, args) = match &cli.command {
        Commands::Completions(args) => return commands::completions::execute(args),
        Commands::Status => return commands::status::execute(&load_settings(cli, None)?, cli.json),
        Commands::Sync(args) => (Tool::Sync, args),
        Commands::Mirror(args) => (Tool::Mirror, args),
        Commands::Recur(args) => (Tool::Recur, args),
        Commands::Starred(args) => (Tool::Starred, args),
    };
    let settings = load_settings(cli, args.interval)?;
    commands::run::execute(tool, args, &settings, cli.json)
}

fn load_settings(cli: &Cli, interval_minutes: Option<u64>) -> tasksync::Result<config::Settings> {
    let overrides = config::CliOverrides {
        state_dir: cli.state_dir.clone(),
        interval_minutes,
    };
    config::load_settings(cli.config.as_deref(), &overrides)
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &SyncError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}
