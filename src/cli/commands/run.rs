//! The four sync commands: `sync`, `mirror`, `recur`, `starred`.
//!
//! Each pass reopens both service files and the mapping store, so edits
//! made between daemon passes are seen like remote changes would be.

use crate::cli::PassArgs;
use crate::client::LocalService;
use crate::config::Settings;
use crate::engine::{PassResult, ReconciliationEngine};
use crate::error::{OptionExt, Result, ResultExt};
use crate::policy::{SyncPolicy, Tool};
use crate::scheduler::{Mode, Scheduler};
use crate::store::{IdentityStore, PassLock};
use chrono::Duration;
use tracing::{debug, info, warn};

/// Execute a sync command for `tool`.
///
/// # Errors
///
/// Returns configuration errors before any pass, and pass-level errors
/// (unreadable snapshot, locked or corrupt store) in once mode.
pub fn execute(tool: Tool, args: &PassArgs, settings: &Settings, json: bool) -> Result<()> {
    settings.require_for(tool)?;
    let policy = SyncPolicy::for_tool(tool, settings);
    debug!(tool = %tool, variant = policy.variant.name(), "Resolved policy");

    let scheduler = if args.daemon {
        Scheduler::every_minutes(settings.interval_minutes)
    } else {
        Scheduler::new(Mode::Once)
    };

    scheduler.run(
        || run_once(&policy, args, settings),
        |result| print_result(result, json),
    )?;
    Ok(())
}

/// One locked pass against freshly opened services and store.
///
/// # Errors
///
/// Returns any pass-level error.
pub fn run_once(policy: &SyncPolicy, args: &PassArgs, settings: &Settings) -> Result<PassResult> {
    let tool = policy.tool;
    let target_path = settings.target_path.as_deref().ok_or_setting("target.path")?;
    let target = LocalService::open(target_path)
        .with_context(|| format!("opening {}", target_path.display()))?
        .with_id_prefix("g");

    let store_path = settings.store_path(tool);
    let _lock = if args.dry_run {
        None
    } else {
        Some(PassLock::acquire(
            &store_path,
            Duration::minutes(settings.lock_stale_minutes),
        )?)
    };
    let mut store = IdentityStore::load(&store_path)?;
    if store.integrity_repairs() > 0 {
        warn!(
            repairs = store.integrity_repairs(),
            path = %store_path.display(),
            "Repaired duplicate mappings on load"
        );
    }

    info!(tool = %tool, dry_run = args.dry_run, "Starting pass");
    let mut engine = ReconciliationEngine::new(policy, &mut store).with_filters(args.filters());

    if tool.uses_separate_source() {
        let source_path = settings.source_path.as_deref().ok_or_setting("source.path")?;
        let source = LocalService::open(source_path)
            .with_context(|| format!("opening {}", source_path.display()))?
            .with_id_prefix("t");
        engine.run_pass(&source, &target, args.dry_run)
    } else {
        engine.run_pass(&target, &target, args.dry_run)
    }
}

fn print_result(result: &PassResult, json: bool) {
    if json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(error = %err, "Cannot serialize pass result"),
        }
    } else {
        println!("{}", result.summary_line());
    }
}
