//! `status`: summarize every tool's mapping store.

use crate::config::Settings;
use crate::error::Result;
use crate::policy::Tool;
use crate::store::{IdentityStore, PassLock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// One tool's store summary.
#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub tool: &'static str,
    pub path: PathBuf,
    pub exists: bool,
    pub mappings: usize,
    pub containers: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub locked: bool,
}

/// Collect the status of every tool's store.
///
/// # Errors
///
/// Returns an error if a store file exists but cannot be read.
pub fn collect(settings: &Settings) -> Result<Vec<StoreStatus>> {
    Tool::ALL
        .iter()
        .map(|&tool| {
            let path = settings.store_path(tool);
            let store = IdentityStore::load(&path)?;
            debug!(tool = %tool, path = %path.display(), "Read store");
            Ok(StoreStatus {
                tool: tool.as_str(),
                exists: path.exists(),
                mappings: store.len(),
                containers: store.containers().count(),
                last_sync: store.last_sync(),
                locked: PassLock::path_for(&path).exists(),
                path,
            })
        })
        .collect()
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if a store is unreadable or output serialization fails.
pub fn execute(settings: &Settings, json: bool) -> Result<()> {
    let statuses = collect(settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("Mapping stores in {}", settings.state_dir.display());
    for status in &statuses {
        let last_sync = status
            .last_sync
            .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M UTC").to_string());
        let lock = if status.locked { " (locked)" } else { "" };
        println!(
            "  {:<8} {:>5} mappings  {:>3} lists  last sync {last_sync}{lock}",
            status.tool, status.mappings, status.containers
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reports_every_tool() {
        let temp = TempDir::new().expect("temp dir");
        let settings = Settings {
            state_dir: temp.path().to_path_buf(),
            ..Settings::default()
        };

        let mut store = IdentityStore::load(&settings.store_path(Tool::Mirror)).expect("load");
        store
            .record_mapping("t1", "g1", "L1", Utc::now())
            .expect("mapping");
        store.set_container_for_group("p1", "L1");
        store.mark_synced(Utc::now());
        store.save().expect("save");

        let statuses = collect(&settings).expect("status");
        assert_eq!(statuses.len(), 4);
        let mirror = statuses.iter().find(|s| s.tool == "mirror").expect("mirror");
        assert!(mirror.exists);
        assert_eq!(mirror.mappings, 1);
        assert_eq!(mirror.containers, 1);
        assert!(mirror.last_sync.is_some());
        assert!(!statuses.iter().find(|s| s.tool == "sync").expect("sync").exists);
    }
}
