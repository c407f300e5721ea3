//! Identity store: the persisted source/target mapping for one tool.
//!
//! The store is the only state carried between passes. It is read whole
//! at pass start and written whole at pass end; nothing is persisted
//! mid-pass. Layout on disk:
//!
//! ```json
//! {
//!   "source_to_target": {"t1": "g1"},
//!   "target_to_source": {"g1": "t1"},
//!   "entries": {"t1": {"container_id": "L1", "created_at": "..."}},
//!   "group_to_container": {"p1": "L1"},
//!   "last_sync": "2025-01-15T08:00:00Z"
//! }
//! ```
//!
//! Files written by the older per-tool scripts (`todoist_to_gtasks`,
//! `original_to_trmnl`, `project_to_list`, ...) are accepted on load.

mod lock;

pub use lock::PassLock;

use crate::error::{Result, SyncError};
use crate::model::Mapping;
use crate::util::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Build the mapping-store path for a tool inside the state directory.
#[must_use]
pub fn store_path(state_dir: &Path, tool: &str) -> PathBuf {
    state_dir.join(format!("{tool}-mappings.json"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EntryMeta {
    #[serde(default)]
    container_id: String,
    #[serde(default)]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default, alias = "todoist_to_gtasks", alias = "original_to_trmnl")]
    source_to_target: BTreeMap<String, String>,
    #[serde(default, alias = "gtasks_to_todoist", alias = "trmnl_to_original")]
    target_to_source: BTreeMap<String, String>,
    #[serde(default)]
    entries: BTreeMap<String, EntryMeta>,
    #[serde(default, alias = "project_to_list")]
    group_to_container: BTreeMap<String, String>,
    #[serde(default)]
    last_sync: Option<DateTime<Utc>>,
}

/// Bidirectional source/target mapping plus the group-to-container map.
///
/// Every live source id and every live target id appears in at most one
/// mapping. Writes that would break this evict the older entry.
#[derive(Debug, Default)]
pub struct IdentityStore {
    path: Option<PathBuf>,
    by_source: BTreeMap<String, Mapping>,
    by_target: BTreeMap<String, String>,
    group_to_container: BTreeMap<String, String>,
    last_sync: Option<DateTime<Utc>>,
    repairs: usize,
}

impl IdentityStore {
    /// Create an empty store that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load a store from `path`. A missing file is an empty store.
    ///
    /// Duplicate identifiers found on load are repaired: the most recently
    /// created mapping wins and each eviction is logged.
    ///
    /// # Errors
    ///
    /// Returns `StoreCorrupt` if the file exists but is not a valid store,
    /// or an I/O error if it cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        if !path.exists() {
            debug!(path = %path.display(), "No mapping store yet; starting empty");
            return Ok(store);
        }

        let contents = fs::read_to_string(path)?;
        let file: StoreFile =
            serde_json::from_str(&contents).map_err(|err| SyncError::StoreCorrupt {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;

        store.last_sync = file.last_sync;
        store.group_to_container = file.group_to_container;

        let mut candidates: Vec<Mapping> = file
            .source_to_target
            .into_iter()
            .map(|(source_id, target_id)| {
                let meta = file.entries.get(&source_id).cloned().unwrap_or_default();
                Mapping {
                    source_id,
                    target_id,
                    container_id: meta.container_id,
                    created_at: meta.created_at,
                }
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        for mapping in candidates {
            if mapping.source_id.is_empty() || mapping.target_id.is_empty() {
                store.repairs += 1;
                error!(
                    source_id = %mapping.source_id,
                    target_id = %mapping.target_id,
                    "Dropping mapping with an empty identifier"
                );
                continue;
            }
            store.insert_repairing(mapping);
        }

        for (target_id, source_id) in &file.target_to_source {
            let consistent = store
                .by_target
                .get(target_id)
                .is_some_and(|mapped| mapped == source_id);
            if !consistent {
                warn!(
                    target_id = %target_id,
                    source_id = %source_id,
                    "Dropping reverse mapping with no matching forward entry"
                );
            }
        }

        debug!(
            path = %store.path.as_deref().unwrap_or(path).display(),
            mappings = store.by_source.len(),
            containers = store.group_to_container.len(),
            repairs = store.repairs,
            "Loaded mapping store"
        );
        Ok(store)
    }

    /// Persist the store atomically. In-memory stores are not written.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut file = StoreFile {
            group_to_container: self.group_to_container.clone(),
            last_sync: self.last_sync,
            ..StoreFile::default()
        };
        for mapping in self.by_source.values() {
            file.source_to_target
                .insert(mapping.source_id.clone(), mapping.target_id.clone());
            file.target_to_source
                .insert(mapping.target_id.clone(), mapping.source_id.clone());
            file.entries.insert(
                mapping.source_id.clone(),
                EntryMeta {
                    container_id: mapping.container_id.clone(),
                    created_at: mapping.created_at,
                },
            );
        }

        let json = serde_json::to_string_pretty(&file)?;
        write_atomic(path, json.as_bytes())?;
        debug!(path = %path.display(), mappings = self.by_source.len(), "Saved mapping store");
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Number of integrity repairs made since load.
    #[must_use]
    pub const fn integrity_repairs(&self) -> usize {
        self.repairs
    }

    /// All mappings, ordered by source id.
    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.by_source.values()
    }

    #[must_use]
    pub fn get_by_source(&self, source_id: &str) -> Option<&Mapping> {
        self.by_source.get(source_id)
    }

    #[must_use]
    pub fn get_by_target(&self, target_id: &str) -> Option<&Mapping> {
        self.by_target
            .get(target_id)
            .and_then(|source_id| self.by_source.get(source_id))
    }

    /// Record a new mapping after a successful remote create.
    ///
    /// Any existing mapping that shares either identifier is evicted and
    /// logged as an integrity violation.
    ///
    /// # Errors
    ///
    /// Returns a `Data` error if either identifier is empty.
    pub fn record_mapping(
        &mut self,
        source_id: &str,
        target_id: &str,
        container_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        if source_id.is_empty() {
            return Err(SyncError::data(target_id, "source_id", "empty identifier"));
        }
        if target_id.is_empty() {
            return Err(SyncError::data(source_id, "target_id", "empty identifier"));
        }

        self.insert_repairing(Mapping {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            container_id: container_id.to_string(),
            created_at,
        });
        Ok(())
    }

    /// Remove the mapping for a source id.
    pub fn remove_by_source(&mut self, source_id: &str) -> Option<Mapping> {
        let mapping = self.by_source.remove(source_id)?;
        self.by_target.remove(&mapping.target_id);
        Some(mapping)
    }

    /// Remove the mapping for a target id.
    pub fn remove_by_target(&mut self, target_id: &str) -> Option<Mapping> {
        let source_id = self.by_target.remove(target_id)?;
        self.by_source.remove(&source_id)
    }

    /// Container previously assigned to a source group.
    #[must_use]
    pub fn container_for_group(&self, group_key: &str) -> Option<&str> {
        self.group_to_container.get(group_key).map(String::as_str)
    }

    pub fn set_container_for_group(&mut self, group_key: &str, container_id: &str) {
        self.group_to_container
            .insert(group_key.to_string(), container_id.to_string());
    }

    /// Group-to-container entries, ordered by group key.
    pub fn containers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.group_to_container
            .iter()
            .map(|(group, container)| (group.as_str(), container.as_str()))
    }

    #[must_use]
    pub const fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.last_sync = Some(at);
    }

    fn insert_repairing(&mut self, mapping: Mapping) {
        if let Some(previous) = self.by_source.get(&mapping.source_id) {
            if previous.target_id != mapping.target_id {
                self.repairs += 1;
                error!(
                    source_id = %mapping.source_id,
                    evicted_target = %previous.target_id,
                    kept_target = %mapping.target_id,
                    "{}",
                    SyncError::Integrity {
                        detail: "source id mapped twice".to_string()
                    }
                );
            }
            let previous_target = previous.target_id.clone();
            self.by_target.remove(&previous_target);
        }

        if let Some(previous_source) = self.by_target.get(&mapping.target_id).cloned() {
            if previous_source != mapping.source_id {
                self.repairs += 1;
                error!(
                    target_id = %mapping.target_id,
                    evicted_source = %previous_source,
                    kept_source = %mapping.source_id,
                    "{}",
                    SyncError::Integrity {
                        detail: "target id mapped twice".to_string()
                    }
                );
                self.by_source.remove(&previous_source);
            }
        }

        self.by_target
            .insert(mapping.target_id.clone(), mapping.source_id.clone());
        self.by_source.insert(mapping.source_id.clone(), mapping);
    }
}
