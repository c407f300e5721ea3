//! File-backed task service.
//!
//! `LocalService` models a task service as one JSON document holding
//! containers and records with the union of both services' fields. Every
//! mutation is written through atomically, so a record created mid-pass
//! survives an interrupted run just like a remote create would.

use super::{FetchScope, SourceClient, TargetClient};
use crate::error::{Result, SyncError};
use crate::matcher::parse_recurrence;
use crate::model::{
    Container, NewRecord, Priority, RecordPatch, RecurrenceSpec, SourceRecord, TargetRecord,
};
use crate::util::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// One record as stored in the service file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub container_id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,
    /// Recurrence rule text, e.g. `every! 3 days` or `every monday`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Create a record in `container_id` with the given title.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        container_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            container_id: container_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    fn to_target(&self) -> TargetRecord {
        TargetRecord {
            id: self.id.clone(),
            container_id: self.container_id.clone(),
            title: self.title.clone(),
            notes: self.notes.clone(),
            due: self.due.clone(),
            completed: self.completed,
            completed_at: self.completed_at,
        }
    }

    fn to_source(&self, group_name: Option<&str>) -> SourceRecord {
        let recurrence = self.recurrence.as_deref().map(|rule| {
            parse_recurrence(rule).unwrap_or_else(|| RecurrenceSpec::Calendar {
                rule: rule.to_string(),
            })
        });
        SourceRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            notes: self.notes.clone(),
            due: self.due.clone(),
            deadline: self.deadline.clone(),
            priority: self.priority,
            labels: self.labels.clone(),
            recurrence,
            completed: self.completed,
            completed_at: self.completed_at,
            group_id: Some(self.container_id.clone()),
            group_name: group_name.map(str::to_string),
        }
    }
}

/// Whole service contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub records: Vec<StoredRecord>,
    /// Counter for generated ids.
    #[serde(default)]
    pub next_id: u64,
}

impl ServiceState {
    fn container_name(&self, container_id: &str) -> Option<&str> {
        self.containers
            .iter()
            .find(|c| c.id == container_id)
            .map(|c| c.name.as_str())
    }

    fn has_container(&self, container_id: &str) -> bool {
        self.containers.iter().any(|c| c.id == container_id)
    }

    fn record_mut(&mut self, container_id: Option<&str>, id: &str) -> Option<&mut StoredRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id && container_id.is_none_or(|c| r.container_id == c))
    }

    /// Next unused id; hand-written ids in the file are skipped.
    fn allocate_id(&mut self, prefix: &str) -> String {
        loop {
            self.next_id += 1;
            let id = format!("{prefix}{}", self.next_id);
            let taken = self.records.iter().any(|r| r.id == id)
                || self.containers.iter().any(|c| c.id == id);
            if !taken {
                return id;
            }
        }
    }
}

/// A task service persisted to a JSON file (or held in memory).
#[derive(Debug)]
pub struct LocalService {
    path: Option<PathBuf>,
    id_prefix: String,
    state: RefCell<ServiceState>,
}

impl LocalService {
    /// Open a service file. A missing file is an empty service.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file exists but is not a
    /// valid service document, or an I/O error if it cannot be read.
    pub fn open(path: &Path) -> Result<Self> {
        let state: ServiceState = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents).map_err(|err| {
                SyncError::Config(format!(
                    "service file {} is not valid: {err}",
                    path.display()
                ))
            })?
        } else {
            ServiceState::default()
        };
        debug!(
            path = %path.display(),
            containers = state.containers.len(),
            records = state.records.len(),
            "Opened local service"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            id_prefix: "r".to_string(),
            state: RefCell::new(state),
        })
    }

    /// Build a service that lives only in memory.
    #[must_use]
    pub fn in_memory(state: ServiceState) -> Self {
        Self {
            path: None,
            id_prefix: "r".to_string(),
            state: RefCell::new(state),
        }
    }

    /// Prefix for generated record and container ids.
    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> ServiceState {
        self.state.borrow().clone()
    }

    /// Replace the contents and write them through.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the write-through fails.
    pub fn replace_state(&self, state: ServiceState) -> Result<()> {
        *self.state.borrow_mut() = state;
        self.persist("replace_state")
    }

    /// Find a record by id in any container.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<StoredRecord> {
        self.state
            .borrow()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Mark a record completed at `at`, as a user would in the service UI.
    ///
    /// # Errors
    ///
    /// Returns `RemoteNotFound` for unknown ids.
    pub fn mark_completed(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            let record = state.record_mut(None, id).ok_or_else(|| not_found("Record", id))?;
            record.completed = true;
            record.completed_at = Some(at);
        }
        self.persist("mark_completed")
    }

    fn persist(&self, operation: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&*self.state.borrow())?;
        write_atomic(path, json.as_bytes())
            .map_err(|err| SyncError::transport(operation, err.to_string()))?;
        trace!(path = %path.display(), operation, "Wrote service file");
        Ok(())
    }
}

fn not_found(kind: &'static str, id: &str) -> SyncError {
    SyncError::RemoteNotFound {
        kind,
        id: id.to_string(),
    }
}

impl SourceClient for LocalService {
    fn list_records(&self, scope: &FetchScope) -> Result<Vec<SourceRecord>> {
        let state = self.state.borrow();
        Ok(state
            .records
            .iter()
            .filter(|r| scope.include_completed || !r.completed)
            .filter_map(|r| {
                let group_name = state.container_name(&r.container_id);
                scope
                    .admits(Some(&r.container_id), group_name)
                    .then(|| r.to_source(group_name))
            })
            .collect())
    }

    fn complete_record(&self, id: &str) -> Result<()> {
        self.mark_completed(id, Utc::now())
    }

    fn create_record(&self, group_id: Option<&str>, fields: &NewRecord) -> Result<String> {
        let container_id = match group_id {
            Some(id) => id.to_string(),
            None => self
                .state
                .borrow()
                .containers
                .first()
                .map(|c| c.id.clone())
                .ok_or_else(|| not_found("Container", "@default"))?,
        };
        TargetClient::create_record(self, &container_id, fields)
    }
}

impl TargetClient for LocalService {
    fn list_containers(&self) -> Result<Vec<Container>> {
        Ok(self.state.borrow().containers.clone())
    }

    fn create_container(&self, name: &str) -> Result<String> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.allocate_id(&format!("{}-list-", self.id_prefix));
            state.containers.push(Container {
                id: id.clone(),
                name: name.to_string(),
            });
            id
        };
        self.persist("create_container")?;
        Ok(id)
    }

    fn list_records(
        &self,
        container_id: &str,
        include_completed: bool,
    ) -> Result<Vec<TargetRecord>> {
        let state = self.state.borrow();
        if !state.has_container(container_id) {
            return Err(not_found("Container", container_id));
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.container_id == container_id)
            .filter(|r| include_completed || !r.completed)
            .map(StoredRecord::to_target)
            .collect())
    }

    fn create_record(&self, container_id: &str, fields: &NewRecord) -> Result<String> {
        let id = {
            let mut state = self.state.borrow_mut();
            if !state.has_container(container_id) {
                return Err(not_found("Container", container_id));
            }
            let id = state.allocate_id(&self.id_prefix);
            state.records.push(StoredRecord {
                notes: fields.notes.clone(),
                due: fields.due.clone(),
                ..StoredRecord::new(id.clone(), container_id, fields.title.clone())
            });
            id
        };
        self.persist("create_record")?;
        Ok(id)
    }

    fn update_record(&self, container_id: &str, id: &str, patch: &RecordPatch) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            let record = state
                .record_mut(Some(container_id), id)
                .ok_or_else(|| not_found("Record", id))?;
            if let Some(title) = &patch.title {
                record.title.clone_from(title);
            }
            if let Some(notes) = &patch.notes {
                record.notes.clone_from(notes);
            }
            if let Some(due) = &patch.due {
                record.due.clone_from(due);
            }
        }
        self.persist("update_record")
    }

    fn delete_record(&self, container_id: &str, id: &str) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            let before = state.records.len();
            state
                .records
                .retain(|r| !(r.id == id && r.container_id == container_id));
            if state.records.len() == before {
                return Err(not_found("Record", id));
            }
        }
        self.persist("delete_record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service() -> LocalService {
        LocalService::in_memory(ServiceState {
            containers: vec![
                Container {
                    id: "L1".to_string(),
                    name: "Work".to_string(),
                },
                Container {
                    id: "L2".to_string(),
                    name: "TRMNL".to_string(),
                },
            ],
            records: vec![
                StoredRecord {
                    recurrence: Some("every! 3 days".to_string()),
                    ..StoredRecord::new("a1", "L1", "Water plants")
                },
                StoredRecord {
                    completed: true,
                    ..StoredRecord::new("a2", "L1", "Done")
                },
                StoredRecord::new("m1", "L2", "Mirror"),
            ],
            next_id: 0,
        })
        .with_id_prefix("g")
    }

    #[test]
    fn source_listing_honors_scope() {
        let svc = service();
        let scope = FetchScope {
            exclude_groups: ["TRMNL".to_string()].into(),
            ..FetchScope::default()
        };
        let records = SourceClient::list_records(&svc, &scope).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].group_name.as_deref(), Some("Work"));
        assert_eq!(
            records[0].recurrence,
            Some(RecurrenceSpec::AfterCompletion { days: 3 })
        );
    }

    #[test]
    fn target_listing_filters_completed() {
        let svc = service();
        assert_eq!(TargetClient::list_records(&svc, "L1", false).unwrap().len(), 1);
        assert_eq!(TargetClient::list_records(&svc, "L1", true).unwrap().len(), 2);
    }

    #[test]
    fn unknown_container_is_not_found() {
        let svc = service();
        let err = TargetClient::list_records(&svc, "nope", true).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn create_update_delete_cycle() {
        let svc = service();
        let id = TargetClient::create_record(
            &svc,
            "L2",
            &NewRecord {
                title: "Call mom".to_string(),
                notes: String::new(),
                due: None,
            },
        )
        .unwrap();
        assert_eq!(id, "g1");

        svc.update_record(
            "L2",
            &id,
            &RecordPatch {
                due: Some(Some("2025-01-15T00:00:00.000Z".to_string())),
                ..RecordPatch::default()
            },
        )
        .unwrap();
        assert_eq!(
            svc.find(&id).unwrap().due.as_deref(),
            Some("2025-01-15T00:00:00.000Z")
        );

        svc.delete_record("L2", &id).unwrap();
        assert!(svc.delete_record("L2", &id).unwrap_err().is_not_found());
    }

    #[test]
    fn mutations_write_through_to_disk() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("service.json");
        let svc = LocalService::open(&path).unwrap();
        let list = svc.create_container("Inbox").unwrap();
        svc.complete_record("missing").unwrap_err();

        let reopened = LocalService::open(&path).unwrap();
        assert_eq!(reopened.list_containers().unwrap()[0].id, list);
    }
}
