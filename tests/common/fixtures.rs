#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use tasksync::client::{FetchScope, LocalService, ServiceState, SourceClient, StoredRecord, TargetClient};
use tasksync::model::{Container, NewRecord, Priority, RecordPatch, SourceRecord, TargetRecord};
use tasksync::{Result, SyncError};

/// Fixed pass clock: 2025-01-15 12:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

pub fn container(id: &str, name: &str) -> Container {
    Container {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Origin service with an Inbox and a Work project.
pub fn todoist(records: Vec<StoredRecord>) -> LocalService {
    LocalService::in_memory(ServiceState {
        containers: vec![container("p-inbox", "Inbox"), container("p-work", "Work")],
        records,
        next_id: 100,
    })
    .with_id_prefix("t")
}

/// Empty list service with one default list, `L1`.
pub fn gtasks() -> LocalService {
    LocalService::in_memory(ServiceState {
        containers: vec![container("L1", "My Tasks")],
        records: Vec::new(),
        next_id: 0,
    })
    .with_id_prefix("g")
}

/// Inbox task due on `due` with priority p1.
pub fn urgent(id: &str, title: &str, due: &str) -> StoredRecord {
    StoredRecord {
        due: Some(due.to_string()),
        priority: Some(Priority::P1),
        ..StoredRecord::new(id, "p-inbox", title)
    }
}

/// Edit one stored record in place.
pub fn edit(service: &LocalService, id: &str, change: impl FnOnce(&mut StoredRecord)) {
    let mut state = service.snapshot();
    let record = state
        .records
        .iter_mut()
        .find(|r| r.id == id)
        .unwrap_or_else(|| panic!("no record {id}"));
    change(record);
    service.replace_state(state).expect("replace state");
}

/// Remove one stored record.
pub fn remove(service: &LocalService, id: &str) {
    let mut state = service.snapshot();
    state.records.retain(|r| r.id != id);
    service.replace_state(state).expect("replace state");
}

/// Wraps a [`LocalService`] and fails chosen operations on demand.
///
/// Operation names: `list_records`, `complete_record`, `list_containers`,
/// `create_container`, `list_target_records`, `create_record`,
/// `update_record`, `delete_record`.
pub struct FlakyService {
    pub inner: LocalService,
    failing: RefCell<BTreeSet<&'static str>>,
    blank_ids: Cell<bool>,
    calls: RefCell<Vec<String>>,
}

impl FlakyService {
    pub fn new(inner: LocalService) -> Self {
        Self {
            inner,
            failing: RefCell::new(BTreeSet::new()),
            blank_ids: Cell::new(false),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.borrow_mut().insert(operation);
    }

    pub fn heal(&self) {
        self.failing.borrow_mut().clear();
        self.blank_ids.set(false);
    }

    /// Creates succeed remotely but report an empty id, so the mapping write fails.
    pub fn blank_created_ids(&self) {
        self.blank_ids.set(true);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.as_str() == operation).count()
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        self.calls.borrow_mut().push(operation.to_string());
        if self.failing.borrow().contains(operation) {
            return Err(SyncError::transport(operation, "injected failure"));
        }
        Ok(())
    }
}

impl SourceClient for FlakyService {
    fn list_records(&self, scope: &FetchScope) -> Result<Vec<SourceRecord>> {
        self.check("list_records")?;
        SourceClient::list_records(&self.inner, scope)
    }

    fn complete_record(&self, id: &str) -> Result<()> {
        self.check("complete_record")?;
        self.inner.complete_record(id)
    }
}

impl TargetClient for FlakyService {
    fn list_containers(&self) -> Result<Vec<Container>> {
        self.check("list_containers")?;
        self.inner.list_containers()
    }

    fn create_container(&self, name: &str) -> Result<String> {
        self.check("create_container")?;
        self.inner.create_container(name)
    }

    fn list_records(&self, container_id: &str, include_completed: bool) -> Result<Vec<TargetRecord>> {
        self.check("list_target_records")?;
        TargetClient::list_records(&self.inner, container_id, include_completed)
    }

    fn create_record(&self, container_id: &str, fields: &NewRecord) -> Result<String> {
        self.check("create_record")?;
        let id = TargetClient::create_record(&self.inner, container_id, fields)?;
        Ok(if self.blank_ids.get() { String::new() } else { id })
    }

    fn update_record(&self, container_id: &str, id: &str, patch: &RecordPatch) -> Result<()> {
        self.check("update_record")?;
        self.inner.update_record(container_id, id, patch)
    }

    fn delete_record(&self, container_id: &str, id: &str) -> Result<()> {
        self.check("delete_record")?;
        self.inner.delete_record(container_id, id)
    }
}
