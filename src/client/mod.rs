//! Service client capabilities consumed by the engine.
//!
//! The engine never talks HTTP. It is handed one `SourceClient` and one
//! `TargetClient`; the binary wires both to [`local::LocalService`], and
//! tests wrap it to inject failures. All methods take `&self` so a single
//! service object can play both roles (the list service is both source and
//! target for the recurrence and starred tools).

pub mod local;

pub use local::{LocalService, ServiceState, StoredRecord};

use crate::error::{Result, SyncError};
use crate::model::{Container, NewRecord, RecordPatch, SourceRecord, TargetRecord};
use std::collections::BTreeSet;

/// Which source records a fetch should return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchScope {
    /// Group names to read; empty reads every group.
    pub include_groups: BTreeSet<String>,
    /// Group names never read.
    pub exclude_groups: BTreeSet<String>,
    /// Group ids never read (the mirror's own containers).
    pub exclude_group_ids: BTreeSet<String>,
    pub include_completed: bool,
}

impl FetchScope {
    /// Is a record in this group within scope?
    #[must_use]
    pub fn admits(&self, group_id: Option<&str>, group_name: Option<&str>) -> bool {
        if group_id.is_some_and(|id| self.exclude_group_ids.contains(id)) {
            return false;
        }
        if group_name.is_some_and(|name| self.exclude_groups.contains(name)) {
            return false;
        }
        self.include_groups.is_empty()
            || group_name.is_some_and(|name| self.include_groups.contains(name))
    }
}

/// Read/write capabilities against the origin service.
pub trait SourceClient {
    /// Fetch every record within `scope`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the service cannot be read.
    fn list_records(&self, scope: &FetchScope) -> Result<Vec<SourceRecord>>;

    /// Mark a record completed.
    ///
    /// # Errors
    ///
    /// Returns `RemoteNotFound` for unknown ids or a transport error.
    fn complete_record(&self, id: &str) -> Result<()>;

    /// Create a record in the origin service. No current policy writes back.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` unless the client implements it.
    fn create_record(&self, group_id: Option<&str>, fields: &NewRecord) -> Result<String> {
        let _ = (group_id, fields);
        Err(SyncError::Unsupported {
            operation: "source create_record".to_string(),
        })
    }
}

/// Read/write capabilities against the mirror service.
pub trait TargetClient {
    /// # Errors
    ///
    /// Returns a transport error if the service cannot be read.
    fn list_containers(&self) -> Result<Vec<Container>>;

    /// Create a container and return its id.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the service rejects the call.
    fn create_container(&self, name: &str) -> Result<String>;

    /// # Errors
    ///
    /// Returns `RemoteNotFound` for an unknown container or a transport error.
    fn list_records(&self, container_id: &str, include_completed: bool)
    -> Result<Vec<TargetRecord>>;

    /// Create a record and return its id.
    ///
    /// # Errors
    ///
    /// Returns `RemoteNotFound` for an unknown container or a transport error.
    fn create_record(&self, container_id: &str, fields: &NewRecord) -> Result<String>;

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RemoteNotFound` for an unknown record or a transport error.
    fn update_record(&self, container_id: &str, id: &str, patch: &RecordPatch) -> Result<()>;

    /// # Errors
    ///
    /// Returns `RemoteNotFound` when the record is already gone.
    fn delete_record(&self, container_id: &str, id: &str) -> Result<()>;
}
