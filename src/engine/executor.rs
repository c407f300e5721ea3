//! Action executor: applies a plan against both services.
//!
//! Each action is isolated. A failure is logged with the record id,
//! counted, and the next action runs. Mapping changes land in the store
//! right after the remote call they depend on; the store itself is only
//! persisted once the whole pass is done.

use super::plan::{Action, ContainerRef, PassCounts, Plan};
use crate::client::{SourceClient, TargetClient};
use crate::error::{Result, SyncError};
use crate::model::{NewRecord, RecordPatch};
use crate::store::IdentityStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Outcome counters for one `apply` call.
pub type ExecutionSummary = PassCounts;

/// Apply every action in `plan`, in order.
///
/// Never fails as a whole: per-action errors are counted in the summary.
pub fn apply(
    plan: &Plan,
    source: &dyn SourceClient,
    target: &dyn TargetClient,
    store: &mut IdentityStore,
    now: DateTime<Utc>,
) -> ExecutionSummary {
    let mut executor = ActionExecutor {
        source,
        target,
        store,
        now,
        containers: HashMap::new(),
        failed_completions: HashSet::new(),
        summary: ExecutionSummary::default(),
    };
    for action in &plan.actions {
        executor.run(action);
    }
    executor.summary
}

struct ActionExecutor<'a> {
    source: &'a dyn SourceClient,
    target: &'a dyn TargetClient,
    store: &'a mut IdentityStore,
    now: DateTime<Utc>,
    /// Containers created this pass, by name.
    containers: HashMap<String, String>,
    /// Sources whose completion failed; their mirrors are kept for a retry.
    failed_completions: HashSet<String>,
    summary: ExecutionSummary,
}

impl ActionExecutor<'_> {
    fn run(&mut self, action: &Action) {
        let result = match action {
            Action::Create {
                source_id,
                container,
                fields,
            } => self.create(source_id, container, fields),
            Action::Update {
                source_id,
                target_id,
                container_id,
                patch,
            } => self.update(source_id, target_id, container_id, patch),
            Action::Noop { source_id, .. } => {
                debug!(source_id = %source_id, "No drift");
                self.summary.unchanged += 1;
                Ok(())
            }
            Action::CompleteSource {
                source_id,
                target_id,
            } => self.complete_source(source_id, target_id),
            Action::DeleteTarget {
                target_id,
                container_id,
                source_id,
                reason,
            } => {
                if source_id
                    .as_ref()
                    .is_some_and(|id| self.failed_completions.contains(id))
                {
                    warn!(
                        target_id = %target_id,
                        "Keeping mirror until its source completion succeeds"
                    );
                    self.summary.skipped += 1;
                    return;
                }
                info!(target_id = %target_id, reason = %reason, "Deleting mirror");
                self.delete_target(target_id, container_id)
            }
            Action::Forget {
                source_id,
                target_id,
                reason,
            } => {
                if !self.failed_completions.contains(source_id) {
                    debug!(source_id = %source_id, target_id = %target_id, reason = %reason, "Forgetting mapping");
                    self.store.remove_by_source(source_id);
                }
                Ok(())
            }
            Action::Recur {
                record_id,
                container_id,
                successor,
            } => self.recur(record_id, container_id, successor),
        };

        if let Err(err) = result {
            self.summary.errors += 1;
            error!(action = action.kind(), error = %err, "{action} failed");
        }
    }

    fn create(&mut self, source_id: &str, container: &ContainerRef, fields: &NewRecord) -> Result<()> {
        let container_id = self.resolve_container(container)?;
        let target_id = self.target.create_record(&container_id, fields)?;
        self.summary.created += 1;
        info!(
            source_id = %source_id,
            target_id = %target_id,
            container_id = %container_id,
            "Created mirror '{}'",
            fields.title
        );

        if let Err(err) = self
            .store
            .record_mapping(source_id, &target_id, &container_id, self.now)
        {
            warn!(
                source_id = %source_id,
                target_id = %target_id,
                error = %err,
                "Mirror created but mapping not recorded; it is now an orphan"
            );
            return Err(err);
        }
        Ok(())
    }

    fn update(
        &mut self,
        source_id: &str,
        target_id: &str,
        container_id: &str,
        patch: &RecordPatch,
    ) -> Result<()> {
        self.target.update_record(container_id, target_id, patch)?;
        self.summary.updated += 1;
        info!(
            source_id = %source_id,
            target_id = %target_id,
            fields = ?patch.fields(),
            "Updated mirror"
        );
        Ok(())
    }

    fn complete_source(&mut self, source_id: &str, target_id: &str) -> Result<()> {
        match self.source.complete_record(source_id) {
            Ok(()) => {
                self.summary.completed += 1;
                info!(source_id = %source_id, target_id = %target_id, "Completed source");
            }
            Err(err) if err.is_not_found() => {
                debug!(source_id = %source_id, "Source already gone");
            }
            Err(err) => {
                self.failed_completions.insert(source_id.to_string());
                return Err(err);
            }
        }
        self.store.remove_by_source(source_id);
        Ok(())
    }

    fn delete_target(&mut self, target_id: &str, container_id: &str) -> Result<()> {
        match self.target.delete_record(container_id, target_id) {
            Ok(()) => self.summary.deleted += 1,
            Err(err) if err.is_not_found() => {
                debug!(target_id = %target_id, "Mirror already gone");
            }
            Err(err) => return Err(err),
        }
        self.store.remove_by_target(target_id);
        Ok(())
    }

    fn recur(&mut self, record_id: &str, container_id: &str, successor: &NewRecord) -> Result<()> {
        let new_id = self.target.create_record(container_id, successor)?;
        self.summary.created += 1;
        info!(
            record_id = %record_id,
            successor_id = %new_id,
            due = successor.due.as_deref().unwrap_or("-"),
            "Created next occurrence '{}'",
            successor.title
        );

        match self.target.delete_record(container_id, record_id) {
            Ok(()) => self.summary.deleted += 1,
            Err(err) if err.is_not_found() => {
                debug!(record_id = %record_id, "Completed original already gone");
            }
            Err(err) => {
                warn!(
                    record_id = %record_id,
                    "Next occurrence created but the completed original remains"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    fn resolve_container(&mut self, container: &ContainerRef) -> Result<String> {
        match container {
            ContainerRef::Existing(id) => Ok(id.clone()),
            ContainerRef::Adopt { group_key, id } => {
                self.store.set_container_for_group(group_key, id);
                Ok(id.clone())
            }
            ContainerRef::New { group_key, name } => {
                let id = if let Some(id) = self.containers.get(name) {
                    id.clone()
                } else {
                    let id = self.target.create_container(name).map_err(|err| {
                        if err.is_pass_recoverable() {
                            err
                        } else {
                            SyncError::ContainerUnavailable { name: name.clone() }
                        }
                    })?;
                    info!(container_id = %id, "Created list '{name}'");
                    self.containers.insert(name.clone(), id.clone());
                    id
                };
                if let Some(key) = group_key {
                    self.store.set_container_for_group(key, &id);
                }
                Ok(id)
            }
        }
    }
}
