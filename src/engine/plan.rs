//! Planned actions and pass counters.

use crate::matcher::Ineligibility;
use crate::model::{NewRecord, RecordPatch};
use serde::Serialize;
use std::fmt;

/// Where a created record goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRef {
    /// Container already known and present.
    Existing(String),
    /// Container found by name; record it in the container map on use.
    Adopt { group_key: String, id: String },
    /// Container must be created at execution time.
    New {
        group_key: Option<String>,
        name: String,
    },
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing(id) | Self::Adopt { id, .. } => f.write_str(id),
            Self::New { name, .. } => write!(f, "new list '{name}'"),
        }
    }
}

/// Why a mirror is being torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReason {
    TargetCompleted,
    TargetMissing,
    SourceGone,
    Ineligible(Ineligibility),
    OrphanCompleted,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetCompleted => f.write_str("mirror completed"),
            Self::TargetMissing => f.write_str("mirror missing"),
            Self::SourceGone => f.write_str("source gone"),
            Self::Ineligible(reason) => write!(f, "source no longer eligible: {reason}"),
            Self::OrphanCompleted => f.write_str("completed mirror with no mapping"),
        }
    }
}

/// One step of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create {
        source_id: String,
        container: ContainerRef,
        fields: NewRecord,
    },
    Update {
        source_id: String,
        target_id: String,
        container_id: String,
        patch: RecordPatch,
    },
    Noop {
        source_id: String,
        target_id: String,
    },
    CompleteSource {
        source_id: String,
        target_id: String,
    },
    DeleteTarget {
        target_id: String,
        container_id: String,
        source_id: Option<String>,
        reason: TeardownReason,
    },
    /// Drop a mapping whose mirror is already gone.
    Forget {
        source_id: String,
        target_id: String,
        reason: TeardownReason,
    },
    /// Replace a completed record with its next occurrence.
    Recur {
        record_id: String,
        container_id: String,
        successor: NewRecord,
    },
}

impl Action {
    /// Short action name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Noop { .. } => "noop",
            Self::CompleteSource { .. } => "complete_source",
            Self::DeleteTarget { .. } => "delete",
            Self::Forget { .. } => "forget",
            Self::Recur { .. } => "recur",
        }
    }

    /// Teardown actions run before any create.
    #[must_use]
    pub const fn is_teardown(&self) -> bool {
        matches!(
            self,
            Self::CompleteSource { .. } | Self::DeleteTarget { .. } | Self::Forget { .. }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create {
                source_id,
                container,
                fields,
            } => write!(f, "CREATE {source_id} '{}' in {container}", fields.title),
            Self::Update {
                source_id,
                target_id,
                patch,
                ..
            } => {
                let fields: Vec<_> = patch.fields().iter().map(|field| field.as_str()).collect();
                write!(f, "UPDATE {target_id} from {source_id} ({})", fields.join(", "))
            }
            Self::Noop {
                source_id,
                target_id,
            } => write!(f, "NOOP {source_id} -> {target_id}"),
            Self::CompleteSource {
                source_id,
                target_id,
            } => write!(f, "COMPLETE_SOURCE {source_id} (mirror {target_id})"),
            Self::DeleteTarget {
                target_id, reason, ..
            } => write!(f, "DELETE {target_id} ({reason})"),
            Self::Forget {
                source_id,
                target_id,
                reason,
            } => write!(f, "FORGET {source_id} -> {target_id} ({reason})"),
            Self::Recur {
                record_id,
                successor,
                ..
            } => write!(
                f,
                "RECUR {record_id} '{}' due {}",
                successor.title,
                successor.due.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Per-pass counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub completed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl fmt::Display for PassCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} completed, {} unchanged, {} skipped, {} errors",
            self.created,
            self.updated,
            self.deleted,
            self.completed,
            self.unchanged,
            self.skipped,
            self.errors
        )
    }
}

/// Ordered actions for one pass plus what planning itself skipped or failed on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub actions: Vec<Action>,
    /// Records not acted on: ineligible, malformed, or over the limit.
    pub skipped: usize,
    /// Failures while reading target state.
    pub errors: usize,
}

impl Plan {
    /// Counters as they would be if every action succeeded.
    #[must_use]
    pub fn planned_counts(&self) -> PassCounts {
        let mut counts = PassCounts {
            skipped: self.skipped,
            errors: self.errors,
            ..PassCounts::default()
        };
        for action in &self.actions {
            match action {
                Action::Create { .. } => counts.created += 1,
                Action::Update { .. } => counts.updated += 1,
                Action::Noop { .. } => counts.unchanged += 1,
                Action::CompleteSource { .. } => counts.completed += 1,
                Action::DeleteTarget { .. } => counts.deleted += 1,
                Action::Forget { .. } => {}
                Action::Recur { .. } => {
                    counts.created += 1;
                    counts.deleted += 1;
                }
            }
        }
        counts
    }

    /// Does the plan change nothing?
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.actions
            .iter()
            .all(|action| matches!(action, Action::Noop { .. }))
    }

    /// Source ids with a planned create, in plan order.
    #[must_use]
    pub fn created_sources(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                Action::Create { source_id, .. } => Some(source_id.as_str()),
                _ => None,
            })
            .collect()
    }
}
