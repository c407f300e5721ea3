//! Sync policies: the per-tool knobs that parameterize the one engine.
//!
//! A `SyncPolicy` is a value object, not user configuration. It is built
//! from typed `Settings` by one of the four constructors below and then
//! handed to the matcher and the engine, which never branch on the tool
//! name, only on the policy's fields.

use crate::client::FetchScope;
use crate::config::Settings;
use crate::model::Priority;
use std::collections::BTreeSet;
use std::fmt;

/// The four tools sharing the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Priority/label bidirectional sync into one list.
    Sync,
    /// Full project mirror, one list per project.
    Mirror,
    /// Completion-triggered recurrence inside the list service.
    Recur,
    /// Marker-based consolidation of starred items into one list.
    Starred,
}

impl Tool {
    pub const ALL: [Self; 4] = [Self::Sync, Self::Mirror, Self::Recur, Self::Starred];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Mirror => "mirror",
            Self::Recur => "recur",
            Self::Starred => "starred",
        }
    }

    /// Does the tool read from a separate origin service?
    #[must_use]
    pub const fn uses_separate_source(&self) -> bool {
        matches!(self, Self::Sync | Self::Mirror)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category gate and projection style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    /// Eligible by priority threshold or label membership.
    PriorityLabel {
        max_priority: Option<Priority>,
        labels: BTreeSet<String>,
        /// Service name written into the provenance note.
        origin: String,
    },
    /// Every in-scope record is eligible.
    ProjectMirror,
    /// Completed records with a completion-based directive spawn a successor.
    Recurrence,
    /// Eligible when a marker ends the title or notes.
    Starred { markers: Vec<String> },
}

impl Variant {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PriorityLabel { .. } => "priority-label",
            Self::ProjectMirror => "project-mirror",
            Self::Recurrence => "recurrence",
            Self::Starred { .. } => "starred",
        }
    }
}

/// "Due within N days" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingGate {
    pub due_within_days: i64,
}

/// Which date wins when a record has both a due date and a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePrecedence {
    #[default]
    Due,
    Deadline,
}

impl DatePrecedence {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Due => "due",
            Self::Deadline => "deadline",
        }
    }
}

/// Whether due-date differences count as drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueDrift {
    /// Set on create, never overwritten afterwards.
    Pinned,
    Compared,
}

/// Where target records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStrategy {
    /// One list, by name; `@default` means the service's first list.
    Single { name: String },
    /// One list per source group, named after the group.
    PerGroup { inbox_name: String },
    /// Successors go next to the record they replace.
    SameAsSource,
}

/// Reserved container name meaning "the first list the service returns".
pub const DEFAULT_CONTAINER: &str = "@default";

/// Group name the origin service gives its inbox project.
pub const INBOX_GROUP: &str = "Inbox";

/// Full per-tool policy.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub tool: Tool,
    pub variant: Variant,
    pub timing: Option<TimingGate>,
    pub date_precedence: DatePrecedence,
    pub due_drift: DueDrift,
    /// Completing the mirror completes the source.
    pub backward_completion: bool,
    /// Source gone or out of policy deletes the mirror.
    pub propagate_deletions: bool,
    /// Skip backward completion when the source date is this many days past the mirror's.
    pub completion_guard_days: Option<i64>,
    /// Delete completed records in the mirror container that have no mapping.
    pub sweep_completed_orphans: bool,
    pub containers: ContainerStrategy,
    pub scope: FetchScope,
}

impl SyncPolicy {
    /// Priority/label bidirectional sync.
    #[must_use]
    pub fn priority_label(settings: &Settings) -> Self {
        let sync = &settings.sync;
        Self {
            tool: Tool::Sync,
            variant: Variant::PriorityLabel {
                max_priority: sync.priority_tasks.then_some(sync.max_priority),
                labels: sync.labels.iter().map(|l| l.to_lowercase()).collect(),
                origin: sync.origin_name.clone(),
            },
            timing: Some(TimingGate {
                due_within_days: sync.due_within_days,
            }),
            date_precedence: sync.date_precedence,
            due_drift: DueDrift::Pinned,
            backward_completion: sync.backward_completion,
            propagate_deletions: true,
            completion_guard_days: Some(sync.completion_guard_days),
            sweep_completed_orphans: true,
            containers: ContainerStrategy::Single {
                name: sync.target_list.clone(),
            },
            scope: FetchScope::default(),
        }
    }

    /// Full project mirror.
    #[must_use]
    pub fn project_mirror(settings: &Settings) -> Self {
        let mirror = &settings.mirror;
        Self {
            tool: Tool::Mirror,
            variant: Variant::ProjectMirror,
            timing: None,
            date_precedence: settings.sync.date_precedence,
            due_drift: DueDrift::Compared,
            backward_completion: false,
            propagate_deletions: true,
            completion_guard_days: None,
            sweep_completed_orphans: false,
            containers: ContainerStrategy::PerGroup {
                inbox_name: mirror.inbox_list_name.clone(),
            },
            scope: FetchScope {
                exclude_groups: mirror.excluded_projects.iter().cloned().collect(),
                ..FetchScope::default()
            },
        }
    }

    /// Completion-triggered recurrence.
    #[must_use]
    pub fn recurrence(settings: &Settings) -> Self {
        Self {
            tool: Tool::Recur,
            variant: Variant::Recurrence,
            timing: None,
            date_precedence: DatePrecedence::Due,
            due_drift: DueDrift::Compared,
            backward_completion: false,
            propagate_deletions: false,
            completion_guard_days: None,
            sweep_completed_orphans: false,
            containers: ContainerStrategy::SameAsSource,
            scope: FetchScope {
                include_groups: settings.recur.target_lists.iter().cloned().collect(),
                include_completed: true,
                ..FetchScope::default()
            },
        }
    }

    /// Starred-item consolidation.
    #[must_use]
    pub fn starred(settings: &Settings) -> Self {
        let starred = &settings.starred;
        let mut exclude_groups = BTreeSet::new();
        exclude_groups.insert(starred.list_name.clone());
        Self {
            tool: Tool::Starred,
            variant: Variant::Starred {
                markers: starred.markers.clone(),
            },
            timing: None,
            date_precedence: DatePrecedence::Due,
            due_drift: DueDrift::Compared,
            backward_completion: false,
            propagate_deletions: true,
            completion_guard_days: None,
            sweep_completed_orphans: true,
            containers: ContainerStrategy::Single {
                name: starred.list_name.clone(),
            },
            scope: FetchScope {
                include_groups: starred.source_lists.iter().cloned().collect(),
                exclude_groups,
                ..FetchScope::default()
            },
        }
    }

    /// Build the policy for `tool`.
    #[must_use]
    pub fn for_tool(tool: Tool, settings: &Settings) -> Self {
        match tool {
            Tool::Sync => Self::priority_label(settings),
            Tool::Mirror => Self::project_mirror(settings),
            Tool::Recur => Self::recurrence(settings),
            Tool::Starred => Self::starred(settings),
        }
    }

    /// Does this policy keep mappings at all?
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        !matches!(self.variant, Variant::Recurrence)
    }

    /// Markers stripped from text before projection and comparison.
    #[must_use]
    pub fn markers(&self) -> &[String] {
        match &self.variant {
            Variant::Starred { markers } => markers,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_label_defaults() {
        let policy = SyncPolicy::priority_label(&Settings::default());
        assert_eq!(policy.due_drift, DueDrift::Pinned);
        assert!(policy.backward_completion);
        assert_eq!(policy.completion_guard_days, Some(1));
        assert_eq!(policy.timing, Some(TimingGate { due_within_days: 1 }));
        assert_eq!(
            policy.containers,
            ContainerStrategy::Single {
                name: DEFAULT_CONTAINER.to_string()
            }
        );
        let Variant::PriorityLabel {
            max_priority,
            labels,
            ..
        } = &policy.variant
        else {
            panic!("wrong variant");
        };
        assert_eq!(*max_priority, Some(Priority::P3));
        assert!(labels.contains("urgent"));
    }

    #[test]
    fn priority_tasks_off_drops_threshold() {
        let mut settings = Settings::default();
        settings.sync.priority_tasks = false;
        let policy = SyncPolicy::priority_label(&settings);
        assert!(matches!(
            policy.variant,
            Variant::PriorityLabel {
                max_priority: None,
                ..
            }
        ));
    }

    #[test]
    fn starred_excludes_own_list_from_scan() {
        let policy = SyncPolicy::starred(&Settings::default());
        assert!(policy.scope.exclude_groups.contains("TRMNL"));
        assert_eq!(policy.markers(), ["⭐".to_string(), "*".to_string()]);
        assert!(policy.sweep_completed_orphans);
    }

    #[test]
    fn recurrence_reads_completed_and_keeps_no_mappings() {
        let policy = SyncPolicy::recurrence(&Settings::default());
        assert!(policy.scope.include_completed);
        assert!(!policy.is_mapped());
    }

    #[test]
    fn mirror_compares_due_and_never_completes_source() {
        let mut settings = Settings::default();
        settings.mirror.excluded_projects = vec!["Someday".to_string()];
        let policy = SyncPolicy::project_mirror(&settings);
        assert_eq!(policy.due_drift, DueDrift::Compared);
        assert!(!policy.backward_completion);
        assert!(policy.scope.exclude_groups.contains("Someday"));
    }
}
