//! Core data types for `tasksync`.
//!
//! This module defines the records the reconciliation engine reads and writes:
//! - `SourceRecord` - A task snapshot from the origin service
//! - `TargetRecord` - A mirrored copy in the list service
//! - `Container` - A list in the list service
//! - `Mapping` - One persisted source/target correspondence
//! - `NewRecord` / `RecordPatch` - Field sets sent to the target on create/update
//! - `RecurrenceSpec` - A parsed "every N days" directive

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Task priority (1 = p1, the highest; 4 = p4, the default).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const P1: Self = Self(1);
    pub const P2: Self = Self(2);
    pub const P3: Self = Self(3);
    pub const P4: Self = Self(4);

    /// Is this priority at least as urgent as `threshold`?
    #[must_use]
    pub const fn at_least(self, threshold: Self) -> bool {
        self.0 <= threshold.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::P4
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = crate::error::SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        let val = trimmed.strip_prefix('p').unwrap_or(&trimmed);

        match val.parse::<u8>() {
            Ok(p) if (1..=4).contains(&p) => Ok(Self(p)),
            _ => Err(crate::error::SyncError::InvalidPriority {
                value: s.trim().to_string(),
            }),
        }
    }
}

/// Recurrence directive attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceSpec {
    /// Next occurrence is `days` after the completion time (`every! N days`).
    AfterCompletion { days: u32 },
    /// Calendar rule kept as opaque text; never computed locally.
    Calendar { rule: String },
}

impl RecurrenceSpec {
    /// Strict recurrence follows the calendar, not the completion time.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        matches!(self, Self::Calendar { .. })
    }

    /// Day offset for completion-based directives.
    #[must_use]
    pub const fn days(&self) -> Option<u32> {
        match self {
            Self::AfterCompletion { days } => Some(*days),
            Self::Calendar { .. } => None,
        }
    }

    /// Directive text as it appears in notes.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::AfterCompletion { days } if *days == 1 => "every! 1 day".to_string(),
            Self::AfterCompletion { days } => format!("every! {days} days"),
            Self::Calendar { rule } => rule.clone(),
        }
    }
}

/// A task as read from the origin service. Never mutated by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceSpec>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Grouping identifier (project or list id); `None` for the inbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

impl SourceRecord {
    /// Create a minimal record with an id and title.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Does the record carry any timing information?
    #[must_use]
    pub const fn has_date(&self) -> bool {
        self.due.is_some() || self.deadline.is_some()
    }
}

/// A mirrored copy living in a target container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: String,
    pub container_id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A list in the target service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
}

/// Fields written when creating a target record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub title: String,
    pub notes: String,
    pub due: Option<String>,
}

/// Partial update of a target record. `None` leaves a field untouched;
/// `due: Some(None)` clears the due date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<Option<String>>,
}

impl RecordPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.notes.is_none() && self.due.is_none()
    }

    /// Fields this patch touches.
    #[must_use]
    pub fn fields(&self) -> Vec<DriftField> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push(DriftField::Title);
        }
        if self.notes.is_some() {
            fields.push(DriftField::Notes);
        }
        if self.due.is_some() {
            fields.push(DriftField::Due);
        }
        fields
    }
}

/// A projected field that can drift between source and mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftField {
    Title,
    Notes,
    Due,
}

impl DriftField {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Notes => "notes",
            Self::Due => "due",
        }
    }
}

impl fmt::Display for DriftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live source/target correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub source_id: String,
    pub target_id: String,
    pub container_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_labels_and_numbers() {
        assert_eq!("p1".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!("P3".parse::<Priority>().unwrap(), Priority::P3);
        assert_eq!(" 4 ".parse::<Priority>().unwrap(), Priority::P4);
    }

    #[test]
    fn priority_rejects_out_of_range() {
        let err = "p0".parse::<Priority>().unwrap_err();
        assert_eq!(err.to_string(), "Priority must be p1-p4, got: p0");
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_threshold_is_inclusive() {
        assert!(Priority::P1.at_least(Priority::P3));
        assert!(Priority::P3.at_least(Priority::P3));
        assert!(!Priority::P4.at_least(Priority::P3));
    }

    #[test]
    fn recurrence_text_round_trips_wording() {
        assert_eq!(
            RecurrenceSpec::AfterCompletion { days: 3 }.as_text(),
            "every! 3 days"
        );
        assert_eq!(
            RecurrenceSpec::AfterCompletion { days: 1 }.as_text(),
            "every! 1 day"
        );
        let calendar = RecurrenceSpec::Calendar {
            rule: "every monday".to_string(),
        };
        assert!(calendar.is_strict());
        assert_eq!(calendar.days(), None);
    }

    #[test]
    fn patch_reports_touched_fields() {
        let patch = RecordPatch {
            notes: Some("n".to_string()),
            due: Some(None),
            ..RecordPatch::default()
        };
        assert_eq!(patch.fields(), vec![DriftField::Notes, DriftField::Due]);
        assert!(RecordPatch::default().is_empty());
    }

    #[test]
    fn source_record_serializes_sparsely() {
        let record = SourceRecord::new("t1", "Pay rent");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "t1");
        assert!(json.get("completed").is_none());
        assert!(json.get("labels").is_none());
    }
}
