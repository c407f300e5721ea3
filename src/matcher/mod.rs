//! Record matching: eligibility, projection, drift, and directive parsing.
//!
//! Everything here is a pure function of a record, a policy, and "today".
//! Nothing talks to a service or the mapping store.

use crate::error::Result;
use crate::model::{DriftField, NewRecord, RecordPatch, RecurrenceSpec, SourceRecord, TargetRecord};
use crate::policy::{DatePrecedence, DueDrift, SyncPolicy, Variant};
use crate::util::normalize_whitespace;
use crate::util::time::{days_until, format_due, parse_due_date};
use chrono::NaiveDate;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bevery(!)?\s+(\d+)\s+days?\b").expect("directive regex")
});

/// Why a record was not selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    /// Time-gated policy and the record has neither due date nor deadline.
    NoDate,
    /// Effective date is further out than the window.
    OutsideWindow { days_until: i64, window: i64 },
    /// Priority below threshold and no configured label.
    NoPriorityOrLabel,
    /// No marker at the end of title or notes.
    NotStarred,
    /// Recurrence only acts on completed records.
    NotCompleted,
    /// Completed, but carries no completion-based directive.
    NoDirective,
    /// Completed source records are never mirrored.
    Completed,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDate => f.write_str("no due date or deadline"),
            Self::OutsideWindow { days_until, window } => {
                write!(f, "due in {days_until} days, window is {window}")
            }
            Self::NoPriorityOrLabel => f.write_str("priority below threshold and no sync label"),
            Self::NotStarred => f.write_str("no marker"),
            Self::NotCompleted => f.write_str("not completed"),
            Self::NoDirective => f.write_str("no completion-based directive"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

/// Outcome of evaluating one record against a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Eligible,
    Ineligible(Ineligibility),
}

impl Decision {
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Evaluate the timing gate then the category gate, stopping at the first failure.
///
/// # Errors
///
/// Returns a `Data` error when the record's effective date cannot be parsed.
pub fn evaluate(record: &SourceRecord, policy: &SyncPolicy, today: NaiveDate) -> Result<Decision> {
    if record.completed && !matches!(policy.variant, Variant::Recurrence) {
        return Ok(Decision::Ineligible(Ineligibility::Completed));
    }

    if let Some(gate) = policy.timing {
        let Some(date) = effective_date(record, policy.date_precedence)? else {
            return Ok(Decision::Ineligible(Ineligibility::NoDate));
        };
        let days = days_until(date, today);
        if days > gate.due_within_days {
            return Ok(Decision::Ineligible(Ineligibility::OutsideWindow {
                days_until: days,
                window: gate.due_within_days,
            }));
        }
    }

    let decision = match &policy.variant {
        Variant::PriorityLabel {
            max_priority,
            labels,
            ..
        } => {
            let by_priority = max_priority
                .zip(record.priority)
                .is_some_and(|(threshold, priority)| priority.at_least(threshold));
            let by_label = record
                .labels
                .iter()
                .any(|label| labels.contains(&label.to_lowercase()));
            if by_priority || by_label {
                Decision::Eligible
            } else {
                Decision::Ineligible(Ineligibility::NoPriorityOrLabel)
            }
        }
        Variant::ProjectMirror => Decision::Eligible,
        Variant::Starred { markers } => {
            if has_marker(&record.title, markers) || has_marker(&record.notes, markers) {
                Decision::Eligible
            } else {
                Decision::Ineligible(Ineligibility::NotStarred)
            }
        }
        Variant::Recurrence => {
            if !record.completed {
                Decision::Ineligible(Ineligibility::NotCompleted)
            } else if matches!(
                extract_recurrence(record),
                Some(RecurrenceSpec::AfterCompletion { .. })
            ) {
                Decision::Eligible
            } else {
                Decision::Ineligible(Ineligibility::NoDirective)
            }
        }
    };
    Ok(decision)
}

/// Boolean form of [`evaluate`]. Records whose dates cannot be parsed are not eligible.
#[must_use]
pub fn is_eligible(record: &SourceRecord, policy: &SyncPolicy, today: NaiveDate) -> bool {
    evaluate(record, policy, today).is_ok_and(|decision| decision.is_eligible())
}

/// The date the timing gate and projection use, honoring precedence.
///
/// # Errors
///
/// Returns a `Data` error when the chosen date cannot be parsed.
pub fn effective_date(
    record: &SourceRecord,
    precedence: DatePrecedence,
) -> Result<Option<NaiveDate>> {
    let (first, first_field, second, second_field) = match precedence {
        DatePrecedence::Due => (&record.due, "due", &record.deadline, "deadline"),
        DatePrecedence::Deadline => (&record.deadline, "deadline", &record.due, "due"),
    };
    match (first, second) {
        (Some(value), _) => parse_due_date(value, &record.id, first_field).map(Some),
        (None, Some(value)) => parse_due_date(value, &record.id, second_field).map(Some),
        (None, None) => Ok(None),
    }
}

/// Map a source record to the fields its mirror should carry.
///
/// # Errors
///
/// Returns a `Data` error when the effective date cannot be parsed.
pub fn project(record: &SourceRecord, policy: &SyncPolicy) -> Result<NewRecord> {
    let due = effective_date(record, policy.date_precedence)?.map(format_due);

    let (title, notes) = match &policy.variant {
        Variant::PriorityLabel { origin, .. } => {
            let mut notes = format!("Synced from {origin}\nOriginal ID: {}", record.id);
            if let (Some(due), Some(deadline)) = (&record.due, &record.deadline) {
                match policy.date_precedence {
                    DatePrecedence::Due => notes.push_str(&format!("\nDeadline: {deadline}")),
                    DatePrecedence::Deadline => notes.push_str(&format!("\nDue: {due}")),
                }
            }
            (record.title.clone(), notes)
        }
        Variant::ProjectMirror => {
            let mut parts = Vec::new();
            if let Some(recurrence) = &record.recurrence {
                parts.push(recurrence.as_text());
            }
            if !record.notes.trim().is_empty() {
                parts.push(record.notes.clone());
            }
            (record.title.clone(), parts.join("\n\n"))
        }
        Variant::Starred { markers } => (
            strip_markers(&record.title, markers),
            strip_markers(&record.notes, markers),
        ),
        Variant::Recurrence => (record.title.clone(), record.notes.clone()),
    };

    Ok(NewRecord { title, notes, due })
}

/// Every projected field that differs between source and mirror.
///
/// # Errors
///
/// Returns a `Data` error when the source's effective date cannot be parsed.
pub fn drifted_fields(
    source: &SourceRecord,
    target: &TargetRecord,
    policy: &SyncPolicy,
) -> Result<Vec<DriftField>> {
    let projected = project(source, policy)?;
    let markers = policy.markers();
    let mut fields = Vec::new();

    if !text_matches(&projected.title, &target.title, markers) {
        fields.push(DriftField::Title);
    }
    if !text_matches(&projected.notes, &target.notes, markers) {
        fields.push(DriftField::Notes);
    }
    if policy.due_drift == DueDrift::Compared && !due_matches(projected.due.as_deref(), target) {
        fields.push(DriftField::Due);
    }
    Ok(fields)
}

/// Does the mirror need an update?
///
/// # Errors
///
/// Returns a `Data` error when the source's effective date cannot be parsed.
pub fn needs_update(source: &SourceRecord, target: &TargetRecord, policy: &SyncPolicy) -> Result<bool> {
    drifted_fields(source, target, policy).map(|fields| !fields.is_empty())
}

/// Build a patch carrying only the drifted fields.
///
/// # Errors
///
/// Returns a `Data` error when the source's effective date cannot be parsed.
pub fn build_patch(
    source: &SourceRecord,
    fields: &[DriftField],
    policy: &SyncPolicy,
) -> Result<RecordPatch> {
    let projected = project(source, policy)?;
    let mut patch = RecordPatch::default();
    for field in fields {
        match field {
            DriftField::Title => patch.title = Some(projected.title.clone()),
            DriftField::Notes => patch.notes = Some(projected.notes.clone()),
            DriftField::Due => patch.due = Some(projected.due.clone()),
        }
    }
    Ok(patch)
}

/// Parse an `every[!] N day(s)` directive out of free text.
///
/// `!` marks completion-based recurrence. Without it the matched text is
/// kept as an opaque calendar rule. A zero or overflowing day count, or no
/// match at all, yields `None`.
#[must_use]
pub fn parse_recurrence(text: &str) -> Option<RecurrenceSpec> {
    let caps = DIRECTIVE_RE.captures(text)?;
    let days: u32 = caps.get(2)?.as_str().parse().ok()?;
    if days == 0 {
        return None;
    }
    if caps.get(1).is_some() {
        Some(RecurrenceSpec::AfterCompletion { days })
    } else {
        Some(RecurrenceSpec::Calendar {
            rule: caps.get(0)?.as_str().to_string(),
        })
    }
}

/// Recurrence directive for a record: its own descriptor, else one found in notes.
#[must_use]
pub fn extract_recurrence(record: &SourceRecord) -> Option<RecurrenceSpec> {
    record
        .recurrence
        .clone()
        .or_else(|| parse_recurrence(&record.notes))
}

/// Does `text` end with one of `markers` (case-insensitive, trailing whitespace ignored)?
#[must_use]
pub fn has_marker(text: &str, markers: &[String]) -> bool {
    let trimmed = text.trim_end().to_lowercase();
    markers
        .iter()
        .filter(|marker| !marker.is_empty())
        .any(|marker| trimmed.ends_with(&marker.to_lowercase()))
}

/// Remove markers from text.
///
/// Non-ASCII markers (emoji) are removed wherever they occur; ASCII markers
/// only when they end the text. The result is trimmed.
#[must_use]
pub fn strip_markers(text: &str, markers: &[String]) -> String {
    let mut out = text.to_string();
    for marker in markers.iter().filter(|m| !m.is_empty() && !m.is_ascii()) {
        out = out.replace(marker.as_str(), "");
    }
    let mut trimmed = out.trim().to_string();
    loop {
        let lower = trimmed.to_ascii_lowercase();
        let Some(marker) = markers
            .iter()
            .filter(|m| !m.is_empty() && m.is_ascii())
            .find(|m| lower.ends_with(&m.to_ascii_lowercase()))
        else {
            break;
        };
        trimmed.truncate(trimmed.len() - marker.len());
        trimmed = trimmed.trim_end().to_string();
    }
    trimmed
}

fn text_matches(projected: &str, current: &str, markers: &[String]) -> bool {
    normalize_whitespace(&strip_markers(projected, markers))
        == normalize_whitespace(&strip_markers(current, markers))
}

fn due_matches(projected: Option<&str>, target: &TargetRecord) -> bool {
    match (projected, target.due.as_deref()) {
        (None, None) => true,
        (Some(want), Some(have)) => {
            let want = parse_due_date(want, &target.id, "due").ok();
            let have = parse_due_date(have, &target.id, "due").ok();
            want.is_some() && want == have
        }
        _ => false,
    }
}
