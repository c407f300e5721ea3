//! Reconciliation engine.
//!
//! One engine serves all four tools; the `SyncPolicy` decides what is
//! eligible, how records project, and which directions propagate.
//!
//! A pass runs in a fixed order:
//!
//! 1. Resolve the target container and read the source snapshot once.
//! 2. Read target state for every container a mapping points into.
//! 3. Teardown: completed or missing mirrors, and mirrors whose source is
//!    gone or no longer eligible, are resolved first. A source torn down
//!    in this phase is not recreated in the same pass.
//! 4. Diff the remaining eligible sources against the store: create,
//!    update, or leave alone.
//! 5. Execute the plan, then persist the store.
//!
//! `--limit` and `--project` narrow step 4 only. The teardown phase always
//! sees the full snapshot, otherwise filtered-out sources would look gone.

mod executor;
mod plan;

pub use executor::{ExecutionSummary, apply};
pub use plan::{Action, ContainerRef, PassCounts, Plan, TeardownReason};

use crate::client::{FetchScope, SourceClient, TargetClient};
use crate::error::{Result, SyncError};
use crate::matcher::{self, Decision, Ineligibility};
use crate::model::{Container, NewRecord, RecurrenceSpec, SourceRecord, TargetRecord};
use crate::policy::{ContainerStrategy, DEFAULT_CONTAINER, INBOX_GROUP, SyncPolicy};
use crate::store::IdentityStore;
use crate::util::time::{format_due, parse_due_date};
use chrono::{DateTime, Days, Duration, Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Diff-phase narrowing requested on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassFilters {
    /// Act on at most this many eligible sources.
    pub limit: Option<usize>,
    /// Only act on sources in this group (by name or id).
    pub project: Option<String>,
}

/// Result of one `run_pass`.
#[derive(Debug, Clone, Serialize)]
pub struct PassResult {
    pub tool: String,
    pub dry_run: bool,
    pub actions: usize,
    pub counts: PassCounts,
    pub finished_at: DateTime<Utc>,
}

impl PassResult {
    /// The single summary line printed after a pass.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let prefix = if self.dry_run {
            "Dry run complete"
        } else {
            "Sync pass complete"
        };
        format!("{prefix}: {}", self.counts)
    }
}

/// Target-side view gathered before planning.
#[derive(Debug, Default)]
struct TargetView {
    /// Every listed target record by id.
    records: HashMap<String, TargetRecord>,
    /// Records in the containers this tool owns outright.
    owned: Vec<TargetRecord>,
    /// Containers that could not be read this pass.
    unreadable: BTreeSet<String>,
    errors: usize,
}

/// Orchestrates one pass for one policy against one store.
pub struct ReconciliationEngine<'a> {
    policy: &'a SyncPolicy,
    store: &'a mut IdentityStore,
    now: DateTime<Utc>,
    today: NaiveDate,
    filters: PassFilters,
}

impl<'a> ReconciliationEngine<'a> {
    /// Create an engine that owns `store` for the duration of the pass.
    #[must_use]
    pub fn new(policy: &'a SyncPolicy, store: &'a mut IdentityStore) -> Self {
        Self {
            policy,
            store,
            now: Utc::now(),
            today: Local::now().date_naive(),
            filters: PassFilters::default(),
        }
    }

    /// Pin the clock; "today" becomes the UTC date of `now`.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self.today = now.date_naive();
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: PassFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Compute the ordered action plan without touching either service.
    ///
    /// # Errors
    ///
    /// Returns an error when the source snapshot or the target container
    /// list cannot be read, or when the configured container cannot be
    /// resolved. Per-record problems are counted in the plan instead.
    pub fn plan(&self, source: &dyn SourceClient, target: &dyn TargetClient) -> Result<Plan> {
        let containers = target.list_containers()?;
        let single = self.resolve_single_container(&containers)?;

        let mirror_id = match &single {
            Some(ContainerRef::Existing(id)) if !self.policy.tool.uses_separate_source() => {
                Some(id.as_str())
            }
            _ => None,
        };
        let scope = effective_scope(self.policy, mirror_id);
        let sources = source.list_records(&scope)?;
        debug!(
            tool = %self.policy.tool,
            sources = sources.len(),
            mappings = self.store.len(),
            "Fetched source snapshot"
        );

        if !self.policy.is_mapped() {
            return Ok(self.plan_recurrence(&sources));
        }

        let view = self.read_targets(target, &containers, single.as_ref());
        let by_id: BTreeMap<&str, &SourceRecord> =
            sources.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut plan = Plan {
            errors: view.errors,
            ..Plan::default()
        };
        let mut retired: BTreeSet<String> = BTreeSet::new();
        let mut held: BTreeSet<String> = BTreeSet::new();

        self.plan_teardown(&by_id, &view, &mut plan, &mut retired, &mut held);
        self.plan_orphan_sweep(&view, &mut plan);
        self.plan_diff(&sources, &containers, single.as_ref(), &view, &retired, &held, &mut plan);

        Ok(plan)
    }

    /// Plan, execute, and persist one pass.
    ///
    /// With `dry_run` the plan is logged and nothing is executed or saved.
    ///
    /// # Errors
    ///
    /// Returns planning errors (see [`Self::plan`]) and store save failures.
    pub fn run_pass(
        &mut self,
        source: &dyn SourceClient,
        target: &dyn TargetClient,
        dry_run: bool,
    ) -> Result<PassResult> {
        let plan = self.plan(source, target)?;

        let counts = if dry_run {
            for action in &plan.actions {
                if !matches!(action, Action::Noop { .. }) {
                    info!(action = action.kind(), "[dry-run] would {action}");
                }
            }
            plan.planned_counts()
        } else {
            let mut counts = apply(&plan, source, target, self.store, self.now);
            counts.skipped += plan.skipped;
            counts.errors += plan.errors;
            self.store.mark_synced(self.now);
            self.store.save()?;
            counts
        };

        Ok(PassResult {
            tool: self.policy.tool.to_string(),
            dry_run,
            actions: plan.actions.len(),
            counts,
            finished_at: self.now,
        })
    }

    fn resolve_single_container(&self, containers: &[Container]) -> Result<Option<ContainerRef>> {
        let ContainerStrategy::Single { name } = &self.policy.containers else {
            return Ok(None);
        };
        if name == DEFAULT_CONTAINER {
            return containers
                .first()
                .map(|c| Some(ContainerRef::Existing(c.id.clone())))
                .ok_or_else(|| SyncError::ContainerUnavailable { name: name.clone() });
        }
        Ok(Some(
            containers
                .iter()
                .find(|c| &c.name == name)
                .map_or_else(
                    || ContainerRef::New {
                        group_key: None,
                        name: name.clone(),
                    },
                    |c| ContainerRef::Existing(c.id.clone()),
                ),
        ))
    }

    fn read_targets(
        &self,
        target: &dyn TargetClient,
        containers: &[Container],
        single: Option<&ContainerRef>,
    ) -> TargetView {
        let existing: BTreeSet<&str> = containers.iter().map(|c| c.id.as_str()).collect();
        let single_id = match single {
            Some(ContainerRef::Existing(id)) => Some(id.as_str()),
            _ => None,
        };

        let mut wanted: BTreeSet<&str> = self
            .store
            .mappings()
            .map(|m| m.container_id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        wanted.extend(single_id);
        wanted.extend(
            self.store
                .containers()
                .map(|(_, id)| id)
                .filter(|id| existing.contains(id)),
        );

        let mut view = TargetView::default();
        for container_id in wanted {
            match target.list_records(container_id, true) {
                Ok(records) => {
                    let owned = single_id == Some(container_id);
                    for record in records {
                        if owned {
                            view.owned.push(record.clone());
                        }
                        view.records.insert(record.id.clone(), record);
                    }
                }
                Err(err) if err.is_not_found() => {
                    debug!(container_id = %container_id, "Container gone; treating as empty");
                }
                Err(err) => {
                    warn!(container_id = %container_id, error = %err, "Cannot read container; holding its mappings");
                    view.unreadable.insert(container_id.to_string());
                    view.errors += 1;
                }
            }
        }

        // Mappings written before container ids were recorded live in the single container.
        if let Some(id) = single_id {
            if view.unreadable.contains(id) {
                view.unreadable.insert(String::new());
            }
        }
        view
    }

    fn plan_teardown(
        &self,
        sources: &BTreeMap<&str, &SourceRecord>,
        view: &TargetView,
        plan: &mut Plan,
        retired: &mut BTreeSet<String>,
        held: &mut BTreeSet<String>,
    ) {
        for mapping in self.store.mappings() {
            if view.unreadable.contains(&mapping.container_id) {
                held.insert(mapping.source_id.clone());
                continue;
            }

            let mirror = view.records.get(&mapping.target_id);
            let source = sources.get(mapping.source_id.as_str()).copied();

            match mirror {
                None | Some(TargetRecord {
                    completed: true, ..
                }) => {
                    // Without backward completion the user's tick stays on the
                    // mirror for as long as the source still qualifies.
                    if let (false, Some(mirror), Some(source)) =
                        (self.policy.backward_completion, mirror, source)
                    {
                        match matcher::evaluate(source, self.policy, self.today) {
                            Ok(Decision::Eligible) => {
                                debug!(source_id = %source.id, target_id = %mirror.id, "Keeping completed mirror");
                                plan.actions.push(Action::Noop {
                                    source_id: mapping.source_id.clone(),
                                    target_id: mirror.id.clone(),
                                });
                                held.insert(mapping.source_id.clone());
                                continue;
                            }
                            Ok(Decision::Ineligible(_)) => {}
                            Err(err) => {
                                warn!(source_id = %source.id, error = %err, "Skipping malformed record");
                                held.insert(mapping.source_id.clone());
                                plan.skipped += 1;
                                continue;
                            }
                        }
                    }
                    if self.policy.backward_completion {
                        if let Some(source) = source {
                            if self.completion_allowed(source, mirror) {
                                plan.actions.push(Action::CompleteSource {
                                    source_id: mapping.source_id.clone(),
                                    target_id: mapping.target_id.clone(),
                                });
                            }
                        }
                    }
                    if let Some(mirror) = mirror {
                        info!(source_id = %mapping.source_id, target_id = %mirror.id, "Mirror completed");
                        plan.actions.push(Action::DeleteTarget {
                            target_id: mirror.id.clone(),
                            container_id: mirror.container_id.clone(),
                            source_id: Some(mapping.source_id.clone()),
                            reason: TeardownReason::TargetCompleted,
                        });
                    } else {
                        info!(source_id = %mapping.source_id, target_id = %mapping.target_id, "Mirror missing");
                        plan.actions.push(Action::Forget {
                            source_id: mapping.source_id.clone(),
                            target_id: mapping.target_id.clone(),
                            reason: TeardownReason::TargetMissing,
                        });
                    }
                    retired.insert(mapping.source_id.clone());
                }
                Some(mirror) => {
                    let reason = match source {
                        None => Some(TeardownReason::SourceGone),
                        Some(source) => match matcher::evaluate(source, self.policy, self.today) {
                            Ok(Decision::Eligible) => None,
                            Ok(Decision::Ineligible(why)) => Some(TeardownReason::Ineligible(why)),
                            Err(err) => {
                                warn!(source_id = %source.id, error = %err, "Skipping malformed record");
                                held.insert(mapping.source_id.clone());
                                plan.skipped += 1;
                                continue;
                            }
                        },
                    };
                    if let Some(reason) = reason {
                        if self.policy.propagate_deletions {
                            debug!(source_id = %mapping.source_id, reason = %reason, "Tearing down mirror");
                            plan.actions.push(Action::DeleteTarget {
                                target_id: mirror.id.clone(),
                                container_id: mirror.container_id.clone(),
                                source_id: Some(mapping.source_id.clone()),
                                reason,
                            });
                        }
                        retired.insert(mapping.source_id.clone());
                    }
                }
            }
        }
    }

    /// Completion guard: a source whose date moved well past the mirror's
    /// (a recurring task that already advanced) is not completed again.
    fn completion_allowed(&self, source: &SourceRecord, mirror: Option<&TargetRecord>) -> bool {
        let (Some(guard), Some(mirror)) = (self.policy.completion_guard_days, mirror) else {
            return true;
        };
        let Some(mirror_due) = mirror
            .due
            .as_deref()
            .and_then(|due| parse_due_date(due, &mirror.id, "due").ok())
        else {
            return true;
        };
        let Ok(Some(source_date)) = matcher::effective_date(source, self.policy.date_precedence)
        else {
            return true;
        };
        if source_date > mirror_due + Duration::days(guard) {
            warn!(
                source_id = %source.id,
                source_date = %source_date,
                mirror_due = %mirror_due,
                "Source date moved past the completed mirror; not completing source"
            );
            return false;
        }
        true
    }

    fn plan_orphan_sweep(&self, view: &TargetView, plan: &mut Plan) {
        if !self.policy.sweep_completed_orphans {
            return;
        }
        for record in &view.owned {
            if record.completed && self.store.get_by_target(&record.id).is_none() {
                debug!(target_id = %record.id, "Sweeping completed orphan");
                plan.actions.push(Action::DeleteTarget {
                    target_id: record.id.clone(),
                    container_id: record.container_id.clone(),
                    source_id: None,
                    reason: TeardownReason::OrphanCompleted,
                });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_diff(
        &self,
        sources: &[SourceRecord],
        containers: &[Container],
        single: Option<&ContainerRef>,
        view: &TargetView,
        retired: &BTreeSet<String>,
        held: &BTreeSet<String>,
        plan: &mut Plan,
    ) {
        let mut ordered: Vec<&SourceRecord> = sources.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let mut acted = 0usize;

        for record in ordered {
            if retired.contains(&record.id) || held.contains(&record.id) {
                continue;
            }
            if !self.in_project(record) {
                continue;
            }

            match matcher::evaluate(record, self.policy, self.today) {
                Ok(Decision::Eligible) => {}
                Ok(Decision::Ineligible(why)) => {
                    debug!(source_id = %record.id, reason = %why, "Ineligible: '{}'", record.title);
                    plan.skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(source_id = %record.id, error = %err, "Skipping malformed record");
                    plan.skipped += 1;
                    continue;
                }
            }

            if self.filters.limit.is_some_and(|limit| acted >= limit) {
                debug!(source_id = %record.id, "Limit reached");
                plan.skipped += 1;
                continue;
            }
            acted += 1;
            debug!(source_id = %record.id, "Eligible: '{}'", record.title);

            match self.diff_one(record, containers, single, view) {
                Ok(action) => plan.actions.push(action),
                Err(err) => {
                    warn!(source_id = %record.id, error = %err, "Skipping malformed record");
                    plan.skipped += 1;
                }
            }
        }
    }

    fn diff_one(
        &self,
        record: &SourceRecord,
        containers: &[Container],
        single: Option<&ContainerRef>,
        view: &TargetView,
    ) -> Result<Action> {
        let mirror = self
            .store
            .get_by_source(&record.id)
            .and_then(|m| view.records.get(&m.target_id));

        let Some(mirror) = mirror else {
            let fields = matcher::project(record, self.policy)?;
            let container = match single {
                Some(container) => container.clone(),
                None => self.group_container(record, containers),
            };
            return Ok(Action::Create {
                source_id: record.id.clone(),
                container,
                fields,
            });
        };

        let drifted = matcher::drifted_fields(record, mirror, self.policy)?;
        if drifted.is_empty() {
            debug!(source_id = %record.id, target_id = %mirror.id, "No drift");
            return Ok(Action::Noop {
                source_id: record.id.clone(),
                target_id: mirror.id.clone(),
            });
        }
        debug!(source_id = %record.id, target_id = %mirror.id, fields = ?drifted, "Drift");
        Ok(Action::Update {
            source_id: record.id.clone(),
            target_id: mirror.id.clone(),
            container_id: mirror.container_id.clone(),
            patch: matcher::build_patch(record, &drifted, self.policy)?,
        })
    }

    fn group_container(&self, record: &SourceRecord, containers: &[Container]) -> ContainerRef {
        let inbox_name = match &self.policy.containers {
            ContainerStrategy::PerGroup { inbox_name } => inbox_name.as_str(),
            _ => INBOX_GROUP,
        };
        let group_key = record.group_id.clone().unwrap_or_else(|| "inbox".to_string());
        let name = match record.group_name.as_deref() {
            Some(name) if !name.eq_ignore_ascii_case(INBOX_GROUP) => name.to_string(),
            _ => inbox_name.to_string(),
        };

        if let Some(id) = self.store.container_for_group(&group_key) {
            if containers.iter().any(|c| c.id == id) {
                return ContainerRef::Existing(id.to_string());
            }
            debug!(group = %group_key, container_id = %id, "Mapped list no longer exists");
        }
        containers.iter().find(|c| c.name == name).map_or(
            ContainerRef::New {
                group_key: Some(group_key.clone()),
                name,
            },
            |c| ContainerRef::Adopt {
                group_key: group_key.clone(),
                id: c.id.clone(),
            },
        )
    }

    fn in_project(&self, record: &SourceRecord) -> bool {
        self.filters.project.as_deref().is_none_or(|project| {
            record.group_name.as_deref() == Some(project) || record.group_id.as_deref() == Some(project)
        })
    }

    fn plan_recurrence(&self, sources: &[SourceRecord]) -> Plan {
        let mut plan = Plan::default();
        let mut ordered: Vec<&SourceRecord> = sources.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let mut acted = 0usize;

        for record in ordered {
            if !self.in_project(record) {
                continue;
            }
            if !record.completed {
                continue;
            }
            let Some(RecurrenceSpec::AfterCompletion { days }) = matcher::extract_recurrence(record)
            else {
                debug!(record_id = %record.id, reason = %Ineligibility::NoDirective, "Ineligible");
                plan.skipped += 1;
                continue;
            };
            let (Some(completed_at), Some(container_id)) = (record.completed_at, &record.group_id)
            else {
                warn!(record_id = %record.id, "Completed record has no completion time; skipping");
                plan.skipped += 1;
                continue;
            };
            let Some(due) = completed_at
                .date_naive()
                .checked_add_days(Days::new(u64::from(days)))
            else {
                warn!(record_id = %record.id, days, "Next occurrence is out of range; skipping");
                plan.skipped += 1;
                continue;
            };
            if self.filters.limit.is_some_and(|limit| acted >= limit) {
                plan.skipped += 1;
                continue;
            }
            acted += 1;

            plan.actions.push(Action::Recur {
                record_id: record.id.clone(),
                container_id: container_id.clone(),
                successor: NewRecord {
                    title: record.title.clone(),
                    notes: record.notes.clone(),
                    due: Some(format_due(due)),
                },
            });
        }
        plan
    }
}

/// Scope a tool's source fetch would use, with the mirror container excluded.
#[must_use]
pub fn effective_scope(policy: &SyncPolicy, mirror_container: Option<&str>) -> FetchScope {
    let mut scope = policy.scope.clone();
    if let Some(id) = mirror_container {
        scope.exclude_group_ids.insert(id.to_string());
    }
    scope
}
