//! Sync driver: orchestrates one pass.
//!
//! load local issues -> build graph -> load prior state -> reconcile ->
//! apply (or simulate) in dependency order -> commit state atomically once.
//!
//! Remote calls are the dominant latency cost, so independent subtrees of
//! the graph are dispatched to a bounded worker pool over crossbeam
//! channels. The scheduler thread is the single writer of the report and
//! the in-memory state; workers only execute gateway calls and send
//! results back. For any edge `A depends_on B`, B's outcome is fully
//! resolved before A is dispatched; if B did not succeed, A is re-blocked
//! instead of dispatched.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender, unbounded};
use time::OffsetDateTime;

use crate::Result;
use crate::core::{
    DependencyGraph, IssueDefinition, IssueId, RemoteHandle, SyncAction, reconcile,
};
use crate::gateway::{
    GatewayError, LabelCatalog, LabelRef, LabelSpec, MilestoneNumber, MilestoneSpec,
    RemoteGateway,
};
use crate::report::{Outcome, PassReport};
use crate::store::{SyncRecord, SyncStateStore};

const DEFAULT_WORKERS: usize = 4;

/// Whether a pass mutates anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Invoke the gateway and commit state at the end.
    Apply,
    /// Record intended actions; no remote calls, no state mutation.
    DryRun,
}

/// External stop signal. In-flight gateway calls finish; not-yet-started
/// actions are never dispatched.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct SyncDriver {
    store: SyncStateStore,
    gateway: Arc<dyn RemoteGateway>,
    labels: LabelCatalog,
    label_specs: Vec<LabelSpec>,
    milestone_specs: Vec<MilestoneSpec>,
    workers: usize,
}

struct Job {
    id: IssueId,
    issue: IssueDefinition,
    labels: BTreeSet<LabelRef>,
    milestone: Option<MilestoneNumber>,
    kind: JobKind,
}

#[derive(Clone, Copy)]
enum JobKind {
    Create,
    Update(RemoteHandle),
}

enum AppliedChange {
    Created(RemoteHandle),
    Updated(RemoteHandle),
}

struct JobResult {
    id: IssueId,
    result: std::result::Result<AppliedChange, GatewayError>,
}

/// What happens to an issue once its dependencies have resolved.
enum Slot {
    /// Resolves without touching the gateway.
    Immediate(Outcome),
    /// Needs a remote call (Create or Update).
    Remote(SyncAction),
}

struct SlotState {
    slot: Option<Slot>,
    remaining: usize,
    failed_deps: BTreeSet<IssueId>,
}

impl SyncDriver {
    pub fn new(store: SyncStateStore, gateway: Arc<dyn RemoteGateway>, labels: LabelCatalog) -> Self {
        Self {
            store,
            gateway,
            labels,
            label_specs: LabelSpec::classification_defaults(),
            milestone_specs: Vec::new(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Label definitions provisioned remotely each apply pass, on top of
    /// the classification defaults.
    pub fn with_label_specs(mut self, specs: Vec<LabelSpec>) -> Self {
        self.label_specs.extend(specs);
        self
    }

    /// Milestone definitions provisioned remotely each apply pass.
    pub fn with_milestone_specs(mut self, specs: Vec<MilestoneSpec>) -> Self {
        self.milestone_specs = specs;
        self
    }

    /// Run one sync pass.
    ///
    /// Pass-level failures (cycle, corrupt state) return `Err` before any
    /// remote mutation. Per-issue failures land in the report; siblings
    /// continue, dependents of the failure are re-blocked.
    pub fn run(
        &self,
        issues: &[IssueDefinition],
        mode: SyncMode,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<PassReport> {
        let graph = DependencyGraph::build(issues)?;
        let mut state = self.store.load()?;
        let prior = state.prior_records();
        let plan = reconcile(issues, &prior, &graph, force);
        let dry_run = mode == SyncMode::DryRun;
        tracing::info!(
            issues = graph.len(),
            remote = plan.remote_work(),
            malformed = plan.malformed.len(),
            force,
            dry_run,
            "pass plan computed"
        );

        // Provision labels and milestones before any issue mutation; a
        // provisioning failure aborts the pass with no issue touched.
        let milestones: BTreeMap<String, MilestoneNumber> =
            if mode == SyncMode::Apply && plan.remote_work() > 0 {
                self.gateway.ensure_labels(&self.label_specs)?;
                self.gateway.ensure_milestones(&self.milestone_specs)?
            } else {
                BTreeMap::new()
            };

        // First definition wins for duplicate ids; disagreeing duplicates
        // already carry a Conflict action and are never dispatched.
        let mut by_id: BTreeMap<IssueId, &IssueDefinition> = BTreeMap::new();
        for issue in issues {
            by_id.entry(issue.id.clone()).or_insert(issue);
        }

        let mut slots: BTreeMap<IssueId, SlotState> = BTreeMap::new();
        let mut queue: VecDeque<IssueId> = VecDeque::new();
        for id in graph.topological_order() {
            let slot = if let Some((_, err)) =
                plan.malformed.iter().find(|(bad_id, _)| *bad_id == id)
            {
                Slot::Immediate(Outcome::Failed {
                    detail: err.to_string(),
                    transient: false,
                })
            } else {
                match plan.action_for(&id) {
                    Some(action @ (SyncAction::Create | SyncAction::Update)) => {
                        Slot::Remote(action.clone())
                    }
                    Some(SyncAction::Skip { reason }) => Slot::Immediate(Outcome::Skipped {
                        reason: reason.clone(),
                    }),
                    Some(SyncAction::Blocked { unmet }) => Slot::Immediate(Outcome::Blocked {
                        unmet: unmet.clone(),
                    }),
                    Some(SyncAction::Conflict { reason }) => Slot::Immediate(Outcome::Conflict {
                        reason: reason.clone(),
                    }),
                    // Unreachable: every non-malformed node has an action.
                    None => continue,
                }
            };
            let remaining = graph.local_dependencies(&id).len();
            if remaining == 0 {
                queue.push_back(id.clone());
            }
            slots.insert(
                id,
                SlotState {
                    slot: Some(slot),
                    remaining,
                    failed_deps: BTreeSet::new(),
                },
            );
        }

        let (job_tx, job_rx) = unbounded::<Job>();
        let (result_tx, result_rx) = unbounded::<JobResult>();

        let mut report = PassReport::default();
        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let job_rx: Receiver<Job> = job_rx.clone();
                let result_tx: Sender<JobResult> = result_tx.clone();
                let gateway = Arc::clone(&self.gateway);
                scope.spawn(move || {
                    while let Ok(job) = job_rx.recv() {
                        let result = execute(gateway.as_ref(), &job);
                        if result_tx
                            .send(JobResult { id: job.id, result })
                            .is_err()
                        {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            let mut in_flight = 0usize;
            loop {
                while let Some(id) = queue.pop_front() {
                    let entry = slots.get_mut(&id).expect("queued ids have slots");
                    let Some(slot) = entry.slot.take() else {
                        continue;
                    };
                    if !entry.failed_deps.is_empty() {
                        let unmet = entry.failed_deps.clone();
                        resolve(
                            &graph,
                            &mut slots,
                            &mut queue,
                            &mut report,
                            id,
                            Outcome::Blocked { unmet },
                        );
                        continue;
                    }
                    match slot {
                        Slot::Immediate(outcome) => {
                            resolve(&graph, &mut slots, &mut queue, &mut report, id, outcome);
                        }
                        Slot::Remote(action) => {
                            if mode == SyncMode::DryRun {
                                resolve(
                                    &graph,
                                    &mut slots,
                                    &mut queue,
                                    &mut report,
                                    id,
                                    Outcome::Simulated { action },
                                );
                                continue;
                            }
                            if cancel.is_cancelled() {
                                resolve(
                                    &graph,
                                    &mut slots,
                                    &mut queue,
                                    &mut report,
                                    id,
                                    Outcome::Failed {
                                        detail: "cancelled before dispatch".into(),
                                        transient: true,
                                    },
                                );
                                continue;
                            }
                            let issue = *by_id.get(&id).expect("actioned ids are local");
                            let labels = match self.labels.resolve(
                                issue.status,
                                issue.priority,
                                issue.issue_type,
                            ) {
                                Ok(labels) => labels,
                                Err(err) => {
                                    resolve(
                                        &graph,
                                        &mut slots,
                                        &mut queue,
                                        &mut report,
                                        id,
                                        Outcome::Failed {
                                            detail: err.to_string(),
                                            transient: false,
                                        },
                                    );
                                    continue;
                                }
                            };
                            let milestone = match &issue.milestone {
                                None => None,
                                Some(title) => match milestones.get(title) {
                                    Some(number) => Some(*number),
                                    None => {
                                        resolve(
                                            &graph,
                                            &mut slots,
                                            &mut queue,
                                            &mut report,
                                            id,
                                            Outcome::Failed {
                                                detail: format!("unknown milestone `{title}`"),
                                                transient: false,
                                            },
                                        );
                                        continue;
                                    }
                                },
                            };
                            let kind = match action {
                                // A prior record without a handle has nothing
                                // to patch remotely; fall back to create.
                                SyncAction::Update => match prior
                                    .get(&id)
                                    .and_then(|record| record.remote_handle)
                                {
                                    Some(handle) => JobKind::Update(handle),
                                    None => JobKind::Create,
                                },
                                _ => JobKind::Create,
                            };
                            job_tx
                                .send(Job {
                                    id,
                                    issue: issue.clone(),
                                    labels,
                                    milestone,
                                    kind,
                                })
                                .expect("workers outlive the scheduler loop");
                            in_flight += 1;
                        }
                    }
                }

                if in_flight == 0 {
                    break;
                }
                let JobResult { id, result } = result_rx.recv().expect("in-flight job result");
                in_flight -= 1;
                let outcome = match result {
                    Ok(change) => {
                        let fingerprint = plan
                            .fingerprints
                            .get(&id)
                            .cloned()
                            .expect("dispatched ids have fingerprints");
                        let issue = *by_id.get(&id).expect("dispatched ids are local");
                        let handle = match change {
                            AppliedChange::Created(handle) | AppliedChange::Updated(handle) => {
                                handle
                            }
                        };
                        // Timestamps are recorded only after the action
                        // applied, never used in the decision.
                        state.upsert(SyncRecord {
                            issue_id: id.clone(),
                            fingerprint,
                            remote_handle: Some(handle),
                            last_synced_at: OffsetDateTime::now_utc(),
                            last_status: issue.status,
                        });
                        match change {
                            AppliedChange::Created(handle) => {
                                tracing::info!(issue = %id, %handle, "created remote issue");
                                Outcome::Created { handle }
                            }
                            AppliedChange::Updated(handle) => {
                                tracing::info!(issue = %id, %handle, "updated remote issue");
                                Outcome::Updated { handle }
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(issue = %id, error = %err, "gateway action failed");
                        Outcome::Failed {
                            detail: err.detail.clone(),
                            transient: err.is_transient(),
                        }
                    }
                };
                resolve(&graph, &mut slots, &mut queue, &mut report, id, outcome);
            }
            drop(job_tx);
        });

        report.cancelled = cancel.is_cancelled();

        // Failed issues kept their prior records untouched, so the next
        // pass recomputes the same decision instead of drifting.
        if mode == SyncMode::Apply {
            self.store.commit(&state)?;
        }
        Ok(report)
    }
}

/// Record an outcome and release (or re-block) the issue's dependents.
fn resolve(
    graph: &DependencyGraph,
    slots: &mut BTreeMap<IssueId, SlotState>,
    queue: &mut VecDeque<IssueId>,
    report: &mut PassReport,
    id: IssueId,
    outcome: Outcome,
) {
    let success = outcome.is_success();
    for dependent in graph.dependents_of(&id) {
        let Some(entry) = slots.get_mut(&dependent) else {
            continue;
        };
        entry.remaining = entry.remaining.saturating_sub(1);
        if !success {
            entry.failed_deps.insert(id.clone());
        }
        if entry.remaining == 0 && entry.slot.is_some() {
            queue.push_back(dependent);
        }
    }
    report.record(id, outcome);
}

fn execute(
    gateway: &dyn RemoteGateway,
    job: &Job,
) -> std::result::Result<AppliedChange, GatewayError> {
    match job.kind {
        JobKind::Create => gateway
            .create_issue(&job.issue, &job.labels, job.milestone)
            .map(AppliedChange::Created),
        JobKind::Update(handle) => gateway
            .update_issue(handle, &job.issue, &job.labels, job.milestone)
            .map(|()| AppliedChange::Updated(handle)),
    }
}
