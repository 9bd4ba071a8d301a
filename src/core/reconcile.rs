//! Reconciliation decision engine.
//!
//! Pure function from (local issues, prior sync state, dependency graph,
//! force flag) to an ordered action sequence. No I/O, no clock, no
//! randomness: identical inputs always produce the identical plan. The
//! full decision table lives in `decide` so it is enumerable and testable
//! in isolation from the driver.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::error::CoreError;
use super::fingerprint::{ContentFingerprint, fingerprint};
use super::graph::DependencyGraph;
use super::identity::{IssueId, RemoteHandle};
use super::issue::IssueDefinition;

/// Per-issue decision for one pass. Transient: recomputed every pass,
/// never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum SyncAction {
    Create,
    Update,
    Skip { reason: String },
    Blocked { unmet: BTreeSet<IssueId> },
    Conflict { reason: String },
}

impl SyncAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Skip { .. } => "skip",
            Self::Blocked { .. } => "blocked",
            Self::Conflict { .. } => "conflict",
        }
    }

    /// Whether applying this action requires a remote call.
    pub fn requires_remote(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// What the reconciler reads from the prior state store. The reconciler
/// never sees (and never mutates) the full persisted record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriorRecord {
    pub fingerprint: ContentFingerprint,
    pub remote_handle: Option<RemoteHandle>,
}

/// Ordered output of one reconcile run.
#[derive(Clone, Debug, Default)]
pub struct ReconcilePlan {
    /// One entry per local issue id, in dependency-topological order.
    pub actions: Vec<(IssueId, SyncAction)>,
    /// Fresh fingerprints for issues that passed validation; the driver
    /// persists these after a confirmed remote success.
    pub fingerprints: BTreeMap<IssueId, ContentFingerprint>,
    /// Issues refused as malformed (fatal to that issue only).
    pub malformed: Vec<(IssueId, CoreError)>,
}

impl ReconcilePlan {
    pub fn action_for(&self, id: &IssueId) -> Option<&SyncAction> {
        self.actions
            .iter()
            .find(|(action_id, _)| action_id == id)
            .map(|(_, action)| action)
    }

    /// Ids whose action needs a gateway call this pass.
    pub fn remote_work(&self) -> usize {
        self.actions
            .iter()
            .filter(|(_, a)| a.requires_remote())
            .count()
    }
}

/// Compute the ordered action set for one pass.
///
/// Ordering follows `graph.topological_order()`, so a dependency is always
/// actioned before its dependents within the same pass.
pub fn reconcile(
    issues: &[IssueDefinition],
    prior: &BTreeMap<IssueId, PriorRecord>,
    graph: &DependencyGraph,
    force: bool,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    // Collapse duplicates: identical twins are harmless, disagreeing twins
    // are a conflict surfaced without mutation.
    let mut by_id: BTreeMap<IssueId, &IssueDefinition> = BTreeMap::new();
    let mut conflicts: BTreeMap<IssueId, String> = BTreeMap::new();
    for issue in issues {
        match by_id.get(&issue.id) {
            None => {
                by_id.insert(issue.id.clone(), issue);
            }
            Some(first) if *first == issue => {}
            Some(_) => {
                conflicts.insert(
                    issue.id.clone(),
                    "duplicate local definitions disagree on content".into(),
                );
            }
        }
    }

    for (id, issue) in &by_id {
        if conflicts.contains_key(id) {
            continue;
        }
        match fingerprint(issue) {
            Ok(fp) => {
                plan.fingerprints.insert(id.clone(), fp);
            }
            Err(err) => plan.malformed.push((id.clone(), err)),
        }
    }

    // A dependency is "met" for decision purposes when it is defined
    // locally (it will be actioned earlier in this same pass) or already
    // exists remotely. Apply-time failures re-block dependents in the
    // driver, not here.
    let mut met: BTreeSet<IssueId> = by_id.keys().cloned().collect();
    met.extend(
        prior
            .iter()
            .filter(|(_, record)| record.remote_handle.is_some())
            .map(|(id, _)| id.clone()),
    );

    for id in graph.topological_order() {
        if let Some(reason) = conflicts.get(&id) {
            plan.actions.push((
                id.clone(),
                SyncAction::Conflict {
                    reason: reason.clone(),
                },
            ));
            continue;
        }
        let Some(fp) = plan.fingerprints.get(&id) else {
            // Malformed: reported through `plan.malformed`, no action.
            continue;
        };
        let action = decide(fp, prior.get(&id), force);
        let action = if action.requires_remote() {
            let unmet = graph.unmet_dependencies(&id, &met);
            if unmet.is_empty() {
                action
            } else {
                SyncAction::Blocked { unmet }
            }
        } else {
            action
        };
        plan.actions.push((id, action));
    }

    plan
}

/// The content-comparison half of the decision table (rules 1-4).
fn decide(fresh: &ContentFingerprint, prior: Option<&PriorRecord>, force: bool) -> SyncAction {
    match prior {
        _ if force => match prior {
            Some(_) => SyncAction::Update,
            None => SyncAction::Create,
        },
        None => SyncAction::Create,
        Some(record) if record.fingerprint == *fresh => SyncAction::Skip {
            reason: "unchanged".into(),
        },
        Some(_) => SyncAction::Update,
    }
}
