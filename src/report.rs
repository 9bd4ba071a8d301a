//! Per-pass outcome report.
//!
//! Every local issue ends the pass with exactly one outcome; nothing is
//! silently dropped. The exit-code policy consumed by the CLI lives here
//! so it is testable without a terminal.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::{IssueId, RemoteHandle, SyncAction};

/// Final per-issue outcome of one pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    Created { handle: RemoteHandle },
    Updated { handle: RemoteHandle },
    Skipped { reason: String },
    /// Dry-run stand-in for a remote action that was not performed.
    Simulated { action: SyncAction },
    Blocked { unmet: BTreeSet<IssueId> },
    Conflict { reason: String },
    Failed { detail: String, transient: bool },
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Skipped { .. } => "skipped",
            Self::Simulated { .. } => "simulated",
            Self::Blocked { .. } => "blocked",
            Self::Conflict { .. } => "conflict",
            Self::Failed { .. } => "failed",
        }
    }

    /// Success or no-op: the issue's state is allowed to be committed.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Created { .. } | Self::Updated { .. } | Self::Skipped { .. } | Self::Simulated { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub simulated: usize,
    pub blocked: usize,
    pub conflicts: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PassReport {
    pub outcomes: BTreeMap<IssueId, Outcome>,
    /// The pass saw a stop signal; undispatched work was not attempted.
    pub cancelled: bool,
}

impl PassReport {
    pub fn record(&mut self, id: IssueId, outcome: Outcome) {
        self.outcomes.insert(id, outcome);
    }

    pub fn outcome_for(&self, id: &IssueId) -> Option<&Outcome> {
        self.outcomes.get(id)
    }

    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for outcome in self.outcomes.values() {
            match outcome {
                Outcome::Created { .. } => counts.created += 1,
                Outcome::Updated { .. } => counts.updated += 1,
                Outcome::Skipped { .. } => counts.skipped += 1,
                Outcome::Simulated { .. } => counts.simulated += 1,
                Outcome::Blocked { .. } => counts.blocked += 1,
                Outcome::Conflict { .. } => counts.conflicts += 1,
                Outcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    /// Exit-code policy: 0 when every action succeeded or skipped;
    /// nonzero when a conflict, an unresolved block, or a permanent
    /// failure remains (transient failures are the caller's retry
    /// policy's problem, not a hard failure of the pass).
    pub fn exit_code(&self) -> i32 {
        let trouble = self.outcomes.values().any(|outcome| {
            matches!(
                outcome,
                Outcome::Blocked { .. }
                    | Outcome::Conflict { .. }
                    | Outcome::Failed {
                        transient: false,
                        ..
                    }
            )
        });
        i32::from(trouble)
    }
}
