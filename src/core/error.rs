//! Core capability errors (identity parsing, content validation, graph invariants).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

use super::identity::IssueId;

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("issue id `{raw}` is invalid: {reason}")]
    Issue { raw: String, reason: String },
    #[error("criterion id `{raw}` is invalid: {reason}")]
    Criterion { raw: String, reason: String },
    #[error("fingerprint `{raw}` is invalid: {reason}")]
    Fingerprint { raw: String, reason: String },
}

/// Local issue definition missing or breaking a required semantic field.
///
/// Fatal to that issue only: the pass continues for unrelated issues.
#[derive(Debug, Error, Clone)]
#[error("issue `{id}` is malformed: {reason}")]
pub struct MalformedIssue {
    pub id: String,
    pub reason: String,
}

/// The local `depends_on` relation contains a cycle.
///
/// Fatal to the whole pass: no remote mutation is attempted.
#[derive(Debug, Error, Clone)]
#[error("dependency cycle: {}", render_cycle(.cycle))]
pub struct CyclicDependency {
    /// Cycle path, first node repeated at the end.
    pub cycle: Vec<IssueId>,
}

fn render_cycle(cycle: &[IssueId]) -> String {
    cycle
        .iter()
        .map(IssueId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    MalformedIssue(#[from] MalformedIssue),
    #[error(transparent)]
    CyclicDependency(#[from] CyclicDependency),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
