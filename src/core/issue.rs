//! Local issue records.
//!
//! IssueDefinition is owned by version-controlled source files. Within a
//! sync pass it is immutable and read-only to this crate: the reconciler
//! and driver never edit definitions, only compare and transmit them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{IssueStatus, IssueType, Priority};
use super::error::{CoreError, MalformedIssue};
use super::identity::{CriterionId, IssueId};

/// One Given/When/Then acceptance criterion.
///
/// Criterion order is semantically meaningful and preserved as written;
/// it is never re-sorted before hashing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: CriterionId,
    pub given: String,
    pub when: String,
    pub then: String,
}

/// A locally-defined issue record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssueDefinition {
    pub id: IssueId,
    pub title: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub status: IssueStatus,
    #[serde(default)]
    pub priority: Priority,
    /// Milestone title; resolved to the remote milestone at sync time.
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    /// Opaque structured metadata: crates, files, protocol methods,
    /// external endpoints. Compared structurally, never interpreted.
    #[serde(default)]
    pub technical_context: Value,
    #[serde(default)]
    pub depends_on: BTreeSet<IssueId>,
}

impl IssueDefinition {
    /// Check required semantic fields.
    ///
    /// Serde accepts any string for ids and titles; this is the gate the
    /// fingerprint and reconciler run behind.
    pub fn validate(&self) -> Result<(), CoreError> {
        IssueId::parse(self.id.as_str())?;
        if self.title.trim().is_empty() {
            return Err(MalformedIssue {
                id: self.id.to_string(),
                reason: "title is empty".into(),
            }
            .into());
        }
        for criterion in &self.acceptance_criteria {
            CriterionId::parse(criterion.id.as_str()).map_err(|e| MalformedIssue {
                id: self.id.to_string(),
                reason: e.to_string(),
            })?;
        }
        if self.depends_on.contains(&self.id) {
            return Err(MalformedIssue {
                id: self.id.to_string(),
                reason: "depends on itself".into(),
            }
            .into());
        }
        Ok(())
    }
}
