//! Remote issue gateway: the narrow seam between the sync core and the
//! tracking service.
//!
//! The core depends only on the `RemoteGateway` trait. Every call site
//! treats the remote as unreliable: operations return `GatewayError`
//! classified transient/permanent, and nothing in the core assumes a call
//! succeeded until its result says so.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{IssueDefinition, IssueStatus, IssueType, Priority, RemoteHandle};
use crate::error::{Effect, Transience};

mod github;

pub use github::GitHubGateway;

/// Gateway failure classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    /// Outage, rate limit, contention: an external retry policy may succeed.
    Transient,
    /// Bad request, auth, unknown label: retry without changes never helps.
    Permanent,
}

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[error("gateway error ({}): {detail}", kind_str(.kind))]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub detail: String,
}

fn kind_str(kind: &GatewayErrorKind) -> &'static str {
    match kind {
        GatewayErrorKind::Transient => "transient",
        GatewayErrorKind::Permanent => "permanent",
    }
}

impl GatewayError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Permanent,
            detail: detail.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, GatewayErrorKind::Transient)
    }

    pub fn transience(&self) -> Transience {
        match self.kind {
            GatewayErrorKind::Transient => Transience::Retryable,
            GatewayErrorKind::Permanent => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        // A failed remote call may or may not have landed server-side.
        Effect::Unknown
    }
}

#[derive(Debug, Error, Clone)]
#[error("unknown label `{label}`")]
pub struct UnknownLabelError {
    pub label: String,
}

impl From<UnknownLabelError> for GatewayError {
    fn from(err: UnknownLabelError) -> Self {
        GatewayError::permanent(err.to_string())
    }
}

/// A label definition as provisioned on the remote side: name, color,
/// optional description. Read from `_labels.json` alongside the
/// classification defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: String,
}

impl LabelSpec {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            description: String::new(),
        }
    }

    /// Specs for the `type:*`/`status:*`/`priority:*` cross product, one
    /// color per family.
    pub fn classification_defaults() -> Vec<LabelSpec> {
        let mut specs = Vec::new();
        for ty in ["epic", "story", "task", "bug", "spike"] {
            specs.push(LabelSpec::new(format!("type:{ty}"), "0366d6"));
        }
        for status in ["draft", "ready", "in_progress", "review", "done", "blocked"] {
            specs.push(LabelSpec::new(format!("status:{status}"), "28a745"));
        }
        for priority in ["critical", "high", "medium", "low"] {
            specs.push(LabelSpec::new(format!("priority:{priority}"), "d73a49"));
        }
        specs
    }
}

/// A milestone definition to provision remotely. Read from
/// `_milestones.json`; issues reference milestones by title.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Milestone number assigned by the remote tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilestoneNumber(u64);

impl MilestoneNumber {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }
}

/// A label as the remote tracker names it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelRef(String);

impl LabelRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LabelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelRef({:?})", self.0)
    }
}

impl fmt::Display for LabelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pure mapping from issue classification to tracker labels.
///
/// No network: the catalog is the set of label names known to exist on the
/// remote side, and resolution refuses names outside it rather than
/// letting a create call fail halfway through a pass.
#[derive(Clone, Debug)]
pub struct LabelCatalog {
    known: BTreeSet<String>,
}

impl LabelCatalog {
    pub fn new(known: impl IntoIterator<Item = String>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }

    /// The full cross product of `type:*`, `status:*`, `priority:*` names.
    pub fn defaults() -> Self {
        Self::seeded(&[])
    }

    /// Classification defaults plus the names declared in label specs.
    pub fn seeded(specs: &[LabelSpec]) -> Self {
        let known = LabelSpec::classification_defaults()
            .iter()
            .chain(specs)
            .map(|spec| spec.name.clone())
            .collect();
        Self { known }
    }

    pub fn resolve(
        &self,
        status: IssueStatus,
        priority: Priority,
        issue_type: IssueType,
    ) -> Result<BTreeSet<LabelRef>, UnknownLabelError> {
        let wanted = [
            format!("type:{}", issue_type.as_str()),
            format!("status:{}", status.as_str()),
            format!("priority:{}", priority.as_str()),
        ];
        let mut labels = BTreeSet::new();
        for name in wanted {
            if !self.known.contains(&name) {
                return Err(UnknownLabelError { label: name });
            }
            labels.insert(LabelRef::new(name));
        }
        Ok(labels)
    }
}

/// Operations the sync core requires from the tracking service.
///
/// Each call is independently retryable; idempotence across retries is the
/// implementation's concern (the core keys everything on local issue ids,
/// never on call ordering).
pub trait RemoteGateway: Send + Sync {
    /// Create every label in `specs` that does not exist remotely yet.
    /// Runs once per apply pass, before any issue mutation.
    fn ensure_labels(&self, specs: &[LabelSpec]) -> Result<(), GatewayError>;

    /// Create every milestone in `specs` that does not exist remotely yet
    /// and return the full title-to-number directory (pre-existing
    /// milestones included).
    fn ensure_milestones(
        &self,
        specs: &[MilestoneSpec],
    ) -> Result<BTreeMap<String, MilestoneNumber>, GatewayError>;

    fn create_issue(
        &self,
        issue: &IssueDefinition,
        labels: &BTreeSet<LabelRef>,
        milestone: Option<MilestoneNumber>,
    ) -> Result<RemoteHandle, GatewayError>;

    fn update_issue(
        &self,
        handle: RemoteHandle,
        issue: &IssueDefinition,
        labels: &BTreeSet<LabelRef>,
        milestone: Option<MilestoneNumber>,
    ) -> Result<(), GatewayError>;
}

/// Placeholder gateway for passes that must never reach the network
/// (dry-run). Any call reaching it is a driver bug surfaced loudly.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullGateway;

impl RemoteGateway for NullGateway {
    fn ensure_labels(&self, _specs: &[LabelSpec]) -> Result<(), GatewayError> {
        Err(GatewayError::permanent("null gateway cannot provision labels"))
    }

    fn ensure_milestones(
        &self,
        _specs: &[MilestoneSpec],
    ) -> Result<BTreeMap<String, MilestoneNumber>, GatewayError> {
        Err(GatewayError::permanent(
            "null gateway cannot provision milestones",
        ))
    }

    fn create_issue(
        &self,
        issue: &IssueDefinition,
        _labels: &BTreeSet<LabelRef>,
        _milestone: Option<MilestoneNumber>,
    ) -> Result<RemoteHandle, GatewayError> {
        Err(GatewayError::permanent(format!(
            "null gateway cannot create `{}`",
            issue.id
        )))
    }

    fn update_issue(
        &self,
        handle: RemoteHandle,
        issue: &IssueDefinition,
        _labels: &BTreeSet<LabelRef>,
        _milestone: Option<MilestoneNumber>,
    ) -> Result<(), GatewayError> {
        Err(GatewayError::permanent(format!(
            "null gateway cannot update `{}` ({handle})",
            issue.id
        )))
    }
}
