//! Core domain types for issuesync
//!
//! Module hierarchy follows type dependency order:
//! - identity: IssueId, CriterionId, RemoteHandle
//! - domain: IssueType, IssueStatus, Priority
//! - issue: IssueDefinition, AcceptanceCriterion
//! - json_canon: canonical JSON encoding
//! - fingerprint: ContentFingerprint
//! - graph: DependencyGraph
//! - reconcile: SyncAction, reconcile()

pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod identity;
pub mod issue;
pub mod json_canon;
pub mod reconcile;

pub use domain::{IssueStatus, IssueType, Priority};
pub use error::{CoreError, CyclicDependency, InvalidId, MalformedIssue};
pub use fingerprint::{ContentFingerprint, fingerprint};
pub use graph::DependencyGraph;
pub use identity::{CriterionId, IssueId, RemoteHandle};
pub use issue::{AcceptanceCriterion, IssueDefinition};
pub use json_canon::{CanonJsonError, to_canon_json_bytes};
pub use reconcile::{PriorRecord, ReconcilePlan, SyncAction, reconcile};
