#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod loader;
pub mod report;
pub mod store;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    AcceptanceCriterion, ContentFingerprint, CoreError, CriterionId, DependencyGraph,
    IssueDefinition, IssueId, IssueStatus, IssueType, Priority, ReconcilePlan, RemoteHandle,
    SyncAction, fingerprint, reconcile,
};
