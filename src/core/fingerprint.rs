//! Content-addressed change detection.
//!
//! A fingerprint covers the semantic fields of an issue and nothing the
//! remote tracker assigns. Identical semantic content always hashes the
//! same regardless of source field ordering; edited wording (including
//! whitespace-only edits) always hashes differently.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::domain::{IssueStatus, IssueType, Priority};
use super::error::{CoreError, InvalidId, MalformedIssue};
use super::identity::IssueId;
use super::issue::{AcceptanceCriterion, IssueDefinition};
use super::json_canon::to_canon_json_bytes;

/// Hex width kept in state files and markdown markers. 64 bits of SHA-256
/// is plenty for change detection over a repo-sized issue set.
const FINGERPRINT_HEX_LEN: usize = 16;

/// Deterministic digest of an issue's semantic content.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Parse a previously-persisted fingerprint.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.len() != FINGERPRINT_HEX_LEN {
            return Err(InvalidId::Fingerprint {
                raw: s.to_string(),
                reason: format!("must be {FINGERPRINT_HEX_LEN} hex chars (got {})", s.len()),
            }
            .into());
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(InvalidId::Fingerprint {
                raw: s.to_string(),
                reason: "contains non-hex characters".into(),
            }
            .into());
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(bytes: &[u8]) -> Self {
        let mut hex = String::with_capacity(FINGERPRINT_HEX_LEN);
        for b in &bytes[..FINGERPRINT_HEX_LEN / 2] {
            hex.push_str(&format!("{b:02x}"));
        }
        Self(hex)
    }
}

impl fmt::Debug for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentFingerprint({})", self.0)
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic fields in their defined hashing order.
///
/// Remote-assigned identifiers (handles, timestamps) never appear here.
/// Canonicalization sorts the keys anyway; the struct documents the
/// covered set.
#[derive(Serialize)]
struct SemanticFields<'a> {
    title: &'a str,
    #[serde(rename = "type")]
    issue_type: IssueType,
    status: IssueStatus,
    priority: Priority,
    milestone: &'a Option<String>,
    acceptance_criteria: &'a [AcceptanceCriterion],
    technical_context: &'a Value,
    depends_on: &'a BTreeSet<IssueId>,
}

/// Compute the fingerprint of a local issue definition.
///
/// Pure and deterministic: no I/O, no clock, no randomness. Fails only
/// on malformed input.
pub fn fingerprint(issue: &IssueDefinition) -> Result<ContentFingerprint, CoreError> {
    issue.validate()?;
    let fields = SemanticFields {
        title: &issue.title,
        issue_type: issue.issue_type,
        status: issue.status,
        priority: issue.priority,
        milestone: &issue.milestone,
        acceptance_criteria: &issue.acceptance_criteria,
        technical_context: &issue.technical_context,
        depends_on: &issue.depends_on,
    };
    let bytes = to_canon_json_bytes(&fields).map_err(|e| MalformedIssue {
        id: issue.id.to_string(),
        reason: format!("canonical encoding failed: {e}"),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(ContentFingerprint::from_digest(&hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::CriterionId;
    use serde_json::json;

    fn issue(id: &str) -> IssueDefinition {
        IssueDefinition {
            id: IssueId::parse(id).unwrap(),
            title: "Wire the store".into(),
            issue_type: IssueType::Story,
            status: IssueStatus::Ready,
            priority: Priority::High,
            milestone: None,
            acceptance_criteria: vec![AcceptanceCriterion {
                id: CriterionId::parse("AC-1").unwrap(),
                given: "a clean checkout".into(),
                when: "the pass runs".into(),
                then: "state is written once".into(),
            }],
            technical_context: json!({"crates": ["serde", "sha2"], "files": ["src/store.rs"]}),
            depends_on: BTreeSet::new(),
        }
    }

    #[test]
    fn identical_content_identical_fingerprint() {
        assert_eq!(
            fingerprint(&issue("PV-1")).unwrap(),
            fingerprint(&issue("PV-1")).unwrap()
        );
    }

    #[test]
    fn source_field_ordering_is_canonicalized_away() {
        let a: IssueDefinition = serde_json::from_value(json!({
            "id": "PV-1",
            "title": "T",
            "type": "task",
            "status": "ready",
            "technical_context": {"crates": ["serde"], "files": ["a.rs"]}
        }))
        .unwrap();
        let b: IssueDefinition = serde_json::from_value(json!({
            "status": "ready",
            "type": "task",
            "technical_context": {"files": ["a.rs"], "crates": ["serde"]},
            "title": "T",
            "id": "PV-1"
        }))
        .unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn criterion_wording_change_changes_fingerprint() {
        let base = issue("PV-1");
        let mut edited = base.clone();
        edited.acceptance_criteria[0].then = "state is written exactly once".into();
        assert_ne!(fingerprint(&base).unwrap(), fingerprint(&edited).unwrap());
    }

    #[test]
    fn milestone_change_changes_fingerprint() {
        let base = issue("PV-1");
        let mut edited = base.clone();
        edited.milestone = Some("Phase 1".into());
        assert_ne!(fingerprint(&base).unwrap(), fingerprint(&edited).unwrap());
    }

    #[test]
    fn whitespace_edit_changes_fingerprint() {
        let base = issue("PV-1");
        let mut edited = base.clone();
        edited.title = "Wire  the store".into();
        assert_ne!(fingerprint(&base).unwrap(), fingerprint(&edited).unwrap());
    }

    #[test]
    fn criterion_order_is_semantic() {
        let mut base = issue("PV-1");
        base.acceptance_criteria.push(AcceptanceCriterion {
            id: CriterionId::parse("AC-2").unwrap(),
            given: "g".into(),
            when: "w".into(),
            then: "t".into(),
        });
        let mut swapped = base.clone();
        swapped.acceptance_criteria.reverse();
        assert_ne!(fingerprint(&base).unwrap(), fingerprint(&swapped).unwrap());
    }

    #[test]
    fn malformed_issue_is_refused() {
        let mut bad = issue("PV-1");
        bad.title = String::new();
        assert!(matches!(
            fingerprint(&bad),
            Err(CoreError::MalformedIssue(_))
        ));
    }

    #[test]
    fn fingerprint_width_and_parse_roundtrip() {
        let fp = fingerprint(&issue("PV-1")).unwrap();
        assert_eq!(fp.as_str().len(), 16);
        assert_eq!(ContentFingerprint::parse(fp.as_str()).unwrap(), fp);
        assert!(ContentFingerprint::parse("nothex!").is_err());
        assert!(ContentFingerprint::parse("ABCDEF0123456789").is_err());
    }
}
