//! Human renderer for CLI outputs.
//!
//! Pure formatting; handlers gather the data. JSON output serializes the
//! report directly and never goes through here.

use crate::core::SyncAction;
use crate::report::{Outcome, PassReport};
use crate::store::SyncState;

pub fn render_report(report: &PassReport) -> String {
    let mut out = String::new();
    for (id, outcome) in &report.outcomes {
        out.push_str(&render_outcome_line(id.as_str(), outcome));
        out.push('\n');
    }

    let c = report.counts();
    out.push_str(&format!(
        "\n{} created, {} updated, {} skipped, {} simulated, {} blocked, {} conflicts, {} failed\n",
        c.created, c.updated, c.skipped, c.simulated, c.blocked, c.conflicts, c.failed
    ));
    if report.cancelled {
        out.push_str("pass cancelled; undispatched work was not attempted\n");
    }
    out
}

fn render_outcome_line(id: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Created { handle } => format!("✓ {id}: created {handle}"),
        Outcome::Updated { handle } => format!("✓ {id}: updated {handle}"),
        Outcome::Skipped { reason } => format!("- {id}: skipped ({reason})"),
        Outcome::Simulated { action } => {
            format!("~ {id}: would {}", render_action(action))
        }
        Outcome::Blocked { unmet } => {
            let deps: Vec<&str> = unmet.iter().map(|d| d.as_str()).collect();
            format!("⊘ {id}: blocked on {}", deps.join(", "))
        }
        Outcome::Conflict { reason } => format!("✗ {id}: conflict ({reason})"),
        Outcome::Failed { detail, transient } => {
            let retry = if *transient { ", retryable" } else { "" };
            format!("✗ {id}: failed ({detail}{retry})")
        }
    }
}

fn render_action(action: &SyncAction) -> &'static str {
    match action {
        SyncAction::Create => "create",
        SyncAction::Update => "update",
        _ => action.kind(),
    }
}

pub fn render_status(state: &SyncState) -> String {
    if state.is_empty() {
        return "no sync state recorded\n".into();
    }
    let mut out = format!("{} synced issue(s):\n\n", state.len());
    for record in state.records.values() {
        let handle = record
            .remote_handle
            .map(|h| h.to_string())
            .unwrap_or_else(|| "(no remote)".into());
        out.push_str(&format!(
            "{}: {} {} [{}]\n",
            record.issue_id,
            handle,
            record.fingerprint,
            record.last_status.as_str()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IssueId, RemoteHandle};

    fn id(s: &str) -> IssueId {
        IssueId::parse(s).unwrap()
    }

    #[test]
    fn report_lines_and_summary() {
        let mut report = PassReport::default();
        report.record(
            id("PV-1"),
            Outcome::Created {
                handle: RemoteHandle::new(10),
            },
        );
        report.record(
            id("PV-2"),
            Outcome::Blocked {
                unmet: [id("PV-9")].into_iter().collect(),
            },
        );
        let out = render_report(&report);
        assert!(out.contains("✓ PV-1: created #10"));
        assert!(out.contains("⊘ PV-2: blocked on PV-9"));
        assert!(out.contains("1 created"));
        assert!(out.contains("1 blocked"));
        assert!(!out.contains("cancelled"));
    }

    #[test]
    fn empty_status() {
        assert_eq!(render_status(&SyncState::default()), "no sync state recorded\n");
    }
}
