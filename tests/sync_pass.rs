//! End-to-end pass behavior through the driver with a scripted gateway.

mod fixtures;

use std::fs;
use std::sync::Arc;

use issuesync::core::{RemoteHandle, SyncAction};
use issuesync::driver::{CancelToken, SyncDriver, SyncMode};
use issuesync::gateway::{GatewayError, LabelCatalog, MilestoneNumber, MilestoneSpec};
use issuesync::report::Outcome;
use issuesync::store::SyncStateStore;

use fixtures::{Call, MockGateway, id, issue, issue_with_deps};

fn driver_with(
    dir: &std::path::Path,
    gateway: Arc<MockGateway>,
) -> (SyncDriver, std::path::PathBuf) {
    let state_path = dir.join("state.json");
    let store = SyncStateStore::new(&state_path);
    let driver = SyncDriver::new(store, gateway, LabelCatalog::defaults()).with_workers(2);
    (driver, state_path)
}

#[test]
fn create_then_skip_then_update() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, state_path) = driver_with(dir.path(), Arc::clone(&gateway));
    let cancel = CancelToken::new();

    // First pass: nothing synced yet, everything is created.
    let mut issues = vec![issue("PV-1", "Define schema"), issue("PV-2", "Build loader")];
    let report = driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();
    assert_eq!(report.exit_code(), 0);
    assert!(matches!(
        report.outcome_for(&id("PV-1")),
        Some(Outcome::Created { .. })
    ));
    assert_eq!(gateway.call_count(), 2);

    // Second pass with identical content: pure no-op.
    let report = driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();
    assert!(
        report
            .outcomes
            .values()
            .all(|o| matches!(o, Outcome::Skipped { .. }))
    );
    assert_eq!(gateway.call_count(), 2, "no remote calls on a no-op pass");

    // Edit one record: only that one is updated, at its recorded handle.
    issues[0].title = "Define the record schema".into();
    let report = driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();
    assert!(matches!(
        report.outcome_for(&id("PV-1")),
        Some(Outcome::Updated { .. })
    ));
    assert!(matches!(
        report.outcome_for(&id("PV-2")),
        Some(Outcome::Skipped { .. })
    ));
    let calls = gateway.calls();
    assert_eq!(calls.last(), Some(&Call::Update(id("PV-1"), RemoteHandle::new(1))));

    let store = SyncStateStore::new(&state_path);
    let state = store.load().unwrap();
    assert_eq!(state.len(), 2);
}

#[test]
fn failure_isolates_to_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, state_path) = driver_with(dir.path(), Arc::clone(&gateway));

    gateway.fail_with("PV-1", GatewayError::permanent("validation refused"));
    let issues = vec![
        issue("PV-1", "Root work"),
        issue_with_deps("PV-2", "Dependent work", &["PV-1"]),
        issue("PV-3", "Unrelated work"),
    ];
    let report = driver
        .run(&issues, SyncMode::Apply, false, &CancelToken::new())
        .unwrap();

    assert!(matches!(
        report.outcome_for(&id("PV-1")),
        Some(Outcome::Failed { transient: false, .. })
    ));
    match report.outcome_for(&id("PV-2")) {
        Some(Outcome::Blocked { unmet }) => assert!(unmet.contains(&id("PV-1"))),
        other => panic!("expected blocked, got {other:?}"),
    }
    assert!(matches!(
        report.outcome_for(&id("PV-3")),
        Some(Outcome::Created { .. })
    ));
    assert_eq!(report.exit_code(), 1);

    // Only the success landed in state; the failure and its dependent left
    // no record, so the next pass retries both.
    let state = SyncStateStore::new(&state_path).load().unwrap();
    assert!(state.get(&id("PV-1")).is_none());
    assert!(state.get(&id("PV-2")).is_none());
    assert!(state.get(&id("PV-3")).is_some());
}

#[test]
fn dry_run_leaves_state_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, state_path) = driver_with(dir.path(), Arc::clone(&gateway));
    let cancel = CancelToken::new();

    let mut issues = vec![issue("PV-1", "Seed"), issue("PV-2", "Other")];
    driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();
    let before = fs::read(&state_path).unwrap();
    let calls_before = gateway.call_count();

    issues[0].title = "Seed, revised".into();
    let report = driver.run(&issues, SyncMode::DryRun, false, &cancel).unwrap();
    assert!(matches!(
        report.outcome_for(&id("PV-1")),
        Some(Outcome::Simulated {
            action: SyncAction::Update
        })
    ));
    assert!(matches!(
        report.outcome_for(&id("PV-2")),
        Some(Outcome::Skipped { .. })
    ));
    assert_eq!(gateway.call_count(), calls_before, "dry run never calls out");
    assert_eq!(fs::read(&state_path).unwrap(), before);
}

#[test]
fn force_resyncs_unchanged_issues() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, _) = driver_with(dir.path(), Arc::clone(&gateway));
    let cancel = CancelToken::new();

    let issues = vec![issue("PV-1", "Stable")];
    driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();

    let report = driver.run(&issues, SyncMode::Apply, true, &cancel).unwrap();
    assert!(matches!(
        report.outcome_for(&id("PV-1")),
        Some(Outcome::Updated { .. })
    ));
    assert_eq!(
        gateway.calls().last(),
        Some(&Call::Update(id("PV-1"), RemoteHandle::new(1)))
    );
}

#[test]
fn cancellation_stops_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, _) = driver_with(dir.path(), Arc::clone(&gateway));

    let cancel = CancelToken::new();
    cancel.cancel();
    let issues = vec![issue("PV-1", "Never sent"), issue("PV-2", "Also never sent")];
    let report = driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();

    assert!(report.cancelled);
    assert_eq!(gateway.call_count(), 0);
    assert!(
        report
            .outcomes
            .values()
            .all(|o| matches!(o, Outcome::Failed { transient: true, .. }))
    );
    // Transient-only trouble: retry is the remedy, not a hard failure.
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn cancellation_mid_pass_commits_resolved_work() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, state_path) = driver_with(dir.path(), Arc::clone(&gateway));

    // The stop signal arrives while the first create is in flight: that
    // call finishes and its record is committed; the dependent is never
    // dispatched.
    let cancel = CancelToken::new();
    let hook_token = cancel.clone();
    gateway.on_create(move |_| hook_token.cancel());

    let issues = vec![
        issue("PV-1", "First"),
        issue_with_deps("PV-2", "Second", &["PV-1"]),
    ];
    let report = driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();

    assert!(report.cancelled);
    assert!(matches!(
        report.outcome_for(&id("PV-1")),
        Some(Outcome::Created { .. })
    ));
    assert!(matches!(
        report.outcome_for(&id("PV-2")),
        Some(Outcome::Failed { transient: true, .. })
    ));
    assert_eq!(gateway.call_count(), 1);

    let state = SyncStateStore::new(&state_path).load().unwrap();
    assert!(
        state.get(&id("PV-1")).is_some(),
        "the finished in-flight create is committed"
    );
    assert!(state.get(&id("PV-2")).is_none());
}

#[test]
fn labels_are_provisioned_once_per_apply_pass() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, _) = driver_with(dir.path(), Arc::clone(&gateway));
    let cancel = CancelToken::new();

    let issues = vec![issue("PV-1", "Work")];
    driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();
    assert_eq!(gateway.ensure_labels_calls(), 1);
    assert!(
        gateway
            .provisioned_labels()
            .contains(&"type:task".to_string())
    );

    // A pure no-op pass has no remote work and provisions nothing.
    driver.run(&issues, SyncMode::Apply, false, &cancel).unwrap();
    assert_eq!(gateway.ensure_labels_calls(), 1);
}

#[test]
fn milestones_are_provisioned_and_attached() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let store = SyncStateStore::new(dir.path().join("state.json"));
    let driver = SyncDriver::new(store, Arc::<MockGateway>::clone(&gateway), LabelCatalog::defaults())
        .with_workers(2)
        .with_milestone_specs(vec![MilestoneSpec {
            title: "Phase 1".into(),
            description: String::new(),
        }]);

    let mut with_milestone = issue("PV-1", "Tracked work");
    with_milestone.milestone = Some("Phase 1".into());
    let issues = vec![with_milestone, issue("PV-2", "Untracked work")];
    let report = driver
        .run(&issues, SyncMode::Apply, false, &CancelToken::new())
        .unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(gateway.ensure_milestones_calls(), 1);
    assert_eq!(
        gateway.attached_milestone(&id("PV-1")),
        Some(Some(MilestoneNumber::new(1000)))
    );
    assert_eq!(gateway.attached_milestone(&id("PV-2")), Some(None));
}

#[test]
fn unknown_milestone_fails_that_issue_only() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, state_path) = driver_with(dir.path(), Arc::clone(&gateway));

    let mut ghost = issue("PV-1", "References a missing milestone");
    ghost.milestone = Some("Ghost".into());
    let issues = vec![ghost, issue("PV-2", "Fine")];
    let report = driver
        .run(&issues, SyncMode::Apply, false, &CancelToken::new())
        .unwrap();

    match report.outcome_for(&id("PV-1")) {
        Some(Outcome::Failed { detail, transient }) => {
            assert!(detail.contains("Ghost"));
            assert!(!transient);
        }
        other => panic!("expected failed, got {other:?}"),
    }
    assert!(matches!(
        report.outcome_for(&id("PV-2")),
        Some(Outcome::Created { .. })
    ));
    assert_eq!(report.exit_code(), 1);

    let state = SyncStateStore::new(&state_path).load().unwrap();
    assert!(state.get(&id("PV-1")).is_none());
    assert!(state.get(&id("PV-2")).is_some());
}

#[test]
fn corrupt_state_halts_before_any_remote_call() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, state_path) = driver_with(dir.path(), Arc::clone(&gateway));

    fs::write(&state_path, "{not json").unwrap();
    let issues = vec![issue("PV-1", "Work")];
    let err = driver
        .run(&issues, SyncMode::Apply, false, &CancelToken::new())
        .unwrap_err();
    assert!(err.to_string().contains("state"));
    assert_eq!(gateway.call_count(), 0);
    // The corrupt file is left for the operator; nothing overwrote it.
    assert_eq!(fs::read(&state_path).unwrap(), b"{not json");
}

#[test]
fn unmet_external_dependency_blocks_at_plan_time() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, _) = driver_with(dir.path(), Arc::clone(&gateway));

    let issues = vec![issue_with_deps("PV-2", "Needs missing dep", &["PV-0"])];
    let report = driver
        .run(&issues, SyncMode::Apply, false, &CancelToken::new())
        .unwrap();
    match report.outcome_for(&id("PV-2")) {
        Some(Outcome::Blocked { unmet }) => assert!(unmet.contains(&id("PV-0"))),
        other => panic!("expected blocked, got {other:?}"),
    }
    assert_eq!(gateway.call_count(), 0);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn dependency_order_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, _) = driver_with(dir.path(), Arc::clone(&gateway));

    let issues = vec![
        issue_with_deps("PV-3", "Leaf", &["PV-2"]),
        issue_with_deps("PV-2", "Middle", &["PV-1"]),
        issue("PV-1", "Root"),
    ];
    driver
        .run(&issues, SyncMode::Apply, false, &CancelToken::new())
        .unwrap();

    let order: Vec<_> = gateway
        .calls()
        .into_iter()
        .map(|call| match call {
            Call::Create(id) => id,
            Call::Update(id, _) => id,
        })
        .collect();
    assert_eq!(order, vec![id("PV-1"), id("PV-2"), id("PV-3")]);
}

#[test]
fn cycle_aborts_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let (driver, state_path) = driver_with(dir.path(), Arc::clone(&gateway));

    let issues = vec![
        issue_with_deps("PV-1", "A", &["PV-2"]),
        issue_with_deps("PV-2", "B", &["PV-1"]),
    ];
    let err = driver
        .run(&issues, SyncMode::Apply, false, &CancelToken::new())
        .unwrap_err();
    assert!(err.to_string().contains("cycle"));
    assert_eq!(gateway.call_count(), 0);
    assert!(!state_path.exists());
}
