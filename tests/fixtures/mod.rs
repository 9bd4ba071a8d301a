//! Shared builders and a scripted in-memory gateway for integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use issuesync::core::{
    AcceptanceCriterion, CriterionId, IssueDefinition, IssueId, IssueStatus, IssueType, Priority,
    RemoteHandle,
};
use issuesync::gateway::{
    GatewayError, LabelRef, LabelSpec, MilestoneNumber, MilestoneSpec, RemoteGateway,
};

pub fn id(s: &str) -> IssueId {
    IssueId::parse(s).unwrap()
}

pub fn issue(id_str: &str, title: &str) -> IssueDefinition {
    IssueDefinition {
        id: id(id_str),
        title: title.to_string(),
        issue_type: IssueType::Task,
        status: IssueStatus::Ready,
        priority: Priority::Medium,
        milestone: None,
        acceptance_criteria: Vec::new(),
        technical_context: serde_json::Value::Null,
        depends_on: BTreeSet::new(),
    }
}

pub fn issue_with_deps(id_str: &str, title: &str, deps: &[&str]) -> IssueDefinition {
    let mut def = issue(id_str, title);
    def.depends_on = deps.iter().map(|d| id(d)).collect();
    def
}

#[allow(dead_code)]
pub fn criterion(id_str: &str) -> AcceptanceCriterion {
    AcceptanceCriterion {
        id: CriterionId::parse(id_str).unwrap(),
        given: "a precondition".into(),
        when: "something happens".into(),
        then: "an observable result".into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(IssueId),
    Update(IssueId, RemoteHandle),
}

type CreateHook = Box<dyn Fn(&IssueId) + Send + Sync>;

#[derive(Default)]
struct MockInner {
    next_number: u64,
    calls: Vec<Call>,
    failures: BTreeMap<IssueId, GatewayError>,
    milestones: BTreeMap<String, MilestoneNumber>,
    ensure_labels_calls: usize,
    ensure_milestones_calls: usize,
    provisioned_labels: Vec<String>,
    attached_milestones: BTreeMap<IssueId, Option<MilestoneNumber>>,
}

/// In-memory gateway that allocates sequential handles and can be scripted
/// to fail for specific issue ids or run a hook inside `create_issue`.
#[derive(Default)]
pub struct MockGateway {
    inner: Mutex<MockInner>,
    on_create: Mutex<Option<CreateHook>>,
}

#[allow(dead_code)]
impl MockGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockInner {
                next_number: 1,
                ..MockInner::default()
            }),
            on_create: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, issue_id: &str, error: GatewayError) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(id(issue_id), error);
    }

    /// Pretend the remote already has this milestone.
    pub fn seed_milestone(&self, title: &str, number: u64) {
        self.inner
            .lock()
            .unwrap()
            .milestones
            .insert(title.to_string(), MilestoneNumber::new(number));
    }

    /// Runs inside every `create_issue` call, before the result is sent.
    pub fn on_create(&self, hook: impl Fn(&IssueId) + Send + Sync + 'static) {
        *self.on_create.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    pub fn ensure_labels_calls(&self) -> usize {
        self.inner.lock().unwrap().ensure_labels_calls
    }

    pub fn ensure_milestones_calls(&self) -> usize {
        self.inner.lock().unwrap().ensure_milestones_calls
    }

    pub fn provisioned_labels(&self) -> Vec<String> {
        self.inner.lock().unwrap().provisioned_labels.clone()
    }

    /// Milestone number passed with the last create/update for this issue.
    pub fn attached_milestone(&self, issue_id: &IssueId) -> Option<Option<MilestoneNumber>> {
        self.inner
            .lock()
            .unwrap()
            .attached_milestones
            .get(issue_id)
            .copied()
    }
}

impl RemoteGateway for MockGateway {
    fn ensure_labels(&self, specs: &[LabelSpec]) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure_labels_calls += 1;
        inner
            .provisioned_labels
            .extend(specs.iter().map(|spec| spec.name.clone()));
        Ok(())
    }

    fn ensure_milestones(
        &self,
        specs: &[MilestoneSpec],
    ) -> Result<BTreeMap<String, MilestoneNumber>, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure_milestones_calls += 1;
        for (i, spec) in specs.iter().enumerate() {
            inner
                .milestones
                .entry(spec.title.clone())
                .or_insert_with(|| MilestoneNumber::new(1000 + i as u64));
        }
        Ok(inner.milestones.clone())
    }

    fn create_issue(
        &self,
        issue: &IssueDefinition,
        _labels: &BTreeSet<LabelRef>,
        milestone: Option<MilestoneNumber>,
    ) -> Result<RemoteHandle, GatewayError> {
        if let Some(hook) = self.on_create.lock().unwrap().as_ref() {
            hook(&issue.id);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Create(issue.id.clone()));
        inner
            .attached_milestones
            .insert(issue.id.clone(), milestone);
        if let Some(err) = inner.failures.remove(&issue.id) {
            return Err(err);
        }
        let handle = RemoteHandle::new(inner.next_number);
        inner.next_number += 1;
        Ok(handle)
    }

    fn update_issue(
        &self,
        handle: RemoteHandle,
        issue: &IssueDefinition,
        _labels: &BTreeSet<LabelRef>,
        milestone: Option<MilestoneNumber>,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Update(issue.id.clone(), handle));
        inner
            .attached_milestones
            .insert(issue.id.clone(), milestone);
        if let Some(err) = inner.failures.remove(&issue.id) {
            return Err(err);
        }
        Ok(())
    }
}
