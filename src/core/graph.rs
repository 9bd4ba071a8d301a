//! Dependency graph over local issue ids.
//!
//! Nodes are the ids present in the local set; edges are the declared
//! `depends_on` relation. Declared targets without a local definition are
//! kept for unmet-dependency reporting but excluded from ordering (they
//! cannot be actioned this pass).

use std::collections::{BTreeMap, BTreeSet};

use super::error::{CoreError, CyclicDependency};
use super::identity::IssueId;
use super::issue::IssueDefinition;

#[derive(Clone, Debug)]
pub struct DependencyGraph {
    nodes: BTreeSet<IssueId>,
    /// Declared direct dependencies per node, including unknown targets.
    declared: BTreeMap<IssueId, BTreeSet<IssueId>>,
    /// Reverse edges restricted to known nodes.
    dependents: BTreeMap<IssueId, BTreeSet<IssueId>>,
}

impl DependencyGraph {
    /// Build the graph and verify acyclicity.
    ///
    /// A cycle is a fatal input error reported before any remote mutation;
    /// the error carries one concrete cycle path. Duplicate definitions of
    /// the same id merge their dependency sets here (the reconciler decides
    /// whether the duplication is a conflict).
    pub fn build(issues: &[IssueDefinition]) -> Result<Self, CoreError> {
        let mut nodes = BTreeSet::new();
        let mut declared: BTreeMap<IssueId, BTreeSet<IssueId>> = BTreeMap::new();
        for issue in issues {
            nodes.insert(issue.id.clone());
            declared
                .entry(issue.id.clone())
                .or_default()
                .extend(issue.depends_on.iter().cloned());
        }

        let mut dependents: BTreeMap<IssueId, BTreeSet<IssueId>> = BTreeMap::new();
        for (id, deps) in &declared {
            for dep in deps {
                if nodes.contains(dep) {
                    dependents.entry(dep.clone()).or_default().insert(id.clone());
                }
            }
        }

        let graph = Self {
            nodes,
            declared,
            dependents,
        };
        if let Some(cycle) = graph.find_cycle() {
            return Err(CyclicDependency { cycle }.into());
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &IssueId) -> bool {
        self.nodes.contains(id)
    }

    /// Declared direct dependencies (known and unknown targets).
    pub fn declared_dependencies(&self, id: &IssueId) -> Option<&BTreeSet<IssueId>> {
        self.declared.get(id)
    }

    /// Direct dependencies that exist as local nodes.
    pub fn local_dependencies(&self, id: &IssueId) -> BTreeSet<IssueId> {
        self.declared
            .get(id)
            .map(|deps| {
                deps.iter()
                    .filter(|dep| self.nodes.contains(*dep))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Local nodes that declare `id` as a direct dependency.
    pub fn dependents_of(&self, id: &IssueId) -> BTreeSet<IssueId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }

    /// Deterministic topological order: a dependency always precedes its
    /// dependents; ties break by issue-id lexical order so pass output is
    /// reproducible across runs.
    pub fn topological_order(&self) -> Vec<IssueId> {
        let mut indegree: BTreeMap<&IssueId, usize> = BTreeMap::new();
        for id in &self.nodes {
            let local = self
                .declared
                .get(id)
                .map(|deps| deps.iter().filter(|d| self.nodes.contains(*d)).count())
                .unwrap_or(0);
            indegree.insert(id, local);
        }

        // Kahn's algorithm with a BTreeSet frontier for the lexical tie-break.
        let mut ready: BTreeSet<&IssueId> = indegree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            if let Some(deps) = self.dependents.get(id) {
                for dependent in deps {
                    let n = indegree
                        .get_mut(dependent)
                        .expect("dependent is a known node");
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
        debug_assert_eq!(order.len(), self.nodes.len(), "graph verified acyclic");
        order
    }

    /// Direct dependencies of `id` not present in `done`.
    ///
    /// Callers choose what "done" means: the reconciler passes the set of
    /// ids that are locally defined or already exist remotely.
    pub fn unmet_dependencies(&self, id: &IssueId, done: &BTreeSet<IssueId>) -> BTreeSet<IssueId> {
        self.declared
            .get(id)
            .map(|deps| deps.iter().filter(|d| !done.contains(*d)).cloned().collect())
            .unwrap_or_default()
    }

    fn find_cycle(&self) -> Option<Vec<IssueId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Finished,
        }

        fn visit(
            graph: &DependencyGraph,
            node: &IssueId,
            marks: &mut BTreeMap<IssueId, Mark>,
            path: &mut Vec<IssueId>,
        ) -> Option<Vec<IssueId>> {
            match marks.get(node) {
                Some(Mark::Finished) => return None,
                Some(Mark::InProgress) => {
                    let start = path.iter().position(|p| p == node).unwrap_or(0);
                    let mut cycle: Vec<IssueId> = path[start..].to_vec();
                    cycle.push(node.clone());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(node.clone(), Mark::InProgress);
            path.push(node.clone());
            if let Some(deps) = graph.declared.get(node) {
                for dep in deps {
                    if !graph.nodes.contains(dep) {
                        continue;
                    }
                    if let Some(cycle) = visit(graph, dep, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(node.clone(), Mark::Finished);
            None
        }

        let mut marks = BTreeMap::new();
        let mut path = Vec::new();
        for node in &self.nodes {
            if let Some(cycle) = visit(self, node, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}
