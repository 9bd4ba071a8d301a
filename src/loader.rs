//! Local issue source: a directory tree of JSON issue records plus an
//! optional `_index.json` dependency seed.
//!
//! The loader is the boundary collaborator the core trusts for parsing:
//! loader failures are `LoadError`, reported before reconciliation, and
//! are never the core's concern. Schema validation beyond serde's shape
//! checks is assumed to have happened upstream.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::{IssueDefinition, IssueId};
use crate::error::{Effect, Transience};
use crate::gateway::{LabelSpec, MilestoneSpec};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("issues directory not found: {}", path.display())]
    MissingDir { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    pub fn transience(&self) -> Transience {
        match self {
            LoadError::Io { .. } => Transience::Unknown,
            _ => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

/// Dependency edges declared centrally in `_index.json`, merged into the
/// per-file `depends_on` sets at load time.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSeed {
    pub depends_on: BTreeMap<IssueId, BTreeSet<IssueId>>,
}

/// `_labels.json`: label definitions to provision remotely.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct LabelsFile {
    labels: Vec<LabelSpec>,
}

/// `_milestones.json`: milestone definitions to provision remotely.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct MilestonesFile {
    milestones: Vec<MilestoneSpec>,
}

#[derive(Debug)]
pub struct IssueLoader {
    issues_dir: PathBuf,
}

impl IssueLoader {
    pub fn new(issues_dir: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let issues_dir = issues_dir.into();
        if !issues_dir.is_dir() {
            return Err(LoadError::MissingDir { path: issues_dir });
        }
        Ok(Self { issues_dir })
    }

    /// Load every issue record under the tree, in deterministic path
    /// order, with the index seed merged in.
    ///
    /// Any `*.json` file whose name does not start with `_` is an issue
    /// record; underscore files (`_index.json`, `_labels.json`, ...) are
    /// metadata.
    pub fn load_all(&self) -> Result<Vec<IssueDefinition>, LoadError> {
        let seed = self.load_index()?;
        let mut issues = Vec::new();
        for path in self.issue_files()? {
            let mut issue: IssueDefinition = read_json(&path)?;
            if let Some(extra) = seed.depends_on.get(&issue.id) {
                issue.depends_on.extend(extra.iter().cloned());
            }
            issues.push(issue);
        }
        Ok(issues)
    }

    /// Parse the optional `_index.json` seed.
    pub fn load_index(&self) -> Result<IndexSeed, LoadError> {
        let path = self.issues_dir.join("_index.json");
        if !path.is_file() {
            return Ok(IndexSeed::default());
        }
        read_json(&path)
    }

    /// Label definitions from the optional `_labels.json`; empty when the
    /// file is absent.
    pub fn load_labels(&self) -> Result<Vec<LabelSpec>, LoadError> {
        let path = self.issues_dir.join("_labels.json");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let file: LabelsFile = read_json(&path)?;
        Ok(file.labels)
    }

    /// Milestone definitions from the optional `_milestones.json`; empty
    /// when the file is absent.
    pub fn load_milestones(&self) -> Result<Vec<MilestoneSpec>, LoadError> {
        let path = self.issues_dir.join("_milestones.json");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let file: MilestonesFile = read_json(&path)?;
        Ok(file.milestones)
    }

    fn issue_files(&self) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();
        walk(&self.issues_dir, &mut files)?;
        files.sort();
        Ok(files)
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
