//! Config loading with environment overrides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Effect, Transience};

const CONFIG_FILE: &str = "issuesync.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub issues_dir: PathBuf,
    pub state_file: PathBuf,
    pub workers: usize,
    /// `owner/name`; discovered from the origin remote when absent.
    pub repo: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            issues_dir: PathBuf::from(".github/issues"),
            state_file: PathBuf::from(".github/.sync-state.json"),
            workers: 4,
            repo: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not detect repository: {reason}")]
    RepoDetection { reason: String },
}

impl ConfigError {
    pub fn transience(&self) -> Transience {
        match self {
            ConfigError::Io { .. } => Transience::Unknown,
            _ => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

/// Load `issuesync.json` (or an explicit path). A missing default file is
/// not an error; an explicit path must exist.
pub fn load(path: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(CONFIG_FILE), false),
    };
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
            return Ok(SyncConfig::default());
        }
        Err(e) => return Err(ConfigError::Io { path, source: e }),
    };
    serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse { path, source })
}

/// `ISYNC_*` variables win over the file, CLI flags win over both.
pub fn apply_env_overrides(cfg: &mut SyncConfig) {
    if let Ok(dir) = std::env::var("ISYNC_ISSUES_DIR") {
        cfg.issues_dir = PathBuf::from(dir);
    }
    if let Ok(file) = std::env::var("ISYNC_STATE_FILE") {
        cfg.state_file = PathBuf::from(file);
    }
    if let Ok(repo) = std::env::var("ISYNC_REPO") {
        cfg.repo = Some(repo);
    }
    if let Ok(workers) = std::env::var("ISYNC_WORKERS") {
        if let Ok(n) = workers.parse::<usize>() {
            cfg.workers = n.max(1);
        }
    }
}

/// Derive `(owner, name)` from the `origin` remote of the repository
/// containing `path`.
pub fn detect_repo(path: &Path) -> Result<(String, String), ConfigError> {
    let repo = git2::Repository::discover(path).map_err(|e| ConfigError::RepoDetection {
        reason: format!("not inside a git repository: {e}"),
    })?;
    let remote = repo.find_remote("origin").map_err(|e| ConfigError::RepoDetection {
        reason: format!("no origin remote: {e}"),
    })?;
    let url = remote.url().ok_or_else(|| ConfigError::RepoDetection {
        reason: "origin remote url is not utf-8".into(),
    })?;
    parse_remote_url(url)
}

/// Accepts `git@github.com:owner/name.git` and `https://github.com/owner/name[.git]`.
pub fn parse_remote_url(url: &str) -> Result<(String, String), ConfigError> {
    let path = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .ok_or_else(|| ConfigError::RepoDetection {
            reason: format!("unsupported remote url format: {url}"),
        })?;
    let path = path.strip_suffix(".git").unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    match path.split('/').collect::<Vec<_>>().as_slice() {
        [owner, name] if !owner.is_empty() && !name.is_empty() => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(ConfigError::RepoDetection {
            reason: format!("invalid repo path: {path}"),
        }),
    }
}

/// Split an explicit `owner/name` argument.
pub fn split_repo_arg(arg: &str) -> Result<(String, String), ConfigError> {
    match arg.split('/').collect::<Vec<_>>().as_slice() {
        [owner, name] if !owner.is_empty() && !name.is_empty() => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(ConfigError::RepoDetection {
            reason: format!("expected owner/name, got `{arg}`"),
        }),
    }
}
