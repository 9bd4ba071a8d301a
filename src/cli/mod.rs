//! CLI surface for issuesync.
//!
//! Thin layer: parse flags, build the config, wire the loader, store, and
//! gateway together, run one pass, render the report. Exit-code policy
//! lives on the report, not here.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, builder::BoolishValueParser};

use crate::config::{self, SyncConfig};
use crate::driver::{CancelToken, SyncDriver, SyncMode};
use crate::gateway::{GitHubGateway, LabelCatalog, NullGateway, RemoteGateway};
use crate::loader::IssueLoader;
use crate::store::SyncStateStore;
use crate::{Error, Result};

mod render;

#[derive(Parser, Debug)]
#[command(
    name = "isync",
    version,
    about = "Declarative issue sync: local records to a remote tracker",
    infer_long_args = true
)]
pub struct Cli {
    /// Directory of local issue records (default: .github/issues).
    #[arg(long, value_name = "DIR")]
    pub issues_dir: Option<PathBuf>,

    /// Sync state file (default: .github/.sync-state.json).
    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// Config file (default: issuesync.json, optional).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Remote repository as owner/name (default: detect from origin).
    #[arg(long, value_name = "OWNER/NAME")]
    pub repo: Option<String>,

    /// Worker threads for remote calls.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Plan and report without touching the remote or the state file.
    #[arg(
        long,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub dry_run: bool,

    /// Re-sync every issue even when fingerprints match.
    #[arg(
        long,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub force: bool,

    /// Print recorded sync state and exit.
    #[arg(
        long,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub status: bool,

    /// Clear the sync state file and exit.
    #[arg(
        long,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub reset: bool,

    /// Errors only.
    #[arg(
        short = 'q',
        long,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub quiet: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

/// Run one invocation; the returned code is the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    let mut cfg = config::load(cli.config.as_deref())?;
    config::apply_env_overrides(&mut cfg);
    apply_cli_overrides(&mut cfg, &cli);

    let store = SyncStateStore::new(&cfg.state_file);

    if cli.reset {
        store.reset()?;
        println!("sync state cleared");
        return Ok(0);
    }
    if cli.status {
        let state = store.load()?;
        print!("{}", render::render_status(&state));
        return Ok(0);
    }

    let loader = IssueLoader::new(&cfg.issues_dir)?;
    let issues = loader.load_all()?;
    let label_specs = loader.load_labels()?;
    let milestone_specs = loader.load_milestones()?;
    tracing::debug!(count = issues.len(), dir = %cfg.issues_dir.display(), "loaded issue records");

    let gateway: Arc<dyn RemoteGateway> = if cli.dry_run {
        // Dry runs never reach the gateway, so no token or repo needed.
        Arc::new(NullGateway)
    } else {
        let (owner, name) = resolve_repo(&cfg)?;
        Arc::new(GitHubGateway::from_env(owner, name)?)
    };

    let mode = if cli.dry_run {
        SyncMode::DryRun
    } else {
        SyncMode::Apply
    };
    let driver = SyncDriver::new(store, gateway, LabelCatalog::seeded(&label_specs))
        .with_workers(cfg.workers)
        .with_label_specs(label_specs)
        .with_milestone_specs(milestone_specs);
    let report = driver.run(&issues, mode, cli.force, &CancelToken::new())?;

    print!("{}", render::render_report(&report));
    Ok(report.exit_code())
}

fn apply_cli_overrides(cfg: &mut SyncConfig, cli: &Cli) {
    if let Some(dir) = &cli.issues_dir {
        cfg.issues_dir = dir.clone();
    }
    if let Some(file) = &cli.state_file {
        cfg.state_file = file.clone();
    }
    if let Some(repo) = &cli.repo {
        cfg.repo = Some(repo.clone());
    }
    if let Some(workers) = cli.workers {
        cfg.workers = workers.max(1);
    }
}

fn resolve_repo(cfg: &SyncConfig) -> Result<(String, String)> {
    match &cfg.repo {
        Some(arg) => config::split_repo_arg(arg).map_err(Error::from),
        None => config::detect_repo(std::path::Path::new(".")).map_err(Error::from),
    }
}
