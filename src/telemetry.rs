//! Tracing setup for the CLI.
//!
//! Verbosity flags pick the default level; the `LOG` environment variable
//! overrides it with a full filter directive. Output goes to stderr so
//! stdout stays machine-parseable.

use tracing::Level;
use tracing_subscriber::EnvFilter;

fn level_from_verbosity(quiet: bool, verbose: u8) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub fn init(quiet: bool, verbose: u8) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(quiet, verbose).into())
        .with_env_var("LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
