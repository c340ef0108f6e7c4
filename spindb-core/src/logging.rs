//! Tracing setup: human-readable stderr output filtered by `RUST_LOG`,
//! plus a JSON-per-line file layer at `~/.spindb/spindb.log` that captures
//! warnings, errors, and debug traces for post-mortem.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::paths::Paths;

/// Install the global subscriber. Safe to call once per process; the CLI
/// calls it before dispatching a command.
pub fn init(paths: &Paths, verbose: bool) -> Result<()> {
    let default_stderr = if verbose { "debug" } else { "warn" };
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_stderr));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter);

    std::fs::create_dir_all(paths.root()).with_context(|| {
        format!("failed to create {}", paths.root().display())
    })?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log())
        .with_context(|| format!("failed to open {}", paths.log().display()))?;

    let file_layer = fmt::layer()
        .json()
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("tracing subscriber was already installed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_root_and_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path().join("home"));
        // First init in the test process wins; a second would error, which
        // is also what we assert.
        let first = init(&paths, false);
        if first.is_ok() {
            assert!(paths.log().exists());
            assert!(init(&paths, false).is_err());
        }
    }
}
