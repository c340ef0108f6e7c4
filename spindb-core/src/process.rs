//! Pid-file bookkeeping and the graceful stop sequence.
//!
//! The pid file is the primary source of truth for "is this container
//! running"; a port lookup is the fallback for engines whose launcher
//! forks and never hands us a usable child pid. Liveness is always
//! re-verified: a pid whose process is gone, or whose command no longer
//! looks like the engine, is stale and gets cleaned up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use spindb_model::{Engine, EngineDefaults, Platform, SpinError};

use crate::paths::Paths;
use crate::platform;

/// What we know about a managed server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub container: String,
    pub engine: Engine,
    pub port: Option<u16>,
}

/// Pid persistence and termination for managed containers.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    paths: Paths,
}

impl ProcessManager {
    pub fn new(paths: Paths) -> ProcessManager {
        ProcessManager { paths }
    }

    pub fn pid_path(&self, name: &str, engine: Engine) -> PathBuf {
        self.paths.container_pid(name, engine)
    }

    /// Parse a pid file's leading integer. `Ok(None)` when the file does
    /// not exist; `PidFileCorrupt` when it exists but holds no pid.
    /// PostgreSQL's `postmaster.pid` carries the pid on its first line,
    /// so first-line parsing covers both our files and engine-written
    /// ones.
    pub async fn read_pid(path: &Path) -> Result<Option<u32>, SpinError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => {
                return Err(SpinError::PidFileReadFailed {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        let first_line = contents.lines().next().unwrap_or("").trim();
        match first_line.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(SpinError::PidFileCorrupt {
                path: path.to_path_buf(),
                contents: first_line.chars().take(64).collect(),
            }),
        }
    }

    /// Write the canonical pid file for a container we spawned ourselves.
    pub async fn write_pid(path: &Path, pid: u32) -> Result<(), SpinError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, format!("{pid}\n")).await?;
        Ok(())
    }

    pub async fn remove_pid(path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove pid file");
            }
        }
    }

    /// Resolve the live pid for a container: pid file first, then port
    /// lookup. Stale pid files are removed along the way.
    pub async fn resolve_pid(
        &self,
        name: &str,
        engine: Engine,
        port: u16,
    ) -> Result<Option<u32>, SpinError> {
        let pid_path = self.pid_path(name, engine);
        match Self::read_pid(&pid_path).await {
            Ok(Some(pid)) => {
                if self.pid_matches_engine(pid, engine).await {
                    return Ok(Some(pid));
                }
                info!(
                    container = name,
                    pid, "stale pid file; cleaning up"
                );
                Self::remove_pid(&pid_path).await;
            }
            Ok(None) => {}
            Err(err @ SpinError::PidFileCorrupt { .. }) => {
                warn!(container = name, error = %err, "corrupt pid file; cleaning up");
                Self::remove_pid(&pid_path).await;
            }
            Err(err) => return Err(err),
        }

        if port == 0 {
            return Ok(None);
        }
        platform::find_process_by_port(port)
            .await
            .map_err(|err| SpinError::Unknown(format!("{err:#}")))
    }

    /// Whether `pid` is alive and its command still looks like the
    /// engine. A recycled pid owned by an unrelated command counts as
    /// stale.
    async fn pid_matches_engine(&self, pid: u32, engine: Engine) -> bool {
        if !platform::is_process_alive(pid) {
            return false;
        }
        let expected = EngineDefaults::for_engine(engine).server_binary;
        let stem = expected.split('.').next().unwrap_or(expected);
        match platform::process_command(pid).await {
            // QuestDB runs as `java`; accept any command we cannot
            // positively reject.
            Some(command) => {
                command.contains(stem)
                    || matches!(engine, Engine::QuestDb)
            }
            None => true,
        }
    }

    /// Liveness as seen from the pid file (with port fallback).
    pub async fn is_running(
        &self,
        name: &str,
        engine: Engine,
        port: u16,
    ) -> Result<bool, SpinError> {
        Ok(self.resolve_pid(name, engine, port).await?.is_some())
    }

    /// Graceful stop: TERM, wait out the engine's grace window, escalate
    /// to KILL, wait again, then remove the pid file. On Windows, also
    /// wait for the port to actually be released (TIME_WAIT).
    pub async fn stop(
        &self,
        name: &str,
        engine: Engine,
        port: u16,
    ) -> Result<(), SpinError> {
        let Some(pid) = self.resolve_pid(name, engine, port).await? else {
            return Err(SpinError::NotRunning {
                container: name.to_string(),
            });
        };

        let defaults = EngineDefaults::for_engine(engine);
        let grace = if Platform::current() == Platform::Win32 {
            // Windows services release handles slowly.
            Duration::from_secs(defaults.stop_grace_secs.max(5))
        } else {
            Duration::from_secs(defaults.stop_grace_secs)
        };

        debug!(container = name, pid, "stopping");
        platform::terminate_process(pid)
            .await
            .map_err(|err| SpinError::Unknown(format!("{err:#}")))?;

        if !platform::wait_for_exit(pid, grace).await {
            warn!(container = name, pid, "graceful stop timed out; killing");
            platform::kill_process(pid).await;
            if !platform::wait_for_exit(pid, grace).await {
                return Err(SpinError::StopTimeout {
                    container: name.to_string(),
                    waited_secs: grace.as_secs() * 2,
                });
            }
        }

        Self::remove_pid(&self.pid_path(name, engine)).await;

        if Platform::current() == Platform::Win32 && port != 0 {
            if !platform::wait_for_port_release(port, Duration::from_secs(10))
                .await
            {
                warn!(container = name, port, "port still held after stop");
            }
        }
        // Give the OS a beat to reap before callers re-probe.
        sleep(Duration::from_millis(50)).await;
        info!(container = name, pid, "stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_pid_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let pid = ProcessManager::read_pid(&dir.path().join("nope.pid"))
            .await
            .unwrap();
        assert_eq!(pid, None);
    }

    #[tokio::test]
    async fn corrupt_pid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pid");
        tokio::fs::write(&path, "not-a-pid\n").await.unwrap();
        let err = ProcessManager::read_pid(&path).await.unwrap_err();
        assert_eq!(err.code(), "PID_FILE_CORRUPT");
    }

    #[tokio::test]
    async fn postmaster_style_first_line_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postmaster.pid");
        tokio::fs::write(&path, "4242\n/data\n1700000000\n5432\n")
            .await
            .unwrap();
        let pid = ProcessManager::read_pid(&path).await.unwrap();
        assert_eq!(pid, Some(4242));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("spindb.pid");
        ProcessManager::write_pid(&path, 777).await.unwrap();
        assert_eq!(ProcessManager::read_pid(&path).await.unwrap(), Some(777));
        ProcessManager::remove_pid(&path).await;
        assert_eq!(ProcessManager::read_pid(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_pid_is_cleaned_on_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path());
        let manager = ProcessManager::new(paths.clone());

        let pid_path = manager.pid_path("cache", Engine::Redis);
        // A pid that cannot be alive.
        ProcessManager::write_pid(&pid_path, u32::MAX - 1)
            .await
            .unwrap();

        let resolved = manager
            .resolve_pid("cache", Engine::Redis, 0)
            .await
            .unwrap();
        assert_eq!(resolved, None);
        assert!(!pid_path.exists());
    }

    #[tokio::test]
    async fn stop_without_process_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProcessManager::new(Paths::with_root(dir.path()));
        let err = manager.stop("ghost", Engine::Redis, 0).await.unwrap_err();
        assert_eq!(err.code(), "PROCESS_NOT_RUNNING");
    }
}
