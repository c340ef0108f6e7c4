//! The abstract engine contract and the registry of implementations.
//!
//! Every supported engine realizes [`DatabaseEngine`]; the container
//! manager only ever talks to the trait. Engines hold no state of their
//! own (everything lives in [`ContainerConfig`] and on disk), so a
//! single static instance per engine serves the whole process.

pub mod clickhouse;
pub mod ferretdb;
pub mod file;
pub mod meilisearch;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod qdrant;
pub mod questdb;
pub mod readiness;
pub mod redis;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;

use spindb_model::{
    ContainerConfig, Engine, EngineDefaults, Platform, SpinError,
    executable_extension,
};

use crate::paths::Paths;
use crate::process::ProcessManager;

/// Services shared by every engine implementation.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub paths: Paths,
    pub process: ProcessManager,
}

impl EngineContext {
    pub fn new(paths: Paths) -> EngineContext {
        let process = ProcessManager::new(paths.clone());
        EngineContext { paths, process }
    }
}

/// What `start` hands back once the readiness probe succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub port: u16,
    pub connection_string: String,
}

/// Serialized backup representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    /// Plain SQL text.
    Sql,
    /// Engine-native binary dump (e.g. `pg_dump -Fc`).
    Dump,
    /// Archive of the data files themselves (RDB snapshot, mongodump
    /// archive, data-file copy).
    Archive,
}

impl FromStr for BackupFormat {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sql" => Ok(BackupFormat::Sql),
            "dump" | "custom" => Ok(BackupFormat::Dump),
            "archive" => Ok(BackupFormat::Archive),
            other => Err(SpinError::BackupFormatUnknown {
                path: PathBuf::from(other),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub format: Option<BackupFormat>,
    /// Restrict to one database; defaults to the container's primary.
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Drop existing objects before loading where the engine supports it.
    pub clean: bool,
    pub database: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub format: BackupFormat,
}

/// A script to run: a file, inline statements, or both (file first).
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest {
    pub file: Option<PathBuf>,
    pub sql: Option<String>,
}

/// Parsed result rows from `execute_query`.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub rows: Vec<Vec<String>>,
}

impl QueryOutput {
    /// Parse delimiter-separated client output (one row per line).
    pub fn from_delimited(stdout: &str, delimiter: char) -> QueryOutput {
        let rows = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split(delimiter).map(|s| s.trim().to_string()).collect()
            })
            .collect();
        QueryOutput { rows }
    }

    /// The first cell, when the query returned exactly one value.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first().and_then(|r| r.first()).map(String::as_str)
    }
}

/// The contract every engine implements. Operations that make no sense
/// for an engine class (databases on single-database engines, processes
/// on file-based engines) are accepted and either no-op or return a
/// typed error, as documented per method.
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    fn engine(&self) -> Engine;

    fn defaults(&self) -> &'static EngineDefaults {
        EngineDefaults::for_engine(self.engine())
    }

    /// Pure derivation of the connection string for `db` (or the primary
    /// database).
    fn connection_string(&self, cfg: &ContainerConfig, db: Option<&str>) -> String;

    /// Create the data directory/file and engine configuration for a new
    /// container. Runs before the first `start`.
    async fn init_data_dir(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError>;

    /// Spawn the detached server, write the pid file, and block until the
    /// readiness probe succeeds. Idempotent: returns the existing
    /// endpoint when already running.
    async fn start(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<StartOutcome, SpinError>;

    /// Graceful stop via the process manager (pid file first, port
    /// fallback, TERM then KILL).
    async fn stop(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        ctx.process.stop(&cfg.name, cfg.engine, cfg.port).await
    }

    /// Whether the server currently answers its probe.
    async fn status(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<bool, SpinError> {
        ctx.process
            .is_running(&cfg.name, cfg.engine, cfg.port)
            .await
    }

    async fn backup(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        out: &Path,
        opts: &BackupOptions,
    ) -> Result<BackupOutcome, SpinError>;

    async fn restore(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        input: &Path,
        opts: &RestoreOptions,
    ) -> Result<(), SpinError>;

    /// Connect to a remote instance and produce a backup this engine can
    /// restore.
    async fn dump_from_connection_string(
        &self,
        ctx: &EngineContext,
        url: &str,
        out: &Path,
    ) -> Result<(), SpinError>;

    /// Execute a script file and/or inline statement via the engine's
    /// client.
    async fn run_script(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        script: &ScriptRequest,
    ) -> Result<String, SpinError>;

    /// Execute one query and return its rows.
    async fn execute_query(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        query: &str,
        db: Option<&str>,
    ) -> Result<QueryOutput, SpinError>;

    /// Launch the interactive client with inherited stdio.
    async fn connect(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> Result<(), SpinError>;

    /// Create a logical database. Single-database engines accept and
    /// no-op.
    async fn create_database(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError>;

    /// Drop a logical database. Single-database engines accept and no-op.
    async fn drop_database(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError>;

    /// On-disk size in bytes; `None` when unknown.
    async fn database_size(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<Option<u64>, SpinError> {
        Ok(crate::fsutil::path_size(&cfg.data_path))
    }
}

/// Resolve the implementation for an engine id.
pub fn engine_for(engine: Engine) -> &'static dyn DatabaseEngine {
    match engine {
        Engine::PostgreSql => &postgres::PostgresEngine,
        Engine::MySql => &mysql::MySqlEngine { flavor: mysql::Flavor::MySql },
        Engine::MariaDb => {
            &mysql::MySqlEngine { flavor: mysql::Flavor::MariaDb }
        }
        Engine::Sqlite => &file::FileEngine { engine: Engine::Sqlite },
        Engine::DuckDb => &file::FileEngine { engine: Engine::DuckDb },
        Engine::Redis => &redis::RedisEngine { engine: Engine::Redis },
        Engine::Valkey => &redis::RedisEngine { engine: Engine::Valkey },
        Engine::MongoDb => &mongodb::MongoEngine,
        Engine::FerretDb => &ferretdb::FerretEngine,
        Engine::ClickHouse => &clickhouse::ClickHouseEngine,
        Engine::Qdrant => &qdrant::QdrantEngine,
        Engine::Meilisearch => &meilisearch::MeilisearchEngine,
        Engine::QuestDb => &questdb::QuestDbEngine,
    }
}

/// Path of a tool shipped in the container's bin directory.
pub fn tool_path(cfg: &ContainerConfig, tool: &str) -> PathBuf {
    let name = format!("{tool}{}", executable_extension(Platform::current()));
    cfg.binary_path.join(name)
}

/// Spawn a detached server process with stdout/stderr appended to the
/// container log. Returns the child pid when the OS reports one.
pub async fn spawn_detached(
    command: &mut tokio::process::Command,
    log_path: &Path,
) -> Result<Option<u32>, SpinError> {
    if let Some(parent) = log_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let log_err = log.try_clone()?;

    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::from(log))
        .stderr(std::process::Stdio::from(log_err));
    #[cfg(unix)]
    {
        // New process group so the server survives the CLI's exit and
        // never sees its Ctrl-C.
        command.process_group(0);
    }
    let child = command.spawn().map_err(|err| SpinError::Unknown(
        format!("failed to spawn server process: {err}"),
    ))?;
    Ok(child.id())
}

/// Run a client tool to completion, returning stdout. Non-zero exit maps
/// to a typed error carrying the stderr tail.
pub async fn run_tool(
    command: &mut tokio::process::Command,
    what: &str,
) -> Result<String, SpinError> {
    let output = command.output().await.map_err(|err| {
        SpinError::DependencyMissing {
            tool: format!("{what} ({err})"),
        }
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(SpinError::Unknown(format!(
            "{what} exited with {}: {}",
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run the interactive client with stdio inherited.
pub async fn run_interactive(
    command: &mut tokio::process::Command,
    what: &str,
) -> Result<(), SpinError> {
    let status = command
        .stdin(std::process::Stdio::inherit())
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .status()
        .await
        .map_err(|err| SpinError::DependencyMissing {
            tool: format!("{what} ({err})"),
        })?;
    if !status.success() {
        return Err(SpinError::Unknown(format!("{what} exited with {status}")));
    }
    Ok(())
}

/// Read the tail of an engine log, used to enrich start failures.
pub async fn log_tail(log_path: &Path, max_lines: usize) -> String {
    match tokio::fs::read_to_string(log_path).await {
        Ok(contents) => {
            let lines: Vec<&str> = contents.lines().collect();
            let start = lines.len().saturating_sub(max_lines);
            lines[start..].join("\n")
        }
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_engine_resolves_to_its_implementation() {
        for engine in Engine::ALL {
            assert_eq!(engine_for(engine).engine(), engine);
        }
    }

    #[test]
    fn backup_format_parses() {
        assert_eq!("sql".parse::<BackupFormat>().unwrap(), BackupFormat::Sql);
        assert_eq!(
            "custom".parse::<BackupFormat>().unwrap(),
            BackupFormat::Dump
        );
        assert!("parquet".parse::<BackupFormat>().is_err());
    }

    #[test]
    fn delimited_query_output_parses() {
        let out = QueryOutput::from_delimited("a|1\nb|2\n\n", '|');
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0], vec!["a", "1"]);
        assert_eq!(out.scalar(), Some("a"));
    }
}
