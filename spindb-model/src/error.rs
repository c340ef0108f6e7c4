//! The closed error set shared by every SpinDB crate.
//!
//! Each variant carries its context in typed fields; `code`, `severity`,
//! and `hint` expose the stable machine-facing surface the CLI renders in
//! both human and `--json` modes.

use std::path::PathBuf;

use thiserror::Error;

/// How bad a failure is, from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Error, Debug)]
pub enum SpinError {
    // -- Ports -----------------------------------------------------------
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("binding port {port} was denied by the operating system")]
    PortPermissionDenied { port: u16 },

    #[error("no free port in range {start}-{end}")]
    PortRangeExhausted { start: u16, end: u16 },

    // -- Processes -------------------------------------------------------
    #[error("failed to start {engine} server for '{container}': {reason}")]
    StartFailed {
        engine: String,
        container: String,
        reason: String,
    },

    #[error("'{container}' did not stop within {waited_secs}s")]
    StopTimeout {
        container: String,
        waited_secs: u64,
    },

    #[error("container '{container}' is already running")]
    AlreadyRunning { container: String },

    #[error("container '{container}' is not running")]
    NotRunning { container: String },

    #[error("pid file {path} is corrupt: {contents:?}")]
    PidFileCorrupt { path: PathBuf, contents: String },

    #[error("pid file {path} references pid {pid} which is not alive")]
    PidFileStale { path: PathBuf, pid: u32 },

    #[error("failed to read pid file {path}: {source}")]
    PidFileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -- Binaries --------------------------------------------------------
    #[error("no published binary for {engine} {version} ({platform}-{arch})")]
    BinaryNotPublished {
        engine: String,
        version: String,
        platform: String,
        arch: String,
    },

    #[error("download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("download of {url} timed out after {timeout_secs}s")]
    DownloadTimedOut { url: String, timeout_secs: u64 },

    #[error("{engine} binary reports version {actual}, expected {expected}")]
    BinaryVersionMismatch {
        engine: String,
        expected: String,
        actual: String,
    },

    // -- Restore ---------------------------------------------------------
    #[error(
        "backup was taken with {engine} {backup_version}, target runs {target_version}"
    )]
    RestoreVersionMismatch {
        engine: String,
        backup_version: String,
        target_version: String,
    },

    #[error("restore completed with {failed} failed statements of {total}")]
    RestorePartialFailure { failed: usize, total: usize },

    #[error("restore failed: {reason}")]
    RestoreCompleteFailure { reason: String },

    #[error("unrecognized backup format for {path}")]
    BackupFormatUnknown { path: PathBuf },

    #[error("{path} is a {found} dump, not a {expected} dump")]
    WrongEngineDump {
        path: PathBuf,
        expected: String,
        found: String,
    },

    // -- Containers ------------------------------------------------------
    #[error("container '{name}' not found")]
    ContainerNotFound { name: String },

    #[error("container '{name}' already exists")]
    ContainerAlreadyExists { name: String },

    #[error("container '{name}' is running; stop it first")]
    ContainerRunning { name: String },

    #[error("failed to create container '{name}': {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("failed to initialize data directory for '{name}': {reason}")]
    InitFailed { name: String, reason: String },

    #[error("failed to create database '{database}': {reason}")]
    DatabaseCreateFailed { database: String, reason: String },

    #[error(
        "invalid database name '{name}': must start with a letter and contain only letters, digits, and underscores"
    )]
    InvalidDatabaseName { name: String },

    #[error(
        "invalid container name '{name}': must start with a letter and contain only letters, digits, underscores, and hyphens"
    )]
    InvalidContainerName { name: String },

    // -- Dependencies ----------------------------------------------------
    #[error("required tool '{tool}' was not found on PATH")]
    DependencyMissing { tool: String },

    #[error("'{tool}' version {actual} is incompatible; need {required}")]
    DependencyVersionIncompatible {
        tool: String,
        required: String,
        actual: String,
    },

    // -- Model -----------------------------------------------------------
    #[error("unknown engine '{engine}'")]
    UnknownEngine { engine: String },

    #[error("unknown platform or architecture '{platform}'")]
    UnknownPlatform { platform: String },

    // -- Misc ------------------------------------------------------------
    #[error("could not connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("rollback action '{description}' failed: {reason}")]
    RollbackFailed { description: String, reason: String },

    #[error("could not copy to clipboard: {reason}")]
    ClipboardFailed { reason: String },

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Unknown(String),
}

impl SpinError {
    /// Stable machine-readable code, surfaced in `--json` output.
    pub const fn code(&self) -> &'static str {
        match self {
            SpinError::PortInUse { .. } => "PORT_IN_USE",
            SpinError::PortPermissionDenied { .. } => "PORT_PERMISSION_DENIED",
            SpinError::PortRangeExhausted { .. } => "PORT_RANGE_EXHAUSTED",
            SpinError::StartFailed { .. } => "PROCESS_START_FAILED",
            SpinError::StopTimeout { .. } => "PROCESS_STOP_TIMEOUT",
            SpinError::AlreadyRunning { .. } => "PROCESS_ALREADY_RUNNING",
            SpinError::NotRunning { .. } => "PROCESS_NOT_RUNNING",
            SpinError::PidFileCorrupt { .. } => "PID_FILE_CORRUPT",
            SpinError::PidFileStale { .. } => "PID_FILE_STALE",
            SpinError::PidFileReadFailed { .. } => "PID_FILE_READ_FAILED",
            SpinError::BinaryNotPublished { .. } => "BINARY_NOT_PUBLISHED",
            SpinError::DownloadFailed { .. } => "DOWNLOAD_FAILED",
            SpinError::DownloadTimedOut { .. } => "DOWNLOAD_TIMED_OUT",
            SpinError::BinaryVersionMismatch { .. } => "BINARY_VERSION_MISMATCH",
            SpinError::RestoreVersionMismatch { .. } => "RESTORE_VERSION_MISMATCH",
            SpinError::RestorePartialFailure { .. } => "RESTORE_PARTIAL_FAILURE",
            SpinError::RestoreCompleteFailure { .. } => "RESTORE_COMPLETE_FAILURE",
            SpinError::BackupFormatUnknown { .. } => "BACKUP_FORMAT_UNKNOWN",
            SpinError::WrongEngineDump { .. } => "WRONG_ENGINE_DUMP",
            SpinError::ContainerNotFound { .. } => "CONTAINER_NOT_FOUND",
            SpinError::ContainerAlreadyExists { .. } => "CONTAINER_ALREADY_EXISTS",
            SpinError::ContainerRunning { .. } => "CONTAINER_RUNNING",
            SpinError::CreateFailed { .. } => "CONTAINER_CREATE_FAILED",
            SpinError::InitFailed { .. } => "CONTAINER_INIT_FAILED",
            SpinError::DatabaseCreateFailed { .. } => "DATABASE_CREATE_FAILED",
            SpinError::InvalidDatabaseName { .. } => "INVALID_DATABASE_NAME",
            SpinError::InvalidContainerName { .. } => "INVALID_CONTAINER_NAME",
            SpinError::DependencyMissing { .. } => "DEPENDENCY_MISSING",
            SpinError::DependencyVersionIncompatible { .. } => {
                "DEPENDENCY_VERSION_INCOMPATIBLE"
            }
            SpinError::UnknownEngine { .. } => "UNKNOWN_ENGINE",
            SpinError::UnknownPlatform { .. } => "UNKNOWN_PLATFORM",
            SpinError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            SpinError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            SpinError::ClipboardFailed { .. } => "CLIPBOARD_FAILED",
            SpinError::FileNotFound { .. } => "FILE_NOT_FOUND",
            SpinError::PermissionDenied { .. } => "PERMISSION_DENIED",
            SpinError::Io(_) => "IO_ERROR",
            SpinError::Serialization(_) => "SERIALIZATION_ERROR",
            SpinError::Unknown(_) => "UNKNOWN",
        }
    }

    pub const fn severity(&self) -> Severity {
        match self {
            SpinError::PidFileStale { .. }
            | SpinError::RestorePartialFailure { .. }
            | SpinError::RollbackFailed { .. }
            | SpinError::ClipboardFailed { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Optional remediation hint shown under the error message.
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            SpinError::PortInUse { .. } => {
                Some("pick another port with --port, or stop the process holding it")
            }
            SpinError::PortPermissionDenied { .. } => {
                Some("ports below 1024 need elevated privileges; choose a higher port")
            }
            SpinError::AlreadyRunning { .. } => {
                Some("use `spindb stop <name>` first, or `spindb list` to inspect state")
            }
            SpinError::NotRunning { .. } => Some("start it with `spindb start <name>`"),
            SpinError::ContainerRunning { .. } => {
                Some("stop the container with `spindb stop <name>` and retry")
            }
            SpinError::PidFileStale { .. } | SpinError::PidFileCorrupt { .. } => {
                Some("run `spindb doctor` to clean up stale state")
            }
            SpinError::BinaryNotPublished { .. } => {
                Some("run `spindb create --help` to see versions known to the registry")
            }
            SpinError::DownloadTimedOut { .. } => {
                Some("check your network connection and retry")
            }
            SpinError::DependencyMissing { .. } => {
                Some("install the tool or add it to PATH, then run `spindb doctor`")
            }
            SpinError::InvalidDatabaseName { .. } => {
                Some("database names must match ^[A-Za-z][A-Za-z0-9_]*$")
            }
            _ => None,
        }
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, SpinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SpinError::PortInUse { port: 5432 }.code(), "PORT_IN_USE");
        assert_eq!(
            SpinError::ContainerNotFound {
                name: "x".to_string()
            }
            .code(),
            "CONTAINER_NOT_FOUND"
        );
    }

    #[test]
    fn stale_pidfile_is_a_warning() {
        let err = SpinError::PidFileStale {
            path: PathBuf::from("/tmp/x.pid"),
            pid: 1234,
        };
        assert_eq!(err.severity(), Severity::Warning);
    }

    #[test]
    fn hints_exist_for_user_recoverable_errors() {
        assert!(SpinError::PortInUse { port: 1 }.hint().is_some());
        assert!(
            SpinError::Unknown("internal".to_string())
                .hint()
                .is_none()
        );
    }
}
