use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::SpinError;

static CONTAINER_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap()
});

static DATABASE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap()
});

/// Runtime state of a container, recomputed on every `list`.
///
/// Server-based engines report `Running`/`Stopped` from a liveness probe;
/// file-based engines report `Available`/`Missing` from file existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Available,
    Missing,
}

impl Display for ContainerStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Available => "available",
            ContainerStatus::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// Persisted description of one managed container.
///
/// Stored as `containers/{engine}/{name}/container.json`. Unknown keys in
/// the file are ignored so older builds can read configs written by newer
/// ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub name: String,
    pub engine: Engine,
    pub version: String,
    /// 0 for file-based engines.
    pub port: u16,
    /// Primary/initial database name.
    pub database: String,
    /// All logical databases, for multi-database engines. Always contains
    /// `database`.
    #[serde(default)]
    pub databases: Vec<String>,
    /// Absolute path to the data directory (server-based) or data file
    /// (file-based).
    pub data_path: PathBuf,
    /// Absolute path to the bin directory hosting this version's
    /// executables. Empty for file-based engines managed by a client tool
    /// on PATH.
    pub binary_path: PathBuf,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
    /// Backing PostgreSQL version, only set for FerretDB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_version: Option<String>,
}

impl ContainerConfig {
    /// Whether this container owns a server process.
    pub fn is_server_based(&self) -> bool {
        !self.engine.is_file_based()
    }
}

/// Validate a container name against `^[A-Za-z][A-Za-z0-9_-]*$`.
pub fn validate_container_name(name: &str) -> Result<(), SpinError> {
    if CONTAINER_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SpinError::InvalidContainerName {
            name: name.to_string(),
        })
    }
}

/// Validate a database name against `^[A-Za-z][A-Za-z0-9_]*$`.
///
/// Hyphens are rejected outright rather than silently quoted; many engines
/// require quoted identifiers for them.
pub fn validate_database_name(name: &str) -> Result<(), SpinError> {
    if DATABASE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SpinError::InvalidDatabaseName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names() {
        assert!(validate_container_name("myapp").is_ok());
        assert!(validate_container_name("My-App_2").is_ok());
        assert!(validate_container_name("2fast").is_err());
        assert!(validate_container_name("-lead").is_err());
        assert!(validate_container_name("").is_err());
        assert!(validate_container_name("has space").is_err());
    }

    #[test]
    fn database_names_reject_hyphens() {
        assert!(validate_database_name("analytics").is_ok());
        assert!(validate_database_name("analytics_2").is_ok());
        assert!(validate_database_name("analytics-2").is_err());
        assert!(validate_database_name("_lead").is_err());
    }

    #[test]
    fn config_round_trips_and_ignores_unknown_keys() {
        let json = r#"{
            "name": "myapp",
            "engine": "postgresql",
            "version": "17.5",
            "port": 5432,
            "database": "myapp",
            "dataPath": "/home/u/.spindb/containers/postgresql/myapp/data",
            "binaryPath": "/home/u/.spindb/bin/postgresql-17.5-linux-x64/bin",
            "status": "stopped",
            "createdAt": "2025-06-01T12:00:00Z",
            "futureField": true
        }"#;
        let cfg: ContainerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.engine, Engine::PostgreSql);
        assert_eq!(cfg.port, 5432);
        assert!(cfg.databases.is_empty());
        assert!(cfg.backend_version.is_none());

        let out = serde_json::to_string(&cfg).unwrap();
        assert!(out.contains("\"dataPath\""));
        assert!(!out.contains("backendVersion"));
    }
}
