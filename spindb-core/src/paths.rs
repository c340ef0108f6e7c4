//! Deterministic path derivations for everything SpinDB stores on disk.
//!
//! All functions are pure over the resolved root; nothing here touches the
//! filesystem. The layout:
//!
//! ```text
//! ~/.spindb/
//!   bin/{engine}-{version}-{platform}-{arch}/bin/...
//!   containers/{engine}/{name}/container.json
//!   config.json
//!   spindb.log
//! ```

use std::path::{Path, PathBuf};

use spindb_model::{
    Arch, Engine, EngineDefaults, PidFileLocation, Platform, bin_dir_name,
};

/// Resolved storage root plus the path functions hanging off it.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Resolve the root from `SPINDB_HOME`, falling back to
    /// `~/.spindb`.
    pub fn resolve() -> Paths {
        let root = match std::env::var("SPINDB_HOME") {
            Ok(home) if !home.trim().is_empty() => PathBuf::from(home),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".spindb"),
        };
        Paths { root }
    }

    /// Root at an explicit location. Tests use this with a tempdir.
    pub fn with_root(root: impl Into<PathBuf>) -> Paths {
        Paths { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of installed engine binaries.
    pub fn bin(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Directory of all container directories.
    pub fn containers(&self) -> PathBuf {
        self.root.join("containers")
    }

    /// User-level configuration file.
    pub fn config(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// JSON-per-line diagnostic log.
    pub fn log(&self) -> PathBuf {
        self.root.join("spindb.log")
    }

    /// Canonical directory of one container.
    pub fn container_path(&self, name: &str, engine: Engine) -> PathBuf {
        self.containers().join(engine.id()).join(name)
    }

    /// The container's `container.json`.
    pub fn container_config(&self, name: &str, engine: Engine) -> PathBuf {
        self.container_path(name, engine).join("container.json")
    }

    /// Data directory (server-based) or data file (file-based).
    pub fn container_data(&self, name: &str, engine: Engine) -> PathBuf {
        let defaults = EngineDefaults::for_engine(engine);
        if engine.is_file_based() {
            // The file is the database: {name}.{engine-suffix}
            self.container_path(name, engine)
                .join(format!("{name}.{}", defaults.data_subdir))
        } else {
            self.container_path(name, engine).join(defaults.data_subdir)
        }
    }

    /// The engine's stdout/stderr log file.
    pub fn container_log(&self, name: &str, engine: Engine) -> PathBuf {
        let defaults = EngineDefaults::for_engine(engine);
        self.container_path(name, engine).join(defaults.log_file)
    }

    /// The pid file, resolved per engine policy: engines whose server
    /// writes its own pidfile (PostgreSQL) resolve under the data dir,
    /// everything else under the container dir.
    pub fn container_pid(&self, name: &str, engine: Engine) -> PathBuf {
        let defaults = EngineDefaults::for_engine(engine);
        match defaults.pid_location {
            PidFileLocation::DataDir => {
                self.container_data(name, engine).join(defaults.pid_file)
            }
            PidFileLocation::ContainerDir => {
                self.container_path(name, engine).join(defaults.pid_file)
            }
        }
    }

    /// Bin directory for one installed binary tuple. The executables live
    /// under its `bin/` subdirectory.
    pub fn binary_path(
        &self,
        engine: Engine,
        version: &str,
        platform: Platform,
        arch: Arch,
    ) -> PathBuf {
        self.bin().join(bin_dir_name(engine, version, platform, arch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> Paths {
        Paths::with_root("/home/u/.spindb")
    }

    #[test]
    fn layout_is_deterministic() {
        let p = paths();
        assert_eq!(p.bin(), PathBuf::from("/home/u/.spindb/bin"));
        assert_eq!(
            p.container_config("myapp", Engine::PostgreSql),
            PathBuf::from(
                "/home/u/.spindb/containers/postgresql/myapp/container.json"
            )
        );
        assert_eq!(
            p.binary_path(
                Engine::Redis,
                "8.0.2",
                Platform::Linux,
                Arch::Arm64
            ),
            PathBuf::from("/home/u/.spindb/bin/redis-8.0.2-linux-arm64")
        );
    }

    #[test]
    fn postgres_pid_resolves_under_data() {
        let p = paths();
        assert_eq!(
            p.container_pid("myapp", Engine::PostgreSql),
            PathBuf::from(
                "/home/u/.spindb/containers/postgresql/myapp/data/postmaster.pid"
            )
        );
    }

    #[test]
    fn redis_pid_resolves_under_container_dir() {
        let p = paths();
        assert_eq!(
            p.container_pid("cache", Engine::Redis),
            PathBuf::from("/home/u/.spindb/containers/redis/cache/redis.pid")
        );
    }

    #[test]
    fn file_based_data_is_a_file() {
        let p = paths();
        assert_eq!(
            p.container_data("notes", Engine::Sqlite),
            PathBuf::from("/home/u/.spindb/containers/sqlite/notes/notes.sqlite")
        );
    }
}
