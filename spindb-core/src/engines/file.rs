//! SQLite and DuckDB: file-based engines with no server process.
//!
//! The data file *is* the database. Lifecycle operations that only make
//! sense for processes degrade gracefully: `start`/`stop` are accepted
//! no-ops and `status` is file existence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use spindb_model::{ContainerConfig, Engine, SpinError};

use super::{
    BackupFormat, BackupOptions, BackupOutcome, DatabaseEngine, EngineContext,
    QueryOutput, RestoreOptions, ScriptRequest, StartOutcome, run_interactive,
    run_tool,
};

pub struct FileEngine {
    pub engine: Engine,
}

impl FileEngine {
    fn client_name(&self) -> &'static str {
        self.defaults().server_binary
    }

    /// Installed client first, PATH fallback.
    fn client_path(&self, cfg: &ContainerConfig) -> Result<PathBuf, SpinError> {
        if !cfg.binary_path.as_os_str().is_empty() {
            let bundled = super::tool_path(cfg, self.client_name());
            if bundled.exists() {
                return Ok(bundled);
            }
        }
        which::which(self.client_name()).map_err(|_| {
            SpinError::DependencyMissing {
                tool: self.client_name().to_string(),
            }
        })
    }

    fn client(&self, cfg: &ContainerConfig) -> Result<Command, SpinError> {
        let mut cmd = Command::new(self.client_path(cfg)?);
        cmd.arg(&cfg.data_path);
        Ok(cmd)
    }
}

#[async_trait]
impl DatabaseEngine for FileEngine {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn connection_string(
        &self,
        cfg: &ContainerConfig,
        _db: Option<&str>,
    ) -> String {
        format!("{}://{}", self.defaults().scheme, cfg.data_path.display())
    }

    async fn init_data_dir(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        if let Some(parent) = cfg.data_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if cfg.data_path.exists() {
            return Ok(());
        }
        // Let the client write a well-formed header when available; an
        // empty file is a valid database for both engines otherwise.
        match self.client(cfg) {
            Ok(mut cmd) => {
                cmd.arg("VACUUM;");
                run_tool(&mut cmd, self.client_name()).await.map_err(
                    |err| SpinError::InitFailed {
                        name: cfg.name.clone(),
                        reason: err.to_string(),
                    },
                )?;
            }
            Err(_) => {
                tokio::fs::write(&cfg.data_path, b"").await?;
            }
        }
        Ok(())
    }

    async fn start(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<StartOutcome, SpinError> {
        // Nothing to spawn; the connection string points at the file.
        if !cfg.data_path.exists() {
            return Err(SpinError::FileNotFound {
                path: cfg.data_path.clone(),
            });
        }
        Ok(StartOutcome {
            port: 0,
            connection_string: self.connection_string(cfg, None),
        })
    }

    async fn stop(
        &self,
        _ctx: &EngineContext,
        _cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        Ok(())
    }

    async fn status(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<bool, SpinError> {
        Ok(cfg.data_path.exists())
    }

    async fn backup(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        out: &Path,
        opts: &BackupOptions,
    ) -> Result<BackupOutcome, SpinError> {
        let format = opts.format.unwrap_or(BackupFormat::Archive);
        match format {
            BackupFormat::Archive => {
                tokio::fs::copy(&cfg.data_path, out).await.map_err(|_| {
                    SpinError::FileNotFound {
                        path: cfg.data_path.clone(),
                    }
                })?;
            }
            BackupFormat::Sql if self.engine == Engine::Sqlite => {
                let mut cmd = self.client(cfg)?;
                cmd.arg(".dump");
                let sql = run_tool(&mut cmd, self.client_name()).await?;
                tokio::fs::write(out, sql).await?;
            }
            _ => {
                return Err(SpinError::BackupFormatUnknown {
                    path: out.to_path_buf(),
                });
            }
        }
        let size_bytes = tokio::fs::metadata(out).await?.len();
        Ok(BackupOutcome {
            path: out.to_path_buf(),
            size_bytes,
            format,
        })
    }

    async fn restore(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        input: &Path,
        opts: &RestoreOptions,
    ) -> Result<(), SpinError> {
        if !input.exists() {
            return Err(SpinError::FileNotFound {
                path: input.to_path_buf(),
            });
        }
        let looks_like_sql = tokio::fs::read(input)
            .await
            .map(|bytes| {
                let head = String::from_utf8_lossy(
                    &bytes[..bytes.len().min(256)],
                )
                .to_uppercase();
                head.contains("CREATE") || head.contains("PRAGMA")
            })
            .unwrap_or(false);

        if looks_like_sql && self.engine == Engine::Sqlite {
            if opts.clean && cfg.data_path.exists() {
                tokio::fs::remove_file(&cfg.data_path).await?;
            }
            let handle = std::fs::File::open(input)?;
            let mut cmd = self.client(cfg)?;
            cmd.stdin(std::process::Stdio::from(handle));
            run_tool(&mut cmd, self.client_name()).await.map_err(
                |err| SpinError::RestoreCompleteFailure {
                    reason: err.to_string(),
                },
            )?;
        } else {
            tokio::fs::copy(input, &cfg.data_path).await?;
        }
        Ok(())
    }

    async fn dump_from_connection_string(
        &self,
        _ctx: &EngineContext,
        url: &str,
        out: &Path,
    ) -> Result<(), SpinError> {
        // Remote pulls for file engines are local-path copies; accept
        // both `sqlite:///path` URLs and bare paths.
        let path = url
            .strip_prefix(&format!("{}://", self.defaults().scheme))
            .unwrap_or(url);
        let source = Path::new(path);
        if !source.exists() {
            return Err(SpinError::FileNotFound {
                path: source.to_path_buf(),
            });
        }
        tokio::fs::copy(source, out).await?;
        Ok(())
    }

    async fn run_script(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        script: &ScriptRequest,
    ) -> Result<String, SpinError> {
        let mut combined = String::new();
        if let Some(file) = &script.file {
            let handle = std::fs::File::open(file).map_err(|_| {
                SpinError::FileNotFound { path: file.clone() }
            })?;
            let mut cmd = self.client(cfg)?;
            cmd.stdin(std::process::Stdio::from(handle));
            combined.push_str(&run_tool(&mut cmd, self.client_name()).await?);
        }
        if let Some(sql) = &script.sql {
            let mut cmd = self.client(cfg)?;
            cmd.arg(sql);
            combined.push_str(&run_tool(&mut cmd, self.client_name()).await?);
        }
        Ok(combined)
    }

    async fn execute_query(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        query: &str,
        _db: Option<&str>,
    ) -> Result<QueryOutput, SpinError> {
        let mut cmd = self.client(cfg)?;
        if self.engine == Engine::Sqlite {
            cmd.args(["-separator", "|"]);
        }
        cmd.arg(query);
        let stdout = run_tool(&mut cmd, self.client_name()).await?;
        Ok(QueryOutput::from_delimited(&stdout, '|'))
    }

    async fn connect(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        _db: Option<&str>,
    ) -> Result<(), SpinError> {
        let mut cmd = self.client(cfg)?;
        run_interactive(&mut cmd, self.client_name()).await
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        _cfg: &ContainerConfig,
        _db: &str,
    ) -> Result<(), SpinError> {
        // Single-database engine: accepted, nothing to do.
        Ok(())
    }

    async fn drop_database(
        &self,
        _ctx: &EngineContext,
        _cfg: &ContainerConfig,
        _db: &str,
    ) -> Result<(), SpinError> {
        Ok(())
    }

    async fn database_size(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<Option<u64>, SpinError> {
        Ok(tokio::fs::metadata(&cfg.data_path)
            .await
            .ok()
            .map(|m| m.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(dir: &Path) -> ContainerConfig {
        ContainerConfig {
            name: "notes".to_string(),
            engine: Engine::Sqlite,
            version: "3.50.1".to_string(),
            port: 0,
            database: "notes".to_string(),
            databases: vec![],
            data_path: dir.join("notes.sqlite"),
            binary_path: PathBuf::new(),
            status: spindb_model::ContainerStatus::Missing,
            created_at: Utc::now(),
            backend_version: None,
        }
    }

    #[test]
    fn connection_string_points_at_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let engine = FileEngine { engine: Engine::Sqlite };
        assert_eq!(
            engine.connection_string(&cfg, None),
            format!("sqlite://{}", cfg.data_path.display())
        );
    }

    #[tokio::test]
    async fn status_tracks_file_existence() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ctx = EngineContext::new(crate::paths::Paths::with_root(dir.path()));
        let engine = FileEngine { engine: Engine::Sqlite };

        assert!(!engine.status(&ctx, &cfg).await.unwrap());
        tokio::fs::write(&cfg.data_path, b"").await.unwrap();
        assert!(engine.status(&ctx, &cfg).await.unwrap());
    }

    #[tokio::test]
    async fn archive_backup_copies_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ctx = EngineContext::new(crate::paths::Paths::with_root(dir.path()));
        tokio::fs::write(&cfg.data_path, b"payload").await.unwrap();

        let out = dir.path().join("backup.sqlite");
        let engine = FileEngine { engine: Engine::Sqlite };
        let outcome = engine
            .backup(&ctx, &cfg, &out, &BackupOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.format, BackupFormat::Archive);
        assert_eq!(outcome.size_bytes, 7);
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn start_requires_the_file_to_exist() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ctx = EngineContext::new(crate::paths::Paths::with_root(dir.path()));
        let engine = FileEngine { engine: Engine::Sqlite };
        let err = engine.start(&ctx, &cfg).await.unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }
}
