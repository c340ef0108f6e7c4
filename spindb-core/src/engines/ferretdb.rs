//! FerretDB engine implementation.
//!
//! FerretDB is a MongoDB-compatible proxy over a PostgreSQL backend. A
//! container therefore owns two processes: an embedded postgres on a
//! derived port (the container's `backendVersion` selects its binaries)
//! and the ferretdb proxy on the container port. Start brings them up in
//! order; stop tears them down in reverse.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use spindb_model::{
    Arch, ContainerConfig, Engine, Platform, SpinError,
    validate_database_name,
};

use super::{
    BackupFormat, BackupOptions, BackupOutcome, DatabaseEngine, EngineContext,
    QueryOutput, RestoreOptions, ScriptRequest, StartOutcome, log_tail,
    run_interactive, run_tool, spawn_detached, tool_path,
};
use crate::engines::readiness::{tcp_probe, wait_until_ready};
use crate::platform;
use crate::process::ProcessManager;

/// Offset from the ferretdb port to its private postgres backend.
pub const BACKEND_PORT_OFFSET: u16 = 1000;

/// Database inside the backend that holds all FerretDB state.
const BACKEND_DATABASE: &str = "ferretdb";

pub struct FerretEngine;

impl FerretEngine {
    pub const fn backend_port(port: u16) -> u16 {
        port + BACKEND_PORT_OFFSET
    }

    fn backend_version(cfg: &ContainerConfig) -> &str {
        cfg.backend_version.as_deref().unwrap_or("17.5")
    }

    /// Bin directory of the backend postgres install.
    fn backend_bin(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> PathBuf {
        ctx.paths
            .binary_path(
                Engine::PostgreSql,
                Self::backend_version(cfg),
                Platform::current(),
                Arch::current(),
            )
            .join("bin")
    }

    fn backend_tool(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        tool: &str,
    ) -> PathBuf {
        let ext = spindb_model::executable_extension(Platform::current());
        self.backend_bin(ctx, cfg).join(format!("{tool}{ext}"))
    }

    fn backend_data(&self, cfg: &ContainerConfig) -> PathBuf {
        cfg.data_path.join("pg")
    }

    fn backend_url(&self, cfg: &ContainerConfig) -> String {
        format!(
            "postgres://postgres@127.0.0.1:{}/{BACKEND_DATABASE}",
            Self::backend_port(cfg.port)
        )
    }

    async fn backend_psql(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        sql: &str,
    ) -> Result<String, SpinError> {
        let mut cmd = Command::new(self.backend_tool(ctx, cfg, "psql"));
        cmd.args([
            "--no-password",
            "-h",
            "127.0.0.1",
            "-p",
            &Self::backend_port(cfg.port).to_string(),
            "-U",
            "postgres",
            "-d",
            "postgres",
            "-tA",
            "-c",
            sql,
        ]);
        run_tool(&mut cmd, "psql").await
    }

    async fn start_backend(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        let backend_port = Self::backend_port(cfg.port);
        if platform::find_process_by_port(backend_port)
            .await
            .unwrap_or(None)
            .is_some()
        {
            return Ok(());
        }

        let log_path = ctx.paths.container_log(&cfg.name, cfg.engine);
        let mut server =
            Command::new(self.backend_tool(ctx, cfg, "postgres"));
        server.arg("-D").arg(self.backend_data(cfg));
        spawn_detached(&mut server, &log_path).await?;

        wait_until_ready(
            &format!("{} (backend)", cfg.name),
            Duration::from_secs(30),
            || tcp_probe(backend_port),
        )
        .await
        .map_err(|_| SpinError::StartFailed {
            engine: cfg.engine.id().to_string(),
            container: cfg.name.clone(),
            reason: "postgresql backend did not become ready".to_string(),
        })?;

        let exists = self
            .backend_psql(
                ctx,
                cfg,
                &format!(
                    "SELECT 1 FROM pg_database WHERE datname = '{BACKEND_DATABASE}'"
                ),
            )
            .await?;
        if exists.trim() != "1" {
            self.backend_psql(
                ctx,
                cfg,
                &format!("CREATE DATABASE {BACKEND_DATABASE}"),
            )
            .await?;
        }
        Ok(())
    }

    async fn stop_backend(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        let backend_port = Self::backend_port(cfg.port);
        let Some(pid) = platform::find_process_by_port(backend_port)
            .await
            .unwrap_or(None)
        else {
            return Ok(());
        };
        platform::terminate_process(pid)
            .await
            .map_err(|err| SpinError::Unknown(format!("{err:#}")))?;
        if !platform::wait_for_exit(pid, Duration::from_secs(5)).await {
            platform::kill_process(pid).await;
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseEngine for FerretEngine {
    fn engine(&self) -> Engine {
        Engine::FerretDb
    }

    fn connection_string(
        &self,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> String {
        format!(
            "mongodb://127.0.0.1:{}/{}",
            cfg.port,
            db.unwrap_or(&cfg.database)
        )
    }

    async fn init_data_dir(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        let backend_data = self.backend_data(cfg);
        tokio::fs::create_dir_all(&cfg.data_path).await?;
        tokio::fs::create_dir_all(cfg.data_path.join("state")).await?;

        let mut initdb = Command::new(self.backend_tool(ctx, cfg, "initdb"));
        initdb
            .arg("-D")
            .arg(&backend_data)
            .args(["-U", "postgres", "--auth=trust", "-E", "UTF8"]);
        run_tool(&mut initdb, "initdb").await.map_err(|err| {
            SpinError::InitFailed {
                name: cfg.name.clone(),
                reason: err.to_string(),
            }
        })?;

        let conf = backend_data.join("postgresql.conf");
        let overrides = format!(
            "\n# Managed by spindb (ferretdb backend)\nlisten_addresses = '127.0.0.1'\nport = {}\nunix_socket_directories = ''\n",
            Self::backend_port(cfg.port)
        );
        let mut contents = tokio::fs::read_to_string(&conf).await?;
        contents.push_str(&overrides);
        tokio::fs::write(&conf, contents).await?;
        Ok(())
    }

    async fn start(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<StartOutcome, SpinError> {
        let outcome = StartOutcome {
            port: cfg.port,
            connection_string: self.connection_string(cfg, None),
        };
        if ctx
            .process
            .is_running(&cfg.name, cfg.engine, cfg.port)
            .await?
        {
            return Ok(outcome);
        }

        self.start_backend(ctx, cfg).await?;

        let log_path = ctx.paths.container_log(&cfg.name, cfg.engine);
        let mut proxy = Command::new(tool_path(cfg, "ferretdb"));
        proxy
            .arg("--handler=pg")
            .arg(format!("--postgresql-url={}", self.backend_url(cfg)))
            .arg(format!("--listen-addr=127.0.0.1:{}", cfg.port))
            .arg(format!(
                "--state-dir={}",
                cfg.data_path.join("state").display()
            ));
        let child_pid = spawn_detached(&mut proxy, &log_path).await?;
        if let Some(pid) = child_pid {
            let pid_path = ctx.process.pid_path(&cfg.name, cfg.engine);
            ProcessManager::write_pid(&pid_path, pid).await?;
        }

        let timeout =
            Duration::from_secs(self.defaults().readiness_timeout_secs);
        if wait_until_ready(&cfg.name, timeout, || tcp_probe(cfg.port))
            .await
            .is_err()
        {
            // Leave nothing half up.
            let _ = self.stop_backend(ctx, cfg).await;
            return Err(SpinError::StartFailed {
                engine: cfg.engine.id().to_string(),
                container: cfg.name.clone(),
                reason: log_tail(&log_path, 5).await,
            });
        }
        info!(
            container = %cfg.name,
            port = cfg.port,
            backend_port = Self::backend_port(cfg.port),
            "ferretdb ready"
        );
        Ok(outcome)
    }

    async fn stop(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        ctx.process.stop(&cfg.name, cfg.engine, cfg.port).await?;
        self.stop_backend(ctx, cfg).await
    }

    async fn backup(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        out: &Path,
        opts: &BackupOptions,
    ) -> Result<BackupOutcome, SpinError> {
        let format = opts.format.unwrap_or(BackupFormat::Archive);
        if format != BackupFormat::Archive {
            return Err(SpinError::BackupFormatUnknown {
                path: out.to_path_buf(),
            });
        }
        let db = opts.database.as_deref().unwrap_or(&cfg.database);
        let dump_tool = which::which("mongodump").map_err(|_| {
            SpinError::DependencyMissing {
                tool: "mongodump".to_string(),
            }
        })?;
        let mut dump = Command::new(dump_tool);
        dump.args([
            "--host",
            "127.0.0.1",
            "--port",
            &cfg.port.to_string(),
            "--db",
            db,
        ])
        .arg(format!("--archive={}", out.display()));
        run_tool(&mut dump, "mongodump").await?;
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
        let restore_tool = which::which("mongorestore").map_err(|_| {
            SpinError::DependencyMissing {
                tool: "mongorestore".to_string(),
            }
        })?;
        let mut restore = Command::new(restore_tool);
        restore.args([
            "--host",
            "127.0.0.1",
            "--port",
            &cfg.port.to_string(),
        ]);
        if opts.clean {
            restore.arg("--drop");
        }
        restore.arg(format!("--archive={}", input.display()));
        run_tool(&mut restore, "mongorestore").await.map_err(|err| {
            SpinError::RestoreCompleteFailure {
                reason: err.to_string(),
            }
        })?;
        Ok(())
    }

    async fn dump_from_connection_string(
        &self,
        _ctx: &EngineContext,
        url: &str,
        out: &Path,
    ) -> Result<(), SpinError> {
        let dump_tool = which::which("mongodump").map_err(|_| {
            SpinError::DependencyMissing {
                tool: "mongodump".to_string(),
            }
        })?;
        let mut dump = Command::new(dump_tool);
        dump.arg(format!("--uri={url}"))
            .arg(format!("--archive={}", out.display()));
        run_tool(&mut dump, "mongodump")
            .await
            .map_err(|err| SpinError::ConnectionFailed {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        Ok(())
    }

    async fn run_script(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        script: &ScriptRequest,
    ) -> Result<String, SpinError> {
        let mongosh = which::which("mongosh").map_err(|_| {
            SpinError::DependencyMissing {
                tool: "mongosh".to_string(),
            }
        })?;
        let mut combined = String::new();
        if let Some(file) = &script.file {
            let mut shell = Command::new(&mongosh);
            shell
                .arg(self.connection_string(cfg, None))
                .arg("--quiet")
                .arg(file);
            combined.push_str(&run_tool(&mut shell, "mongosh").await?);
        }
        if let Some(code) = &script.sql {
            let mut shell = Command::new(&mongosh);
            shell
                .arg(self.connection_string(cfg, None))
                .arg("--quiet")
                .args(["--eval", code]);
            combined.push_str(&run_tool(&mut shell, "mongosh").await?);
        }
        Ok(combined)
    }

    async fn execute_query(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        query: &str,
        db: Option<&str>,
    ) -> Result<QueryOutput, SpinError> {
        let mongosh = which::which("mongosh").map_err(|_| {
            SpinError::DependencyMissing {
                tool: "mongosh".to_string(),
            }
        })?;
        let mut shell = Command::new(mongosh);
        shell
            .arg(self.connection_string(cfg, db))
            .arg("--quiet")
            .args(["--eval", query]);
        let stdout = run_tool(&mut shell, "mongosh").await?;
        Ok(QueryOutput {
            rows: stdout
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| vec![l.to_string()])
                .collect(),
        })
    }

    async fn connect(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> Result<(), SpinError> {
        let mongosh = which::which("mongosh").map_err(|_| {
            SpinError::DependencyMissing {
                tool: "mongosh".to_string(),
            }
        })?;
        let mut shell = Command::new(mongosh);
        shell.arg(self.connection_string(cfg, db));
        run_interactive(&mut shell, "mongosh").await
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        _cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        // Like MongoDB, databases materialize on first write.
        validate_database_name(db)?;
        Ok(())
    }

    async fn drop_database(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        self.execute_query(
            ctx,
            cfg,
            &format!("db.getSiblingDB('{db}').dropDatabase()"),
            Some("admin"),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn backend_port_is_offset_from_the_proxy_port() {
        assert_eq!(FerretEngine::backend_port(27017), 28017);
        assert_eq!(FerretEngine::backend_port(27020), 28020);
    }

    #[test]
    fn connection_string_speaks_mongodb() {
        let cfg = ContainerConfig {
            name: "docs".to_string(),
            engine: Engine::FerretDb,
            version: "1.24.0".to_string(),
            port: 27017,
            database: "docs".to_string(),
            databases: vec![],
            data_path: PathBuf::from("/tmp/data"),
            binary_path: PathBuf::from("/tmp/bin"),
            status: spindb_model::ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: Some("17.5".to_string()),
        };
        assert_eq!(
            FerretEngine.connection_string(&cfg, None),
            "mongodb://127.0.0.1:27017/docs"
        );
        assert_eq!(
            FerretEngine.backend_url(&cfg),
            "postgres://postgres@127.0.0.1:28017/ferretdb"
        );
    }
}
