//! MongoDB engine implementation.
//!
//! `mongod` writes the pid file we point it at; databases come into
//! existence lazily on first write, so `create_database` only validates.
//! Backups use `mongodump --archive`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use spindb_model::{
    ContainerConfig, Engine, SpinError, validate_database_name,
};

use super::{
    BackupFormat, BackupOptions, BackupOutcome, DatabaseEngine, EngineContext,
    QueryOutput, RestoreOptions, ScriptRequest, StartOutcome, log_tail,
    run_interactive, run_tool, spawn_detached, tool_path,
};
use crate::engines::readiness::{tcp_probe, wait_until_ready};

pub struct MongoEngine;

impl MongoEngine {
    fn shell(&self, cfg: &ContainerConfig, db: Option<&str>) -> Command {
        let mut cmd = Command::new(tool_path(cfg, "mongosh"));
        cmd.arg(format!(
            "mongodb://127.0.0.1:{}/{}",
            cfg.port,
            db.unwrap_or(&cfg.database)
        ))
        .arg("--quiet");
        cmd
    }

    async fn ping(&self, cfg: &ContainerConfig) -> bool {
        let mongosh = tool_path(cfg, "mongosh");
        if !mongosh.exists() {
            // The shell ships separately from the server archive on some
            // platforms; a TCP accept is good enough for readiness then.
            return tcp_probe(cfg.port).await;
        }
        let mut cmd = self.shell(cfg, Some("admin"));
        cmd.args(["--eval", "db.runCommand({ ping: 1 }).ok"]);
        match cmd.output().await {
            Ok(out) => {
                out.status.success()
                    && String::from_utf8_lossy(&out.stdout).contains('1')
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl DatabaseEngine for MongoEngine {
    fn engine(&self) -> Engine {
        Engine::MongoDb
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
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        // mongod builds its files on first start; only the directory is
        // needed up front.
        tokio::fs::create_dir_all(&cfg.data_path).await?;
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

        let log_path = ctx.paths.container_log(&cfg.name, cfg.engine);
        let pid_path = ctx.process.pid_path(&cfg.name, cfg.engine);
        let mut server = Command::new(tool_path(cfg, "mongod"));
        server
            .arg("--dbpath")
            .arg(&cfg.data_path)
            .args(["--port", &cfg.port.to_string()])
            .args(["--bind_ip", "127.0.0.1"])
            .arg("--pidfilepath")
            .arg(&pid_path);
        spawn_detached(&mut server, &log_path).await?;

        let timeout =
            Duration::from_secs(self.defaults().readiness_timeout_secs);
        if wait_until_ready(&cfg.name, timeout, || self.ping(cfg))
            .await
            .is_err()
        {
            return Err(SpinError::StartFailed {
                engine: cfg.engine.id().to_string(),
                container: cfg.name.clone(),
                reason: log_tail(&log_path, 5).await,
            });
        }
        info!(container = %cfg.name, port = cfg.port, "mongodb ready");
        Ok(outcome)
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
        let mut dump = Command::new(tool_path(cfg, "mongodump"));
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
        let mut restore = Command::new(tool_path(cfg, "mongorestore"));
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
        let mut combined = String::new();
        if let Some(file) = &script.file {
            let mut shell = self.shell(cfg, None);
            shell.arg(file);
            combined.push_str(&run_tool(&mut shell, "mongosh").await?);
        }
        if let Some(code) = &script.sql {
            let mut shell = self.shell(cfg, None);
            shell.args(["--eval", code]);
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
        let mut shell = self.shell(cfg, db);
        shell.args(["--eval", query]);
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
        let mut shell = self.shell(cfg, db);
        run_interactive(&mut shell, "mongosh").await
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        _cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        // Databases materialize on first write.
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
    use std::path::PathBuf;

    #[test]
    fn connection_string_includes_database() {
        let cfg = ContainerConfig {
            name: "docs".to_string(),
            engine: Engine::MongoDb,
            version: "8.0.9".to_string(),
            port: 27018,
            database: "docs".to_string(),
            databases: vec![],
            data_path: PathBuf::from("/tmp/data"),
            binary_path: PathBuf::from("/tmp/bin"),
            status: spindb_model::ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: None,
        };
        assert_eq!(
            MongoEngine.connection_string(&cfg, None),
            "mongodb://127.0.0.1:27018/docs"
        );
    }
}
