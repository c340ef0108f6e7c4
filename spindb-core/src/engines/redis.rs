//! Redis and Valkey engine implementations.
//!
//! One implementation, parameterized by engine id: Valkey is
//! protocol-compatible and ships identically-shaped tooling under its own
//! names. Logical databases are numbered, so create/drop accept and
//! no-op. Backups are RDB snapshots.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use spindb_model::{ContainerConfig, Engine, SpinError};

use super::{
    BackupFormat, BackupOptions, BackupOutcome, DatabaseEngine, EngineContext,
    QueryOutput, RestoreOptions, ScriptRequest, StartOutcome, log_tail,
    run_interactive, run_tool, spawn_detached, tool_path,
};
use crate::engines::readiness::wait_until_ready;
use crate::process::ProcessManager;

pub struct RedisEngine {
    pub engine: Engine,
}

impl RedisEngine {
    fn cli_tool(&self) -> &'static str {
        match self.engine {
            Engine::Valkey => "valkey-cli",
            _ => "redis-cli",
        }
    }

    fn cli(&self, cfg: &ContainerConfig) -> Command {
        let mut cmd = Command::new(tool_path(cfg, self.cli_tool()));
        cmd.args(["-h", "127.0.0.1", "-p", &cfg.port.to_string()]);
        cmd
    }

    fn conf_path(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> std::path::PathBuf {
        ctx.paths
            .container_path(&cfg.name, cfg.engine)
            .join(format!("{}.conf", self.engine.id()))
    }

    async fn ping(&self, cfg: &ContainerConfig) -> bool {
        let mut cmd = self.cli(cfg);
        cmd.arg("ping");
        match cmd.output().await {
            Ok(out) => String::from_utf8_lossy(&out.stdout)
                .trim()
                .eq_ignore_ascii_case("PONG"),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl DatabaseEngine for RedisEngine {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn connection_string(
        &self,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> String {
        // Numbered databases; 0 unless the caller names one.
        match db {
            Some(db) => format!("redis://127.0.0.1:{}/{db}", cfg.port),
            None => format!("redis://127.0.0.1:{}", cfg.port),
        }
    }

    async fn init_data_dir(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        tokio::fs::create_dir_all(&cfg.data_path).await?;
        let conf = format!(
            "bind 127.0.0.1\nport {}\ndir {}\ndaemonize no\nappendonly no\nsave 300 10\n",
            cfg.port,
            cfg.data_path.display()
        );
        tokio::fs::write(self.conf_path(ctx, cfg), conf).await?;
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
        let server_tool = self.defaults().server_binary;
        let mut server = Command::new(tool_path(cfg, server_tool));
        server.arg(self.conf_path(ctx, cfg));
        let child_pid = spawn_detached(&mut server, &log_path).await?;

        if let Some(pid) = child_pid {
            let pid_path = ctx.process.pid_path(&cfg.name, cfg.engine);
            ProcessManager::write_pid(&pid_path, pid).await?;
        }

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
        info!(container = %cfg.name, port = cfg.port, engine = %cfg.engine, "ready");
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
        // Synchronous snapshot, then copy the fresh RDB out.
        let mut save = self.cli(cfg);
        save.arg("save");
        run_tool(&mut save, self.cli_tool()).await?;
        let rdb = cfg.data_path.join("dump.rdb");
        tokio::fs::copy(&rdb, out).await.map_err(|_| {
            SpinError::FileNotFound { path: rdb.clone() }
        })?;
        let size_bytes = tokio::fs::metadata(out).await?.len();
        Ok(BackupOutcome {
            path: out.to_path_buf(),
            size_bytes,
            format,
        })
    }

    async fn restore(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
        input: &Path,
        _opts: &RestoreOptions,
    ) -> Result<(), SpinError> {
        if !input.exists() {
            return Err(SpinError::FileNotFound {
                path: input.to_path_buf(),
            });
        }
        // RDB files load at server startup only.
        if ctx
            .process
            .is_running(&cfg.name, cfg.engine, cfg.port)
            .await?
        {
            return Err(SpinError::ContainerRunning {
                name: cfg.name.clone(),
            });
        }
        tokio::fs::create_dir_all(&cfg.data_path).await?;
        tokio::fs::copy(input, cfg.data_path.join("dump.rdb")).await?;
        Ok(())
    }

    async fn dump_from_connection_string(
        &self,
        _ctx: &EngineContext,
        url: &str,
        out: &Path,
    ) -> Result<(), SpinError> {
        let cli = which::which(self.cli_tool()).map_err(|_| {
            SpinError::DependencyMissing {
                tool: self.cli_tool().to_string(),
            }
        })?;
        let mut dump = Command::new(cli);
        dump.args(["-u", url, "--rdb"]).arg(out);
        run_tool(&mut dump, self.cli_tool())
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
        let mut input = String::new();
        if let Some(file) = &script.file {
            input.push_str(&tokio::fs::read_to_string(file).await.map_err(
                |_| SpinError::FileNotFound {
                    path: file.clone(),
                },
            )?);
            input.push('\n');
        }
        if let Some(commands) = &script.sql {
            input.push_str(commands);
            input.push('\n');
        }

        let mut cli = self.cli(cfg);
        cli.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        let mut child = cli.spawn().map_err(|err| {
            SpinError::DependencyMissing {
                tool: format!("{} ({err})", self.cli_tool()),
            }
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
            drop(stdin);
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SpinError::Unknown(format!(
                "{} exited with {}",
                self.cli_tool(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn execute_query(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        query: &str,
        _db: Option<&str>,
    ) -> Result<QueryOutput, SpinError> {
        let mut cli = self.cli(cfg);
        cli.args(query.split_whitespace());
        let stdout = run_tool(&mut cli, self.cli_tool()).await?;
        Ok(QueryOutput {
            rows: stdout
                .lines()
                .map(|line| vec![line.to_string()])
                .collect(),
        })
    }

    async fn connect(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        _db: Option<&str>,
    ) -> Result<(), SpinError> {
        let mut cli = self.cli(cfg);
        run_interactive(&mut cli, self.cli_tool()).await
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        _cfg: &ContainerConfig,
        _db: &str,
    ) -> Result<(), SpinError> {
        // Numbered databases exist implicitly.
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn config(engine: Engine) -> ContainerConfig {
        ContainerConfig {
            name: "cache".to_string(),
            engine,
            version: "8.0.2".to_string(),
            port: 6380,
            database: "0".to_string(),
            databases: vec![],
            data_path: PathBuf::from("/tmp/data"),
            binary_path: PathBuf::from("/tmp/bin"),
            status: spindb_model::ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: None,
        }
    }

    #[test]
    fn connection_string_has_no_database_path_by_default() {
        let engine = RedisEngine { engine: Engine::Redis };
        assert_eq!(
            engine.connection_string(&config(Engine::Redis), None),
            "redis://127.0.0.1:6380"
        );
        assert_eq!(
            engine.connection_string(&config(Engine::Redis), Some("2")),
            "redis://127.0.0.1:6380/2"
        );
    }

    #[test]
    fn valkey_uses_its_own_cli() {
        let engine = RedisEngine { engine: Engine::Valkey };
        assert_eq!(engine.cli_tool(), "valkey-cli");
        let engine = RedisEngine { engine: Engine::Redis };
        assert_eq!(engine.cli_tool(), "redis-cli");
    }

    #[tokio::test]
    async fn init_writes_a_config_bound_to_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = EngineContext::new(crate::paths::Paths::with_root(dir.path()));
        let mut cfg = config(Engine::Redis);
        cfg.data_path = dir.path().join("data");

        let engine = RedisEngine { engine: Engine::Redis };
        engine.init_data_dir(&ctx, &cfg).await.unwrap();

        let conf = tokio::fs::read_to_string(engine.conf_path(&ctx, &cfg))
            .await
            .unwrap();
        assert!(conf.contains("bind 127.0.0.1"));
        assert!(conf.contains("port 6380"));
    }
}
