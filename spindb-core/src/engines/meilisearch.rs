//! Meilisearch engine implementation.
//!
//! Configured entirely through command-line flags; readiness and queries
//! ride the HTTP API. Backups are data-directory copies taken while
//! stopped (the native dump endpoint writes server-side only).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use spindb_model::{ContainerConfig, Engine, SpinError};

use super::{
    BackupFormat, BackupOptions, BackupOutcome, DatabaseEngine, EngineContext,
    QueryOutput, RestoreOptions, ScriptRequest, StartOutcome, log_tail,
    spawn_detached, tool_path,
};
use crate::engines::readiness::{http_probe, wait_until_ready};
use crate::process::ProcessManager;

pub struct MeilisearchEngine;

impl MeilisearchEngine {
    fn base_url(&self, cfg: &ContainerConfig) -> String {
        format!("http://127.0.0.1:{}", cfg.port)
    }

    async fn rest(
        &self,
        cfg: &ContainerConfig,
        request: &str,
    ) -> Result<String, SpinError> {
        let mut parts = request.splitn(3, char::is_whitespace);
        let (method, path, body) = match (parts.next(), parts.next()) {
            (Some(m), Some(p))
                if ["GET", "POST", "PUT", "PATCH", "DELETE"]
                    .contains(&m.to_ascii_uppercase().as_str()) =>
            {
                (m.to_ascii_uppercase(), p.to_string(), parts.next())
            }
            _ => ("GET".to_string(), request.trim().to_string(), None),
        };

        let url = format!("{}{}", self.base_url(cfg), path);
        let client = reqwest::Client::new();
        let mut req = match method.as_str() {
            "POST" => client.post(&url),
            "PUT" => client.put(&url),
            "PATCH" => client.patch(&url),
            "DELETE" => client.delete(&url),
            _ => client.get(&url),
        };
        if let Some(body) = body {
            req = req
                .header("content-type", "application/json")
                .body(body.to_string());
        }
        let resp = req.send().await.map_err(|err| {
            SpinError::ConnectionFailed {
                url: url.clone(),
                reason: err.to_string(),
            }
        })?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SpinError::ConnectionFailed {
                url,
                reason: format!("HTTP {status}: {text}"),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl DatabaseEngine for MeilisearchEngine {
    fn engine(&self) -> Engine {
        Engine::Meilisearch
    }

    fn connection_string(
        &self,
        cfg: &ContainerConfig,
        _db: Option<&str>,
    ) -> String {
        self.base_url(cfg)
    }

    async fn init_data_dir(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        // meilisearch creates its LMDB environment on first start.
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
        let mut server = Command::new(tool_path(cfg, "meilisearch"));
        server
            .arg("--http-addr")
            .arg(format!("127.0.0.1:{}", cfg.port))
            .arg("--db-path")
            .arg(&cfg.data_path)
            .arg("--no-analytics")
            .args(["--env", "development"]);
        let child_pid = spawn_detached(&mut server, &log_path).await?;
        if let Some(pid) = child_pid {
            let pid_path = ctx.process.pid_path(&cfg.name, cfg.engine);
            ProcessManager::write_pid(&pid_path, pid).await?;
        }

        let timeout =
            Duration::from_secs(self.defaults().readiness_timeout_secs);
        let health = format!("{}/health", self.base_url(cfg));
        if wait_until_ready(&cfg.name, timeout, || http_probe(&health))
            .await
            .is_err()
        {
            return Err(SpinError::StartFailed {
                engine: cfg.engine.id().to_string(),
                container: cfg.name.clone(),
                reason: log_tail(&log_path, 5).await,
            });
        }
        info!(container = %cfg.name, port = cfg.port, "meilisearch ready");
        Ok(outcome)
    }

    async fn backup(
        &self,
        ctx: &EngineContext,
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
        if ctx
            .process
            .is_running(&cfg.name, cfg.engine, cfg.port)
            .await?
        {
            return Err(SpinError::ContainerRunning {
                name: cfg.name.clone(),
            });
        }
        crate::fsutil::copy_dir_all(&cfg.data_path, out)
            .map_err(|err| SpinError::Unknown(format!("{err:#}")))?;
        let size_bytes = crate::fsutil::path_size(out).unwrap_or(0);
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
        opts: &RestoreOptions,
    ) -> Result<(), SpinError> {
        if !input.is_dir() {
            return Err(SpinError::BackupFormatUnknown {
                path: input.to_path_buf(),
            });
        }
        if ctx
            .process
            .is_running(&cfg.name, cfg.engine, cfg.port)
            .await?
        {
            return Err(SpinError::ContainerRunning {
                name: cfg.name.clone(),
            });
        }
        if opts.clean && cfg.data_path.exists() {
            tokio::fs::remove_dir_all(&cfg.data_path).await?;
        }
        crate::fsutil::copy_dir_all(input, &cfg.data_path)
            .map_err(|err| SpinError::Unknown(format!("{err:#}")))?;
        Ok(())
    }

    async fn dump_from_connection_string(
        &self,
        _ctx: &EngineContext,
        url: &str,
        _out: &Path,
    ) -> Result<(), SpinError> {
        // The dump endpoint writes on the remote host's disk; there is
        // nothing to stream down.
        Err(SpinError::ConnectionFailed {
            url: url.to_string(),
            reason: "meilisearch cannot dump over the wire; copy the remote data directory instead".to_string(),
        })
    }

    async fn run_script(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        script: &ScriptRequest,
    ) -> Result<String, SpinError> {
        let mut requests = String::new();
        if let Some(file) = &script.file {
            requests.push_str(&tokio::fs::read_to_string(file).await.map_err(
                |_| SpinError::FileNotFound { path: file.clone() },
            )?);
            requests.push('\n');
        }
        if let Some(inline) = &script.sql {
            requests.push_str(inline);
        }
        let mut combined = String::new();
        for line in requests.lines().filter(|l| !l.trim().is_empty()) {
            combined.push_str(&self.rest(cfg, line).await?);
            combined.push('\n');
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
        let body = self.rest(cfg, query).await?;
        Ok(QueryOutput {
            rows: vec![vec![body]],
        })
    }

    async fn connect(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        _db: Option<&str>,
    ) -> Result<(), SpinError> {
        Err(SpinError::DependencyMissing {
            tool: format!(
                "meilisearch has no interactive shell; use the REST API at {}",
                self.base_url(cfg)
            ),
        })
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        _cfg: &ContainerConfig,
        _db: &str,
    ) -> Result<(), SpinError> {
        // Indexes, not databases; accepted as a no-op.
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
