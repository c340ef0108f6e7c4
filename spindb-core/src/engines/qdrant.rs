//! Qdrant engine implementation.
//!
//! No SQL surface and no interactive client: queries are REST requests
//! against the HTTP port, and backups ride the native snapshot API when
//! the server runs (or a storage-directory copy when stopped).

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

pub struct QdrantEngine;

impl QdrantEngine {
    fn base_url(&self, cfg: &ContainerConfig) -> String {
        format!("http://127.0.0.1:{}", cfg.port)
    }

    fn config_path(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> std::path::PathBuf {
        ctx.paths
            .container_path(&cfg.name, cfg.engine)
            .join("config.yaml")
    }

    /// `METHOD /path [json-body]`, defaulting to GET.
    async fn rest(
        &self,
        cfg: &ContainerConfig,
        request: &str,
    ) -> Result<String, SpinError> {
        let mut parts = request.splitn(3, char::is_whitespace);
        let (method, path, body) = match (parts.next(), parts.next()) {
            (Some(m), Some(p))
                if ["GET", "POST", "PUT", "DELETE"]
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
impl DatabaseEngine for QdrantEngine {
    fn engine(&self) -> Engine {
        Engine::Qdrant
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
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        tokio::fs::create_dir_all(&cfg.data_path).await?;
        let config = format!(
            "service:\n  host: 127.0.0.1\n  http_port: {http}\n  grpc_port: {grpc}\nstorage:\n  storage_path: {storage}\ntelemetry_disabled: true\n",
            http = cfg.port,
            grpc = cfg.port + 1,
            storage = cfg.data_path.display(),
        );
        tokio::fs::write(self.config_path(ctx, cfg), config).await?;
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
        let mut server = Command::new(tool_path(cfg, "qdrant"));
        server
            .arg("--config-path")
            .arg(self.config_path(ctx, cfg));
        let child_pid = spawn_detached(&mut server, &log_path).await?;
        if let Some(pid) = child_pid {
            let pid_path = ctx.process.pid_path(&cfg.name, cfg.engine);
            ProcessManager::write_pid(&pid_path, pid).await?;
        }

        let timeout =
            Duration::from_secs(self.defaults().readiness_timeout_secs);
        let health = format!("{}/healthz", self.base_url(cfg));
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
        info!(container = %cfg.name, port = cfg.port, "qdrant ready");
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
            // Running: take a full snapshot and download it.
            let created = self.rest(cfg, "POST /snapshots").await?;
            let name = snapshot_name(&created).ok_or_else(|| {
                SpinError::Unknown(format!(
                    "unexpected snapshot response: {created}"
                ))
            })?;
            let url = format!("{}/snapshots/{name}", self.base_url(cfg));
            let bytes = reqwest::get(&url)
                .await
                .map_err(|err| SpinError::ConnectionFailed {
                    url: url.clone(),
                    reason: err.to_string(),
                })?
                .bytes()
                .await
                .map_err(|err| SpinError::ConnectionFailed {
                    url,
                    reason: err.to_string(),
                })?;
            tokio::fs::write(out, &bytes).await?;
        } else {
            // Stopped: the storage directory is the snapshot.
            crate::fsutil::copy_dir_all(&cfg.data_path, out)
                .map_err(|err| SpinError::Unknown(format!("{err:#}")))?;
        }
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
        if !input.exists() {
            return Err(SpinError::FileNotFound {
                path: input.to_path_buf(),
            });
        }
        if !input.is_dir() {
            return Err(SpinError::BackupFormatUnknown {
                path: input.to_path_buf(),
            });
        }
        // Storage-directory restore; only valid while stopped.
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
        out: &Path,
    ) -> Result<(), SpinError> {
        // Same snapshot flow against a remote instance.
        let client = reqwest::Client::new();
        let create = format!("{}/snapshots", url.trim_end_matches('/'));
        let resp = client
            .post(&create)
            .send()
            .await
            .map_err(|err| SpinError::ConnectionFailed {
                url: create.clone(),
                reason: err.to_string(),
            })?;
        let text = resp.text().await.unwrap_or_default();
        let name = snapshot_name(&text).ok_or_else(|| {
            SpinError::ConnectionFailed {
                url: create,
                reason: format!("unexpected snapshot response: {text}"),
            }
        })?;
        let download =
            format!("{}/snapshots/{name}", url.trim_end_matches('/'));
        let bytes = reqwest::get(&download)
            .await
            .map_err(|err| SpinError::ConnectionFailed {
                url: download.clone(),
                reason: err.to_string(),
            })?
            .bytes()
            .await
            .map_err(|err| SpinError::ConnectionFailed {
                url: download,
                reason: err.to_string(),
            })?;
        tokio::fs::write(out, &bytes).await?;
        Ok(())
    }

    async fn run_script(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        script: &ScriptRequest,
    ) -> Result<String, SpinError> {
        // One REST request per line.
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
        // No interactive client ships with qdrant.
        Err(SpinError::DependencyMissing {
            tool: format!(
                "qdrant has no interactive shell; use the REST API at {}",
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
        // Collections, not databases; accepted as a no-op.
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

/// Pull `result.name` out of a snapshot-creation response without caring
/// about the rest of the payload.
fn snapshot_name(response: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(response).ok()?;
    value
        .get("result")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_name_parses_the_api_response() {
        let resp = r#"{"result":{"name":"full-snapshot-2025.snapshot","size":123},"status":"ok","time":0.1}"#;
        assert_eq!(
            snapshot_name(resp).unwrap(),
            "full-snapshot-2025.snapshot"
        );
        assert!(snapshot_name("{}").is_none());
    }
}
