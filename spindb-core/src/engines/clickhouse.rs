//! ClickHouse engine implementation.
//!
//! A single `clickhouse` binary serves as server and client. The native
//! TCP port is the container port; the HTTP port is derived from it and
//! carries the readiness probe. Native `BACKUP`/`RESTORE` statements do
//! the heavy lifting for dumps.

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
use crate::engines::readiness::{http_probe, wait_until_ready};
use crate::process::ProcessManager;

const NATIVE_PORT_BASE: u16 = 9000;
const HTTP_PORT_BASE: u16 = 8123;

/// HTTP port derived from the allocated native port, so parallel
/// containers never collide.
pub const fn http_port(native_port: u16) -> u16 {
    native_port - NATIVE_PORT_BASE + HTTP_PORT_BASE
}

pub struct ClickHouseEngine;

impl ClickHouseEngine {
    fn config_path(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> std::path::PathBuf {
        ctx.paths
            .container_path(&cfg.name, cfg.engine)
            .join("config.xml")
    }

    fn client(&self, cfg: &ContainerConfig) -> Command {
        let mut cmd = Command::new(tool_path(cfg, "clickhouse"));
        cmd.args([
            "client",
            "--host",
            "127.0.0.1",
            "--port",
            &cfg.port.to_string(),
        ]);
        cmd
    }

    async fn ping(&self, cfg: &ContainerConfig) -> bool {
        http_probe(&format!("http://127.0.0.1:{}/ping", http_port(cfg.port)))
            .await
    }

    async fn ensure_databases(
        &self,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        let mut wanted = vec![cfg.database.clone()];
        for db in &cfg.databases {
            if !wanted.contains(db) {
                wanted.push(db.clone());
            }
        }
        for db in wanted {
            validate_database_name(&db)?;
            let mut create = self.client(cfg);
            create.args([
                "--query",
                &format!("CREATE DATABASE IF NOT EXISTS {db}"),
            ]);
            run_tool(&mut create, "clickhouse client").await.map_err(
                |err| SpinError::DatabaseCreateFailed {
                    database: db.clone(),
                    reason: err.to_string(),
                },
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseEngine for ClickHouseEngine {
    fn engine(&self) -> Engine {
        Engine::ClickHouse
    }

    fn connection_string(
        &self,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> String {
        let user = self.defaults().superuser.unwrap_or("default");
        format!(
            "clickhouse://{user}@127.0.0.1:{}/{}",
            cfg.port,
            db.unwrap_or(&cfg.database)
        )
    }

    async fn init_data_dir(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        tokio::fs::create_dir_all(&cfg.data_path).await?;
        // Minimal server config: loopback only, derived HTTP port, file
        // backups allowed anywhere so BACKUP TO File(...) works.
        let config = format!(
            r#"<clickhouse>
    <path>{data}/</path>
    <listen_host>127.0.0.1</listen_host>
    <tcp_port>{tcp}</tcp_port>
    <http_port>{http}</http_port>
    <mysql_port remove="1"/>
    <logger>
        <console>1</console>
        <level>warning</level>
    </logger>
    <backups>
        <allowed_path>/</allowed_path>
    </backups>
    <user_directories>
        <users_xml>
            <path>users.xml</path>
        </users_xml>
    </user_directories>
    <users>
        <default>
            <password></password>
            <networks><ip>127.0.0.1</ip></networks>
            <profile>default</profile>
            <quota>default</quota>
            <access_management>1</access_management>
        </default>
    </users>
    <profiles><default/></profiles>
    <quotas><default/></quotas>
</clickhouse>
"#,
            data = cfg.data_path.display(),
            tcp = cfg.port,
            http = http_port(cfg.port),
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
        let mut server = Command::new(tool_path(cfg, "clickhouse"));
        server
            .arg("server")
            .arg(format!(
                "--config-file={}",
                self.config_path(ctx, cfg).display()
            ));
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

        self.ensure_databases(cfg).await?;
        info!(container = %cfg.name, port = cfg.port, "clickhouse ready");
        Ok(outcome)
    }

    async fn backup(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        out: &Path,
        opts: &BackupOptions,
    ) -> Result<BackupOutcome, SpinError> {
        let format = opts.format.unwrap_or(BackupFormat::Dump);
        if format != BackupFormat::Dump {
            return Err(SpinError::BackupFormatUnknown {
                path: out.to_path_buf(),
            });
        }
        let db = opts.database.as_deref().unwrap_or(&cfg.database);
        validate_database_name(db)?;
        let mut backup = self.client(cfg);
        backup.args([
            "--query",
            &format!("BACKUP DATABASE {db} TO File('{}')", out.display()),
        ]);
        run_tool(&mut backup, "clickhouse client").await?;
        let size_bytes =
            crate::fsutil::path_size(out).unwrap_or(0);
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
        let db = opts.database.as_deref().unwrap_or(&cfg.database);
        validate_database_name(db)?;
        if opts.clean {
            let mut drop = self.client(cfg);
            drop.args([
                "--query",
                &format!("DROP DATABASE IF EXISTS {db}"),
            ]);
            run_tool(&mut drop, "clickhouse client").await?;
        }
        let mut restore = self.client(cfg);
        restore.args([
            "--query",
            &format!(
                "RESTORE DATABASE {db} FROM File('{}')",
                input.display()
            ),
        ]);
        run_tool(&mut restore, "clickhouse client").await.map_err(
            |err| SpinError::RestoreCompleteFailure {
                reason: err.to_string(),
            },
        )?;
        Ok(())
    }

    async fn dump_from_connection_string(
        &self,
        _ctx: &EngineContext,
        url: &str,
        out: &Path,
    ) -> Result<(), SpinError> {
        // Remote dumps ride the standard HTTP interface: schema first,
        // then data as INSERT statements.
        let parsed = url::Url::parse(url).map_err(|err| {
            SpinError::ConnectionFailed {
                url: url.to_string(),
                reason: err.to_string(),
            }
        })?;
        let host = parsed.host_str().unwrap_or("127.0.0.1");
        let http = parsed.port().map_or(HTTP_PORT_BASE, |p| {
            if p >= NATIVE_PORT_BASE { http_port(p) } else { p }
        });
        let db = parsed.path().trim_start_matches('/');
        let base = format!("http://{host}:{http}");
        let client = reqwest::Client::new();

        let run_query = |query: String| {
            let client = client.clone();
            let base = base.clone();
            let user = parsed.username().to_string();
            let password = parsed.password().map(str::to_string);
            async move {
                let mut req = client.post(&base).body(query);
                if !user.is_empty() {
                    req = req.basic_auth(&user, password.as_deref());
                }
                let resp = req.send().await.map_err(|err| {
                    SpinError::ConnectionFailed {
                        url: base.clone(),
                        reason: err.to_string(),
                    }
                })?;
                if !resp.status().is_success() {
                    return Err(SpinError::ConnectionFailed {
                        url: base.clone(),
                        reason: format!("HTTP {}", resp.status()),
                    });
                }
                resp.text().await.map_err(|err| SpinError::ConnectionFailed {
                    url: base,
                    reason: err.to_string(),
                })
            }
        };

        let tables = run_query(format!(
            "SELECT name FROM system.tables WHERE database = '{db}' FORMAT TabSeparated"
        ))
        .await?;

        let mut dump = format!("CREATE DATABASE IF NOT EXISTS {db};\n");
        for table in tables.lines().filter(|t| !t.trim().is_empty()) {
            let ddl = run_query(format!(
                "SHOW CREATE TABLE {db}.{table} FORMAT TSVRaw"
            ))
            .await?;
            dump.push_str(ddl.trim());
            dump.push_str(";\n");
            let inserts = run_query(format!(
                "SELECT * FROM {db}.{table} FORMAT SQLInsert SETTINGS output_format_sql_insert_table_name = '{db}.{table}'"
            ))
            .await?;
            dump.push_str(&inserts);
            dump.push('\n');
        }
        tokio::fs::write(out, dump).await?;
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
            let mut run = self.client(cfg);
            run.arg(format!("--queries-file={}", file.display()));
            combined.push_str(&run_tool(&mut run, "clickhouse client").await?);
        }
        if let Some(sql) = &script.sql {
            let mut run = self.client(cfg);
            run.args(["--multiquery", "--query", sql]);
            combined.push_str(&run_tool(&mut run, "clickhouse client").await?);
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
        let mut run = self.client(cfg);
        run.args([
            "--database",
            db.unwrap_or(&cfg.database),
            "--format",
            "TabSeparated",
            "--query",
            query,
        ]);
        let stdout = run_tool(&mut run, "clickhouse client").await?;
        Ok(QueryOutput::from_delimited(&stdout, '\t'))
    }

    async fn connect(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> Result<(), SpinError> {
        let mut client = self.client(cfg);
        client.args(["--database", db.unwrap_or(&cfg.database)]);
        run_interactive(&mut client, "clickhouse client").await
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        let mut create = self.client(cfg);
        create.args(["--query", &format!("CREATE DATABASE {db}")]);
        run_tool(&mut create, "clickhouse client").await.map_err(
            |err| SpinError::DatabaseCreateFailed {
                database: db.to_string(),
                reason: err.to_string(),
            },
        )?;
        Ok(())
    }

    async fn drop_database(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        let mut drop = self.client(cfg);
        drop.args(["--query", &format!("DROP DATABASE IF EXISTS {db}")]);
        run_tool(&mut drop, "clickhouse client").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_port_tracks_the_native_port() {
        assert_eq!(http_port(9000), 8123);
        assert_eq!(http_port(9001), 8124);
        assert_eq!(http_port(9042), 8165);
    }
}
