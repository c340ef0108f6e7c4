//! PostgreSQL engine implementation.
//!
//! The server writes its own `postmaster.pid` inside the data directory,
//! so start never writes a pid file; the process manager reads the
//! server's. All client work goes through the bundled tools (`psql`,
//! `pg_dump`, `pg_restore`, `pg_isready`).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use spindb_model::{
    ContainerConfig, Engine, SpinError, validate_database_name,
};

use super::{
    BackupFormat, BackupOptions, BackupOutcome, DatabaseEngine, EngineContext,
    QueryOutput, RestoreOptions, ScriptRequest, StartOutcome, log_tail,
    run_interactive, run_tool, spawn_detached, tool_path,
};
use crate::engines::readiness::wait_until_ready;

/// Magic header of a `pg_dump -Fc` custom archive.
const CUSTOM_DUMP_MAGIC: &[u8] = b"PGDMP";

pub struct PostgresEngine;

impl PostgresEngine {
    fn psql(&self, cfg: &ContainerConfig, db: &str) -> Command {
        let mut cmd = Command::new(tool_path(cfg, "psql"));
        cmd.args([
            "--no-password",
            "-h",
            "127.0.0.1",
            "-p",
            &cfg.port.to_string(),
            "-U",
            self.defaults().superuser.unwrap_or("postgres"),
            "-d",
            db,
        ]);
        cmd
    }

    /// `SELECT 1` against the maintenance database.
    async fn ping(&self, cfg: &ContainerConfig) -> bool {
        let mut cmd = Command::new(tool_path(cfg, "pg_isready"));
        cmd.args(["-h", "127.0.0.1", "-p", &cfg.port.to_string()]);
        matches!(cmd.output().await, Ok(out) if out.status.success())
    }

    /// Create every database listed in the config that does not exist
    /// yet. Runs right after readiness so a fresh container's primary
    /// database is usable immediately.
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
            let mut check = self.psql(cfg, "postgres");
            check.args([
                "-tA",
                "-c",
                &format!(
                    "SELECT 1 FROM pg_database WHERE datname = '{db}'"
                ),
            ]);
            let exists = run_tool(&mut check, "psql").await?;
            if exists.trim() == "1" {
                continue;
            }
            let mut create = self.psql(cfg, "postgres");
            create.args(["-c", &format!("CREATE DATABASE \"{db}\"")]);
            run_tool(&mut create, "psql").await.map_err(|err| {
                SpinError::DatabaseCreateFailed {
                    database: db.clone(),
                    reason: err.to_string(),
                }
            })?;
            debug!(database = %db, "database created");
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseEngine for PostgresEngine {
    fn engine(&self) -> Engine {
        Engine::PostgreSql
    }

    fn connection_string(
        &self,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> String {
        let user = self.defaults().superuser.unwrap_or("postgres");
        format!(
            "postgresql://{user}@127.0.0.1:{}/{}",
            cfg.port,
            db.unwrap_or(&cfg.database)
        )
    }

    async fn init_data_dir(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        let user = self.defaults().superuser.unwrap_or("postgres");
        let mut initdb = Command::new(tool_path(cfg, "initdb"));
        initdb
            .arg("-D")
            .arg(&cfg.data_path)
            .args(["-U", user, "--auth=trust", "-E", "UTF8"]);
        run_tool(&mut initdb, "initdb").await.map_err(|err| {
            SpinError::InitFailed {
                name: cfg.name.clone(),
                reason: err.to_string(),
            }
        })?;

        // Fix the listen endpoint; sockets are disabled so parallel
        // containers never collide in /tmp.
        let conf = cfg.data_path.join("postgresql.conf");
        let max_connections = self.defaults().max_connections.unwrap_or(100);
        let overrides = format!(
            "\n# Managed by spindb\nlisten_addresses = '127.0.0.1'\nport = {}\nunix_socket_directories = ''\nmax_connections = {max_connections}\n",
            cfg.port
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

        let log_path = ctx.paths.container_log(&cfg.name, cfg.engine);
        let mut server = Command::new(tool_path(cfg, "postgres"));
        server.arg("-D").arg(&cfg.data_path);
        // postmaster.pid is the server's own; no pid file written here.
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

        self.ensure_databases(cfg).await?;
        info!(container = %cfg.name, port = cfg.port, "postgresql ready");
        Ok(outcome)
    }

    async fn backup(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        out: &Path,
        opts: &BackupOptions,
    ) -> Result<BackupOutcome, SpinError> {
        let format = opts.format.unwrap_or(BackupFormat::Sql);
        let db = opts.database.as_deref().unwrap_or(&cfg.database);
        let mut dump = Command::new(tool_path(cfg, "pg_dump"));
        dump.args([
            "--no-password",
            "-h",
            "127.0.0.1",
            "-p",
            &cfg.port.to_string(),
            "-U",
            self.defaults().superuser.unwrap_or("postgres"),
            "-d",
            db,
        ]);
        match format {
            BackupFormat::Sql => {}
            BackupFormat::Dump => {
                dump.args(["-F", "c"]);
            }
            BackupFormat::Archive => {
                return Err(SpinError::BackupFormatUnknown {
                    path: out.to_path_buf(),
                });
            }
        }
        dump.arg("-f").arg(out);
        run_tool(&mut dump, "pg_dump").await?;
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
        let db = opts.database.as_deref().unwrap_or(&cfg.database);
        let header = read_header(input).await?;

        if header.starts_with(CUSTOM_DUMP_MAGIC) {
            let mut restore = Command::new(tool_path(cfg, "pg_restore"));
            restore.args([
                "--no-password",
                "-h",
                "127.0.0.1",
                "-p",
                &cfg.port.to_string(),
                "-U",
                self.defaults().superuser.unwrap_or("postgres"),
                "-d",
                db,
            ]);
            if opts.clean {
                restore.args(["--clean", "--if-exists"]);
            }
            restore.arg(input);
            run_tool(&mut restore, "pg_restore").await.map_err(|err| {
                SpinError::RestoreCompleteFailure {
                    reason: err.to_string(),
                }
            })?;
            return Ok(());
        }

        let text = String::from_utf8_lossy(&header);
        if text.contains("-- MySQL dump")
            || text.contains("-- MariaDB dump")
        {
            return Err(SpinError::WrongEngineDump {
                path: input.to_path_buf(),
                expected: "postgresql".to_string(),
                found: "mysql".to_string(),
            });
        }

        let mut psql = self.psql(cfg, db);
        psql.args(["-v", "ON_ERROR_STOP=1", "-f"]).arg(input);
        run_tool(&mut psql, "psql").await.map_err(|err| {
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
        let mut dump = Command::new(which_tool("pg_dump")?);
        dump.args(["--no-owner", "--no-acl", "-d", url, "-f"])
            .arg(out);
        run_tool(&mut dump, "pg_dump")
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
            let mut psql = self.psql(cfg, &cfg.database);
            psql.args(["-v", "ON_ERROR_STOP=1", "-f"]).arg(file);
            combined.push_str(&run_tool(&mut psql, "psql").await?);
        }
        if let Some(sql) = &script.sql {
            let mut psql = self.psql(cfg, &cfg.database);
            psql.args(["-v", "ON_ERROR_STOP=1", "-c", sql]);
            combined.push_str(&run_tool(&mut psql, "psql").await?);
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
        let mut psql = self.psql(cfg, db.unwrap_or(&cfg.database));
        psql.args(["-tA", "-F", "|", "-c", query]);
        let stdout = run_tool(&mut psql, "psql").await?;
        Ok(QueryOutput::from_delimited(&stdout, '|'))
    }

    async fn connect(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> Result<(), SpinError> {
        let mut psql = self.psql(cfg, db.unwrap_or(&cfg.database));
        run_interactive(&mut psql, "psql").await
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        let mut create = self.psql(cfg, "postgres");
        create.args(["-c", &format!("CREATE DATABASE \"{db}\"")]);
        run_tool(&mut create, "psql").await.map_err(|err| {
            SpinError::DatabaseCreateFailed {
                database: db.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(())
    }

    async fn drop_database(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        let mut drop = self.psql(cfg, "postgres");
        drop.args(["-c", &format!("DROP DATABASE IF EXISTS \"{db}\"")]);
        run_tool(&mut drop, "psql").await?;
        Ok(())
    }
}

fn which_tool(tool: &str) -> Result<std::path::PathBuf, SpinError> {
    which::which(tool).map_err(|_| SpinError::DependencyMissing {
        tool: tool.to_string(),
    })
}

async fn read_header(path: &Path) -> Result<Vec<u8>, SpinError> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await.map_err(|_| {
        SpinError::FileNotFound {
            path: path.to_path_buf(),
        }
    })?;
    let mut buf = vec![0u8; 512];
    let n = file.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn config() -> ContainerConfig {
        ContainerConfig {
            name: "myapp".to_string(),
            engine: Engine::PostgreSql,
            version: "17.5".to_string(),
            port: 5432,
            database: "myapp".to_string(),
            databases: vec!["myapp".to_string()],
            data_path: PathBuf::from("/tmp/data"),
            binary_path: PathBuf::from("/tmp/bin"),
            status: spindb_model::ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: None,
        }
    }

    #[test]
    fn connection_string_uses_superuser_and_primary_db() {
        let engine = PostgresEngine;
        assert_eq!(
            engine.connection_string(&config(), None),
            "postgresql://postgres@127.0.0.1:5432/myapp"
        );
        assert_eq!(
            engine.connection_string(&config(), Some("other")),
            "postgresql://postgres@127.0.0.1:5432/other"
        );
    }

    #[tokio::test]
    async fn restore_rejects_a_mysql_dump() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql");
        tokio::fs::write(&dump, "-- MySQL dump 10.13\nCREATE TABLE t;\n")
            .await
            .unwrap();
        let ctx = EngineContext::new(crate::paths::Paths::with_root(dir.path()));
        let err = PostgresEngine
            .restore(&ctx, &config(), &dump, &RestoreOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WRONG_ENGINE_DUMP");
    }
}
