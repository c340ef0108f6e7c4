//! MySQL and MariaDB engine implementations.
//!
//! The two share one implementation parameterized by flavor: tool names
//! and data-dir initialization differ, everything else is common. The
//! server writes the pid file we point it at inside the container
//! directory.

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
use crate::engines::readiness::wait_until_ready;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    MySql,
    MariaDb,
}

pub struct MySqlEngine {
    pub flavor: Flavor,
}

impl MySqlEngine {
    fn client_tool(&self) -> &'static str {
        match self.flavor {
            Flavor::MySql => "mysql",
            Flavor::MariaDb => "mariadb",
        }
    }

    fn dump_tool(&self) -> &'static str {
        match self.flavor {
            Flavor::MySql => "mysqldump",
            Flavor::MariaDb => "mariadb-dump",
        }
    }

    fn admin_tool(&self) -> &'static str {
        match self.flavor {
            Flavor::MySql => "mysqladmin",
            Flavor::MariaDb => "mariadb-admin",
        }
    }

    fn client(&self, cfg: &ContainerConfig, db: Option<&str>) -> Command {
        let mut cmd = Command::new(tool_path(cfg, self.client_tool()));
        cmd.args([
            "-h",
            "127.0.0.1",
            "-P",
            &cfg.port.to_string(),
            "-u",
            self.defaults().superuser.unwrap_or("root"),
            "--protocol=TCP",
        ]);
        if let Some(db) = db {
            cmd.arg(db);
        }
        cmd
    }

    fn socket_path(
        &self,
        ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> std::path::PathBuf {
        ctx.paths
            .container_path(&cfg.name, cfg.engine)
            .join("mysqld.sock")
    }

    async fn ping(&self, cfg: &ContainerConfig) -> bool {
        let mut cmd = Command::new(tool_path(cfg, self.admin_tool()));
        cmd.args([
            "-h",
            "127.0.0.1",
            "-P",
            &cfg.port.to_string(),
            "-u",
            self.defaults().superuser.unwrap_or("root"),
            "--protocol=TCP",
            "ping",
        ]);
        matches!(cmd.output().await, Ok(out) if out.status.success())
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
            let mut create = self.client(cfg, None);
            create.args([
                "-e",
                &format!("CREATE DATABASE IF NOT EXISTS `{db}`"),
            ]);
            run_tool(&mut create, self.client_tool())
                .await
                .map_err(|err| SpinError::DatabaseCreateFailed {
                    database: db.clone(),
                    reason: err.to_string(),
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseEngine for MySqlEngine {
    fn engine(&self) -> Engine {
        match self.flavor {
            Flavor::MySql => Engine::MySql,
            Flavor::MariaDb => Engine::MariaDb,
        }
    }

    fn connection_string(
        &self,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> String {
        let user = self.defaults().superuser.unwrap_or("root");
        format!(
            "mysql://{user}@127.0.0.1:{}/{}",
            cfg.port,
            db.unwrap_or(&cfg.database)
        )
    }

    async fn init_data_dir(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
    ) -> Result<(), SpinError> {
        tokio::fs::create_dir_all(&cfg.data_path).await?;
        let result = match self.flavor {
            Flavor::MySql => {
                // mysqld bootstraps its own system tables.
                let mut init = Command::new(tool_path(cfg, "mysqld"));
                init.arg("--initialize-insecure")
                    .arg(format!("--datadir={}", cfg.data_path.display()));
                run_tool(&mut init, "mysqld --initialize").await
            }
            Flavor::MariaDb => {
                let mut init = Command::new(tool_path(cfg, "mariadb-install-db"));
                init.arg(format!("--datadir={}", cfg.data_path.display()))
                    .arg("--auth-root-authentication-method=normal")
                    .arg("--skip-test-db");
                run_tool(&mut init, "mariadb-install-db").await
            }
        };
        result.map_err(|err| SpinError::InitFailed {
            name: cfg.name.clone(),
            reason: err.to_string(),
        })?;
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
        let server_tool = self.defaults().server_binary;
        let mut server = Command::new(tool_path(cfg, server_tool));
        server
            .arg(format!("--datadir={}", cfg.data_path.display()))
            .arg(format!("--port={}", cfg.port))
            .arg("--bind-address=127.0.0.1")
            .arg(format!("--socket={}", self.socket_path(ctx, cfg).display()))
            .arg(format!("--pid-file={}", pid_path.display()));
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
        let format = opts.format.unwrap_or(BackupFormat::Sql);
        if format != BackupFormat::Sql {
            return Err(SpinError::BackupFormatUnknown {
                path: out.to_path_buf(),
            });
        }
        let db = opts.database.as_deref().unwrap_or(&cfg.database);
        let mut dump = Command::new(tool_path(cfg, self.dump_tool()));
        dump.args([
            "-h",
            "127.0.0.1",
            "-P",
            &cfg.port.to_string(),
            "-u",
            self.defaults().superuser.unwrap_or("root"),
            "--protocol=TCP",
            "--routines",
            "--single-transaction",
        ])
        .arg(db)
        .arg(format!("--result-file={}", out.display()));
        run_tool(&mut dump, self.dump_tool()).await?;
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
        let contents_head = tokio::fs::read(input).await.map_err(|_| {
            SpinError::FileNotFound {
                path: input.to_path_buf(),
            }
        })?;
        let head = String::from_utf8_lossy(
            &contents_head[..contents_head.len().min(512)],
        )
        .into_owned();
        if head.starts_with("PGDMP") || head.contains("PostgreSQL database dump")
        {
            return Err(SpinError::WrongEngineDump {
                path: input.to_path_buf(),
                expected: "mysql".to_string(),
                found: "postgresql".to_string(),
            });
        }

        let db = opts.database.as_deref().unwrap_or(&cfg.database);
        if opts.clean {
            let mut drop = self.client(cfg, None);
            drop.args([
                "-e",
                &format!(
                    "DROP DATABASE IF EXISTS `{db}`; CREATE DATABASE `{db}`"
                ),
            ]);
            run_tool(&mut drop, self.client_tool()).await?;
        }

        let file = std::fs::File::open(input)?;
        let mut load = self.client(cfg, Some(db));
        load.stdin(std::process::Stdio::from(file));
        run_tool(&mut load, self.client_tool())
            .await
            .map_err(|err| SpinError::RestoreCompleteFailure {
                reason: err.to_string(),
            })?;
        Ok(())
    }

    async fn dump_from_connection_string(
        &self,
        _ctx: &EngineContext,
        url: &str,
        out: &Path,
    ) -> Result<(), SpinError> {
        let parsed = url::Url::parse(url).map_err(|err| {
            SpinError::ConnectionFailed {
                url: url.to_string(),
                reason: err.to_string(),
            }
        })?;
        let host = parsed.host_str().unwrap_or("127.0.0.1").to_string();
        let port = parsed.port().unwrap_or(3306).to_string();
        let user = if parsed.username().is_empty() {
            "root".to_string()
        } else {
            parsed.username().to_string()
        };
        let db = parsed.path().trim_start_matches('/').to_string();

        let dump_tool = which::which(self.dump_tool()).map_err(|_| {
            SpinError::DependencyMissing {
                tool: self.dump_tool().to_string(),
            }
        })?;
        let mut dump = Command::new(dump_tool);
        dump.args([
            "-h", &host, "-P", &port, "-u", &user, "--protocol=TCP",
            "--routines", "--single-transaction",
        ]);
        if let Some(password) = parsed.password() {
            dump.env("MYSQL_PWD", password);
        }
        dump.arg(&db)
            .arg(format!("--result-file={}", out.display()));
        run_tool(&mut dump, self.dump_tool())
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
            let handle = std::fs::File::open(file)?;
            let mut run = self.client(cfg, Some(&cfg.database));
            run.stdin(std::process::Stdio::from(handle));
            combined
                .push_str(&run_tool(&mut run, self.client_tool()).await?);
        }
        if let Some(sql) = &script.sql {
            let mut run = self.client(cfg, Some(&cfg.database));
            run.args(["-e", sql]);
            combined
                .push_str(&run_tool(&mut run, self.client_tool()).await?);
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
        let mut run = self.client(cfg, Some(db.unwrap_or(&cfg.database)));
        run.args(["--batch", "--skip-column-names", "-e", query]);
        let stdout = run_tool(&mut run, self.client_tool()).await?;
        Ok(QueryOutput::from_delimited(&stdout, '\t'))
    }

    async fn connect(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: Option<&str>,
    ) -> Result<(), SpinError> {
        let mut client = self.client(cfg, Some(db.unwrap_or(&cfg.database)));
        run_interactive(&mut client, self.client_tool()).await
    }

    async fn create_database(
        &self,
        _ctx: &EngineContext,
        cfg: &ContainerConfig,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        let mut create = self.client(cfg, None);
        create.args(["-e", &format!("CREATE DATABASE `{db}`")]);
        run_tool(&mut create, self.client_tool())
            .await
            .map_err(|err| SpinError::DatabaseCreateFailed {
                database: db.to_string(),
                reason: err.to_string(),
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
        let mut drop = self.client(cfg, None);
        drop.args(["-e", &format!("DROP DATABASE IF EXISTS `{db}`")]);
        run_tool(&mut drop, self.client_tool()).await?;
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
            name: "shop".to_string(),
            engine,
            version: "8.4.5".to_string(),
            port: 3307,
            database: "shop".to_string(),
            databases: vec![],
            data_path: PathBuf::from("/tmp/data"),
            binary_path: PathBuf::from("/tmp/bin"),
            status: spindb_model::ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: None,
        }
    }

    #[test]
    fn both_flavors_share_the_mysql_scheme() {
        let mysql = MySqlEngine { flavor: Flavor::MySql };
        let mariadb = MySqlEngine { flavor: Flavor::MariaDb };
        assert_eq!(
            mysql.connection_string(&config(Engine::MySql), None),
            "mysql://root@127.0.0.1:3307/shop"
        );
        assert_eq!(
            mariadb.connection_string(&config(Engine::MariaDb), Some("x")),
            "mysql://root@127.0.0.1:3307/x"
        );
    }

    #[test]
    fn flavor_selects_tool_names() {
        let mariadb = MySqlEngine { flavor: Flavor::MariaDb };
        assert_eq!(mariadb.client_tool(), "mariadb");
        assert_eq!(mariadb.dump_tool(), "mariadb-dump");
        assert_eq!(mariadb.admin_tool(), "mariadb-admin");
    }

    #[tokio::test]
    async fn restore_rejects_a_postgres_dump() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql");
        tokio::fs::write(
            &dump,
            "--\n-- PostgreSQL database dump\n--\nCREATE TABLE t ();\n",
        )
        .await
        .unwrap();
        let ctx = EngineContext::new(crate::paths::Paths::with_root(dir.path()));
        let err = MySqlEngine { flavor: Flavor::MySql }
            .restore(
                &ctx,
                &config(Engine::MySql),
                &dump,
                &RestoreOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WRONG_ENGINE_DUMP");
    }
}
