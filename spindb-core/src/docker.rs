//! Export a container as a self-contained Docker deployment directory.
//!
//! Emits a Dockerfile over the engine's official image, a compose file,
//! an entrypoint, generated credentials in `.env`, optional self-signed
//! TLS material (via the host's `openssl`), and optionally an
//! initialization backup. The output directory is transactional: it
//! either fully exists or is removed on failure.

use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use tracing::info;

use spindb_model::{ContainerConfig, Engine, SpinError};

use crate::containers::ContainerManager;
use crate::engines::{BackupOptions, DatabaseEngine, engine_for};
use crate::transaction::with_transaction;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Port published by the compose file; defaults to the container's.
    pub port: Option<u16>,
    /// Take a backup of the current data and ship it as an init script.
    pub include_data: bool,
    /// Ship an existing backup instead of taking a fresh one.
    pub backup_path: Option<PathBuf>,
    pub skip_tls: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub output_dir: PathBuf,
    pub credentials: Credentials,
    pub files: Vec<String>,
}

/// Official image for each engine.
fn docker_image(engine: Engine, version: &str) -> Option<String> {
    let image = match engine {
        Engine::PostgreSql => format!("postgres:{version}"),
        Engine::MySql => format!("mysql:{version}"),
        Engine::MariaDb => format!("mariadb:{version}"),
        Engine::Redis => format!("redis:{version}"),
        Engine::Valkey => format!("valkey/valkey:{version}"),
        Engine::MongoDb => format!("mongo:{version}"),
        Engine::FerretDb => format!("ghcr.io/ferretdb/ferretdb:{version}"),
        Engine::ClickHouse => {
            format!("clickhouse/clickhouse-server:{version}")
        }
        Engine::Qdrant => format!("qdrant/qdrant:v{version}"),
        Engine::Meilisearch => format!("getmeili/meilisearch:v{version}"),
        Engine::QuestDb => format!("questdb/questdb:{version}"),
        Engine::Sqlite | Engine::DuckDb => return None,
    };
    Some(image)
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Produce the deployment directory for `name`.
pub async fn export(
    manager: &ContainerManager,
    name: &str,
    opts: &ExportOptions,
) -> Result<ExportOutcome, SpinError> {
    let cfg = manager.load(name, None).await?;
    let Some(image) = docker_image(cfg.engine, &cfg.version) else {
        return Err(SpinError::Unknown(format!(
            "{} containers are plain files; there is nothing to containerize",
            cfg.engine
        )));
    };

    let credentials = Credentials {
        username: spindb_model::EngineDefaults::for_engine(cfg.engine)
            .superuser
            .unwrap_or("admin")
            .to_string(),
        password: generate_password(),
    };

    let out_dir = opts.output_dir.clone();
    let dir_existed = out_dir.exists();
    let manager_tx = manager.clone();
    let cfg_tx = cfg.clone();
    let opts_tx = opts.clone();
    let credentials_tx = credentials.clone();

    let outcome = with_transaction(async move |tx| {
        let manager = manager_tx;
        let cfg = cfg_tx;
        let opts = opts_tx;
        let credentials = credentials_tx;
        if !dir_existed {
            let dir = opts.output_dir.clone();
            tx.add_rollback(
                format!("remove export directory {}", dir.display()),
                move || {
                    Box::pin(async move {
                        if dir.exists() {
                            tokio::fs::remove_dir_all(&dir).await?;
                        }
                        Ok(())
                    })
                },
            )?;
        }
        tokio::fs::create_dir_all(&opts.output_dir).await?;

        let mut files = Vec::new();
        let port = opts.port.unwrap_or(cfg.port);

        write_file(
            &opts.output_dir,
            "Dockerfile",
            &dockerfile(&image, &cfg),
            &mut files,
        )
        .await?;
        write_file(
            &opts.output_dir,
            "docker-compose.yml",
            &compose_file(&cfg, &image, port, opts.skip_tls),
            &mut files,
        )
        .await?;
        write_file(
            &opts.output_dir,
            "entrypoint.sh",
            &entrypoint(&cfg),
            &mut files,
        )
        .await?;
        write_file(
            &opts.output_dir,
            ".env",
            &env_file(&cfg, &credentials, port),
            &mut files,
        )
        .await?;

        if !opts.skip_tls {
            generate_tls(&opts.output_dir, &cfg.name, &mut files).await?;
        }

        let init_dir = opts.output_dir.join("init");
        if let Some(existing) = &opts.backup_path {
            if !existing.exists() {
                return Err(SpinError::FileNotFound {
                    path: existing.clone(),
                });
            }
            tokio::fs::create_dir_all(&init_dir).await?;
            let target = init_dir.join(
                existing
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "backup".to_string()),
            );
            tokio::fs::copy(existing, &target).await?;
            files.push(format!("init/{}", target.file_name().unwrap().to_string_lossy()));
        } else if opts.include_data {
            tokio::fs::create_dir_all(&init_dir).await?;
            let engine = engine_for(cfg.engine);
            let backup = init_dir.join("initial-data.backup");
            engine
                .backup(
                    manager.context(),
                    &cfg,
                    &backup,
                    &BackupOptions::default(),
                )
                .await?;
            files.push("init/initial-data.backup".to_string());
        }

        files.sort();
        Ok(ExportOutcome {
            output_dir: opts.output_dir.clone(),
            credentials,
            files,
        })
    })
    .await?;

    info!(container = name, dir = %outcome.output_dir.display(), "docker export complete");
    Ok(outcome)
}

async fn write_file(
    dir: &Path,
    name: &str,
    contents: &str,
    files: &mut Vec<String>,
) -> Result<(), SpinError> {
    tokio::fs::write(dir.join(name), contents).await?;
    files.push(name.to_string());
    Ok(())
}

fn dockerfile(image: &str, cfg: &ContainerConfig) -> String {
    format!(
        r#"FROM {image}

COPY entrypoint.sh /usr/local/bin/spindb-entrypoint.sh
COPY init/ /docker-entrypoint-initdb.d/

LABEL org.spindb.container="{name}" org.spindb.engine="{engine}" org.spindb.version="{version}"

ENTRYPOINT ["/usr/local/bin/spindb-entrypoint.sh"]
"#,
        name = cfg.name,
        engine = cfg.engine,
        version = cfg.version,
    )
}

fn compose_file(
    cfg: &ContainerConfig,
    image: &str,
    port: u16,
    skip_tls: bool,
) -> String {
    let tls_volume = if skip_tls {
        String::new()
    } else {
        "      - ./certs:/etc/spindb/certs:ro\n".to_string()
    };
    format!(
        r#"services:
  {name}:
    build: .
    image: {image}
    env_file: .env
    ports:
      - "{port}:{container_port}"
    volumes:
      - {name}-data:/var/lib/{engine}/data
{tls_volume}    restart: unless-stopped

volumes:
  {name}-data:
"#,
        name = cfg.name,
        engine = cfg.engine,
        container_port = cfg.port.max(1),
    )
}

fn entrypoint(cfg: &ContainerConfig) -> String {
    format!(
        r#"#!/bin/sh
# Generated by spindb for container '{name}'.
set -eu

if [ -d /docker-entrypoint-initdb.d ] && [ -n "$(ls -A /docker-entrypoint-initdb.d 2>/dev/null)" ]; then
    echo "spindb: initialization data present"
fi

exec docker-entrypoint.sh "$@"
"#,
        name = cfg.name,
    )
}

fn env_file(
    cfg: &ContainerConfig,
    credentials: &Credentials,
    port: u16,
) -> String {
    let mut env = format!(
        "SPINDB_CONTAINER={}\nSPINDB_ENGINE={}\nSPINDB_PORT={port}\n",
        cfg.name, cfg.engine,
    );
    match cfg.engine {
        Engine::PostgreSql | Engine::FerretDb => {
            env.push_str(&format!(
                "POSTGRES_USER={}\nPOSTGRES_PASSWORD={}\nPOSTGRES_DB={}\n",
                credentials.username, credentials.password, cfg.database
            ));
        }
        Engine::MySql | Engine::MariaDb => {
            env.push_str(&format!(
                "MYSQL_ROOT_PASSWORD={}\nMYSQL_DATABASE={}\n",
                credentials.password, cfg.database
            ));
        }
        Engine::Redis | Engine::Valkey => {
            env.push_str(&format!(
                "REDIS_PASSWORD={}\n",
                credentials.password
            ));
        }
        Engine::MongoDb => {
            env.push_str(&format!(
                "MONGO_INITDB_ROOT_USERNAME={}\nMONGO_INITDB_ROOT_PASSWORD={}\nMONGO_INITDB_DATABASE={}\n",
                credentials.username, credentials.password, cfg.database
            ));
        }
        Engine::Meilisearch => {
            env.push_str(&format!(
                "MEILI_MASTER_KEY={}\n",
                credentials.password
            ));
        }
        _ => {}
    }
    env
}

/// Self-signed certificate material via the host's openssl; skipped with
/// a typed error when the tool is missing.
async fn generate_tls(
    out_dir: &Path,
    common_name: &str,
    files: &mut Vec<String>,
) -> Result<(), SpinError> {
    let openssl = which::which("openssl").map_err(|_| {
        SpinError::DependencyMissing {
            tool: "openssl".to_string(),
        }
    })?;
    let certs = out_dir.join("certs");
    tokio::fs::create_dir_all(&certs).await?;

    let mut cmd = tokio::process::Command::new(openssl);
    cmd.args([
        "req",
        "-x509",
        "-newkey",
        "rsa:2048",
        "-nodes",
        "-days",
        "825",
        "-subj",
    ])
    .arg(format!("/CN={common_name}.local"))
    .arg("-keyout")
    .arg(certs.join("server.key"))
    .arg("-out")
    .arg(certs.join("server.crt"));
    crate::engines::run_tool(&mut cmd, "openssl").await?;

    files.push("certs/server.crt".to_string());
    files.push("certs/server.key".to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(engine: Engine) -> ContainerConfig {
        ContainerConfig {
            name: "myapp".to_string(),
            engine,
            version: "17.5".to_string(),
            port: 5432,
            database: "myapp".to_string(),
            databases: vec![],
            data_path: PathBuf::from("/tmp/data"),
            binary_path: PathBuf::from("/tmp/bin"),
            status: spindb_model::ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: None,
        }
    }

    #[test]
    fn file_engines_have_no_image() {
        assert!(docker_image(Engine::Sqlite, "3.50.1").is_none());
        assert!(docker_image(Engine::DuckDb, "1.3.1").is_none());
        assert_eq!(
            docker_image(Engine::PostgreSql, "17.5").unwrap(),
            "postgres:17.5"
        );
    }

    #[test]
    fn compose_file_publishes_the_requested_port() {
        let yml = compose_file(&config(Engine::PostgreSql), "postgres:17.5", 6543, true);
        assert!(yml.contains("\"6543:5432\""));
        assert!(!yml.contains("certs"));
        let with_tls =
            compose_file(&config(Engine::PostgreSql), "postgres:17.5", 6543, false);
        assert!(with_tls.contains("certs"));
    }

    #[test]
    fn env_file_carries_engine_native_credentials() {
        let creds = Credentials {
            username: "postgres".to_string(),
            password: "secret".to_string(),
        };
        let env = env_file(&config(Engine::PostgreSql), &creds, 5432);
        assert!(env.contains("POSTGRES_PASSWORD=secret"));
        assert!(env.contains("POSTGRES_DB=myapp"));

        let env = env_file(&config(Engine::MySql), &creds, 3306);
        assert!(env.contains("MYSQL_ROOT_PASSWORD=secret"));
    }

    #[test]
    fn passwords_are_long_and_alphanumeric() {
        let password = generate_password();
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password());
    }
}
