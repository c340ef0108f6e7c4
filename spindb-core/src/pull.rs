//! Remote-to-local data replication.
//!
//! Replace mode snapshots the target database into a suffix-named backup
//! database before loading the remote data, all under a transaction, so
//! a failure anywhere either fully replaces or fully restores the prior
//! state. Clone mode loads the remote data into a fresh database.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use spindb_model::{
    ContainerConfig, Engine, SpinError, validate_database_name,
};

use crate::containers::ContainerManager;
use crate::engines::{
    BackupOptions, DatabaseEngine, RestoreOptions, engine_for,
};
use crate::tempdir;
use crate::transaction::with_transaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullMode {
    /// Replace the container's primary database with the remote data,
    /// keeping the prior contents in a suffix-named backup database.
    Replace,
    /// Load the remote data into a new database; it must not exist
    /// unless `force`.
    Clone { target: String },
}

#[derive(Debug, Clone)]
pub struct PullOptions {
    pub mode: PullMode,
    /// Script invoked after success with `SPINDB_CONTEXT` and the legacy
    /// environment variables.
    pub post_script: Option<PathBuf>,
    /// Replace mode: drop the backup database once the pull succeeds.
    pub drop_backup: bool,
    pub force: bool,
}

impl Default for PullOptions {
    fn default() -> Self {
        PullOptions {
            mode: PullMode::Replace,
            post_script: None,
            drop_backup: false,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    pub container: String,
    pub engine: Engine,
    pub port: u16,
    pub database: String,
    pub backup_database: Option<String>,
    pub new_url: String,
    pub original_url: Option<String>,
}

/// Run a pull against an existing, running container.
pub async fn pull(
    manager: &ContainerManager,
    name: &str,
    from_url: &str,
    opts: &PullOptions,
) -> Result<PullOutcome, SpinError> {
    let cfg = manager.load(name, None).await?;
    let engine = engine_for(cfg.engine);

    if !engine.status(manager.context(), &cfg).await? {
        return Err(SpinError::NotRunning {
            container: name.to_string(),
        });
    }

    let outcome = match &opts.mode {
        PullMode::Replace => {
            pull_replace(manager, engine, &cfg, from_url, opts).await?
        }
        PullMode::Clone { target } => {
            pull_clone(manager, engine, &cfg, from_url, target, opts).await?
        }
    };

    if let Some(script) = &opts.post_script {
        run_post_script(script, &outcome).await?;
    }
    Ok(outcome)
}

async fn pull_replace(
    manager: &ContainerManager,
    engine: &'static dyn DatabaseEngine,
    cfg: &ContainerConfig,
    from_url: &str,
    opts: &PullOptions,
) -> Result<PullOutcome, SpinError> {
    if !cfg.engine.supports_multiple_databases() {
        return Err(SpinError::Unknown(format!(
            "pull --replace needs a multi-database engine; {} is not one",
            cfg.engine
        )));
    }

    let target = cfg.database.clone();
    let backup_db = format!("{target}_backup_{}", Utc::now().format("%Y%m%d%H%M%S"));
    validate_database_name(&backup_db)?;

    let local_dump = tempdir::temp_file("pull-local", "dump");
    let remote_dump = tempdir::temp_file("pull-remote", "dump");

    let ctx = manager.context().clone();
    let cfg_tx = cfg.clone();
    let target_tx = target.clone();
    let backup_tx = backup_db.clone();
    let local_tx = local_dump.clone();
    let remote_tx = remote_dump.clone();
    let from_url_tx = from_url.to_string();
    let drop_backup = opts.drop_backup;

    let result = with_transaction(async move |tx| {
        let cfg = cfg_tx;
        let target = target_tx;
        let backup_db = backup_tx;
        let local_dump = local_tx;
        let remote_dump = remote_tx;
        let from_url = from_url_tx;
        // 1. Snapshot the current target.
        engine
            .backup(
                &ctx,
                &cfg,
                &local_dump,
                &BackupOptions {
                    format: None,
                    database: Some(target.clone()),
                },
            )
            .await?;

        // 2. Park it in the backup database.
        engine.create_database(&ctx, &cfg, &backup_db).await?;
        {
            let ctx = ctx.clone();
            let cfg_rb = cfg.clone();
            let backup_rb = backup_db.clone();
            tx.add_rollback(
                format!("drop backup database {backup_rb}"),
                move || {
                    Box::pin(async move {
                        engine
                            .drop_database(&ctx, &cfg_rb, &backup_rb)
                            .await?;
                        Ok(())
                    })
                },
            )?;
        }
        engine
            .restore(
                &ctx,
                &cfg,
                &local_dump,
                &RestoreOptions {
                    clean: false,
                    database: Some(backup_db.clone()),
                },
            )
            .await?;

        // 3. Dump the remote before touching the target.
        engine
            .dump_from_connection_string(&ctx, &from_url, &remote_dump)
            .await?;

        // From here the target is mutated; undo restores it from the
        // local dump.
        {
            let ctx = ctx.clone();
            let cfg_rb = cfg.clone();
            let target_rb = target.clone();
            let local_rb = local_dump.clone();
            tx.add_rollback(
                format!("restore database {target_rb} from snapshot"),
                move || {
                    Box::pin(async move {
                        engine
                            .drop_database(&ctx, &cfg_rb, &target_rb)
                            .await?;
                        engine
                            .create_database(&ctx, &cfg_rb, &target_rb)
                            .await?;
                        engine
                            .restore(
                                &ctx,
                                &cfg_rb,
                                &local_rb,
                                &RestoreOptions {
                                    clean: false,
                                    database: Some(target_rb),
                                },
                            )
                            .await?;
                        Ok(())
                    })
                },
            )?;
        }

        // 4/5. Evict connections, then drop and recreate the target.
        terminate_connections(engine, &ctx, &cfg, &target).await;
        engine.drop_database(&ctx, &cfg, &target).await?;
        engine.create_database(&ctx, &cfg, &target).await?;

        // 6. Load the remote data.
        engine
            .restore(
                &ctx,
                &cfg,
                &remote_dump,
                &RestoreOptions {
                    clean: false,
                    database: Some(target.clone()),
                },
            )
            .await?;

        // 7. Optionally discard the safety copy.
        let kept_backup = if drop_backup {
            engine.drop_database(&ctx, &cfg, &backup_db).await?;
            None
        } else {
            Some(backup_db.clone())
        };

        Ok(PullOutcome {
            container: cfg.name.clone(),
            engine: cfg.engine,
            port: cfg.port,
            database: target.clone(),
            backup_database: kept_backup,
            new_url: engine.connection_string(&cfg, Some(&target)),
            original_url: Some(
                engine.connection_string(&cfg, Some(&backup_db)),
            ),
        })
    })
    .await;

    // Temp dumps die on both success and rollback paths.
    let _ = tokio::fs::remove_file(&local_dump).await;
    let _ = tokio::fs::remove_file(&remote_dump).await;

    let outcome = result?;
    info!(
        container = %outcome.container,
        database = %outcome.database,
        "pull (replace) complete"
    );
    Ok(outcome)
}

async fn pull_clone(
    manager: &ContainerManager,
    engine: &'static dyn DatabaseEngine,
    cfg: &ContainerConfig,
    from_url: &str,
    target: &str,
    opts: &PullOptions,
) -> Result<PullOutcome, SpinError> {
    validate_database_name(target)?;
    if !cfg.engine.supports_multiple_databases() {
        return Err(SpinError::Unknown(format!(
            "pull --clone needs a multi-database engine; {} is not one",
            cfg.engine
        )));
    }
    if cfg.databases.iter().any(|db| db == target) && !opts.force {
        return Err(SpinError::ContainerAlreadyExists {
            name: target.to_string(),
        });
    }

    let remote_dump = tempdir::temp_file("pull-remote", "dump");
    let ctx = manager.context().clone();
    let cfg_tx = cfg.clone();
    let target_tx = target.to_string();
    let remote_tx = remote_dump.clone();
    let from_url_tx = from_url.to_string();
    let force = opts.force;

    let result = with_transaction(async move |tx| {
        let cfg = cfg_tx;
        let target = target_tx;
        let remote_dump = remote_tx;
        let from_url = from_url_tx;
        engine
            .dump_from_connection_string(&ctx, &from_url, &remote_dump)
            .await?;

        if force {
            engine.drop_database(&ctx, &cfg, &target).await?;
        }
        engine.create_database(&ctx, &cfg, &target).await?;
        {
            let ctx = ctx.clone();
            let cfg_rb = cfg.clone();
            let target_rb = target.clone();
            tx.add_rollback(
                format!("drop cloned database {target_rb}"),
                move || {
                    Box::pin(async move {
                        engine
                            .drop_database(&ctx, &cfg_rb, &target_rb)
                            .await?;
                        Ok(())
                    })
                },
            )?;
        }

        engine
            .restore(
                &ctx,
                &cfg,
                &remote_dump,
                &RestoreOptions {
                    clean: false,
                    database: Some(target.clone()),
                },
            )
            .await?;

        Ok(PullOutcome {
            container: cfg.name.clone(),
            engine: cfg.engine,
            port: cfg.port,
            database: target.clone(),
            backup_database: None,
            new_url: engine.connection_string(&cfg, Some(&target)),
            original_url: None,
        })
    })
    .await;

    let _ = tokio::fs::remove_file(&remote_dump).await;

    let outcome = result?;
    // Record the new database on the container.
    manager.add_database(&outcome.container, &outcome.database).await.ok();
    info!(
        container = %outcome.container,
        database = %outcome.database,
        "pull (clone) complete"
    );
    Ok(outcome)
}

/// Kick active sessions off the target database where the engine knows
/// how; best effort everywhere.
async fn terminate_connections(
    engine: &'static dyn DatabaseEngine,
    ctx: &crate::engines::EngineContext,
    cfg: &ContainerConfig,
    db: &str,
) {
    let query = match cfg.engine {
        Engine::PostgreSql => Some(format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{db}' AND pid <> pg_backend_pid()"
        )),
        _ => None,
    };
    if let Some(query) = query {
        if let Err(err) = engine.execute_query(ctx, cfg, &query, None).await {
            warn!(database = db, error = %err, "failed to terminate connections");
        }
    }
}

/// Invoke the user's post-script with inherited stdio, the JSON context
/// file, and the legacy environment variables.
async fn run_post_script(
    script: &Path,
    outcome: &PullOutcome,
) -> Result<(), SpinError> {
    if !script.exists() {
        return Err(SpinError::FileNotFound {
            path: script.to_path_buf(),
        });
    }
    let context_file = tempdir::temp_file("pull-context", "json");
    let context = serde_json::to_vec_pretty(outcome)?;
    tokio::fs::write(&context_file, context).await?;

    let mut cmd = tokio::process::Command::new(script);
    cmd.env("SPINDB_CONTEXT", &context_file)
        .env("SPINDB_CONTAINER", &outcome.container)
        .env("SPINDB_DATABASE", &outcome.database)
        .env("SPINDB_PORT", outcome.port.to_string())
        .env("SPINDB_ENGINE", outcome.engine.id());
    if let Some(backup) = &outcome.backup_database {
        cmd.env("SPINDB_BACKUP_DATABASE", backup);
    }
    cmd.stdin(std::process::Stdio::inherit())
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit());

    let status = cmd.status().await.map_err(|err| {
        SpinError::Unknown(format!(
            "failed to run post-script {}: {err}",
            script.display()
        ))
    })?;
    let _ = tokio::fs::remove_file(&context_file).await;
    if !status.success() {
        return Err(SpinError::Unknown(format!(
            "post-script exited with {status}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_database_names_validate() {
        // The generated suffix must survive the database-name rules.
        let name = format!("app_backup_{}", Utc::now().format("%Y%m%d%H%M%S"));
        assert!(validate_database_name(&name).is_ok());
    }

    #[test]
    fn outcome_serializes_camel_case_for_the_context_file() {
        let outcome = PullOutcome {
            container: "prod".to_string(),
            engine: Engine::PostgreSql,
            port: 5432,
            database: "app".to_string(),
            backup_database: Some("app_backup_1".to_string()),
            new_url: "postgresql://postgres@127.0.0.1:5432/app".to_string(),
            original_url: Some(
                "postgresql://postgres@127.0.0.1:5432/app_backup_1".to_string(),
            ),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"backupDatabase\""));
        assert!(json.contains("\"newUrl\""));
        assert!(json.contains("\"originalUrl\""));
    }
}
