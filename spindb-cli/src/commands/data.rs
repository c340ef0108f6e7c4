//! Backup, restore, scripting, and pull commands.

use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;

use spindb_core::engines::{
    BackupFormat, BackupOptions, DatabaseEngine, RestoreOptions,
    ScriptRequest, engine_for,
};
use spindb_core::pull::{PullMode, PullOptions};
use spindb_core::ContainerManager;

use crate::output::emit_json;

pub async fn backup(
    manager: &ContainerManager,
    name: &str,
    output: &std::path::Path,
    format: Option<&str>,
    database: Option<String>,
    json: bool,
) -> Result<i32> {
    let cfg = manager.load(name, None).await?;
    let format = format.map(str::parse::<BackupFormat>).transpose()?;
    let outcome = engine_for(cfg.engine)
        .backup(
            manager.context(),
            &cfg,
            output,
            &BackupOptions { format, database },
        )
        .await?;
    if json {
        emit_json(&json!({
            "name": name,
            "path": outcome.path,
            "sizeBytes": outcome.size_bytes,
            "format": outcome.format,
        }));
    } else {
        println!(
            "backup written to {} ({} bytes)",
            outcome.path.display(),
            outcome.size_bytes
        );
    }
    Ok(0)
}

pub async fn restore(
    manager: &ContainerManager,
    name: &str,
    input: &std::path::Path,
    clean: bool,
    database: Option<String>,
    json: bool,
) -> Result<i32> {
    let cfg = manager.load(name, None).await?;
    engine_for(cfg.engine)
        .restore(
            manager.context(),
            &cfg,
            input,
            &RestoreOptions { clean, database },
        )
        .await?;
    if json {
        emit_json(&json!({ "name": name, "restored": true }));
    } else {
        println!("restored {} from {}", name, input.display());
    }
    Ok(0)
}

pub async fn run_script(
    manager: &ContainerManager,
    name: &str,
    file: Option<PathBuf>,
    sql: Option<String>,
) -> Result<i32> {
    if file.is_none() && sql.is_none() {
        anyhow::bail!("nothing to run; pass --file and/or --sql");
    }
    let cfg = manager.load(name, None).await?;
    let output = engine_for(cfg.engine)
        .run_script(manager.context(), &cfg, &ScriptRequest { file, sql })
        .await?;
    print!("{output}");
    Ok(0)
}

pub async fn connect(
    manager: &ContainerManager,
    name: &str,
    database: Option<&str>,
) -> Result<i32> {
    let cfg = manager.load(name, None).await?;
    engine_for(cfg.engine)
        .connect(manager.context(), &cfg, database)
        .await?;
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
pub async fn pull(
    manager: &ContainerManager,
    name: &str,
    from_url: &str,
    clone_into: Option<String>,
    post_script: Option<PathBuf>,
    drop_backup: bool,
    force: bool,
    json: bool,
) -> Result<i32> {
    let mode = match clone_into {
        Some(target) => PullMode::Clone { target },
        None => PullMode::Replace,
    };
    let outcome = spindb_core::pull::pull(
        manager,
        name,
        from_url,
        &PullOptions {
            mode,
            post_script,
            drop_backup,
            force,
        },
    )
    .await?;
    if json {
        emit_json(&outcome);
    } else {
        println!("pulled into {}/{}", outcome.container, outcome.database);
        if let Some(backup) = &outcome.backup_database {
            println!("previous data kept in database '{backup}'");
        }
    }
    Ok(0)
}

pub async fn add_database(
    manager: &ContainerManager,
    container: &str,
    database: &str,
) -> Result<i32> {
    manager.add_database(container, database).await?;
    println!("database '{database}' created in {container}");
    Ok(0)
}

pub async fn remove_database(
    manager: &ContainerManager,
    container: &str,
    database: &str,
) -> Result<i32> {
    manager.remove_database(container, database).await?;
    println!("database '{database}' dropped from {container}");
    Ok(0)
}
