//! Container lifecycle commands.

use anyhow::Result;
use serde_json::json;

use spindb_core::engines::{DatabaseEngine, engine_for};
use spindb_core::{ContainerManager, CreateSpec, DeleteOptions};
use spindb_model::Engine;

use super::CreateArgs;
use crate::output::{emit_json, table};

pub async fn create(
    manager: &ContainerManager,
    args: &CreateArgs,
    json: bool,
) -> Result<i32> {
    let engine: Engine = args.engine.parse()?;
    let spec = CreateSpec {
        name: args.name.clone(),
        engine,
        version: args.db_version.clone(),
        port: args.port,
        database: args.database.clone(),
        path: args.path.clone(),
        start: args.start,
        from: args.from.clone(),
        from_url: args.from_url.clone(),
        backend_version: args.backend_version.clone(),
    };
    let cfg = manager.create(spec).await?;
    if json {
        emit_json(&cfg);
    } else {
        println!(
            "created {} ({} {}) - status: {}",
            cfg.name, cfg.engine, cfg.version, cfg.status
        );
        if cfg.port != 0 {
            let url = engine_for(cfg.engine).connection_string(&cfg, None);
            println!("  {url}");
        }
    }
    Ok(0)
}

pub async fn start(
    manager: &ContainerManager,
    name: &str,
    json: bool,
) -> Result<i32> {
    let outcome = manager.start(name).await?;
    if json {
        emit_json(&json!({
            "name": name,
            "port": outcome.port,
            "connectionString": outcome.connection_string,
        }));
    } else {
        println!("{name} running on port {}", outcome.port);
        println!("  {}", outcome.connection_string);
    }
    Ok(0)
}

pub async fn stop(
    manager: &ContainerManager,
    name: &str,
    json: bool,
) -> Result<i32> {
    manager.stop(name).await?;
    if json {
        emit_json(&json!({ "name": name, "status": "stopped" }));
    } else {
        println!("{name} stopped");
    }
    Ok(0)
}

pub async fn list(manager: &ContainerManager, json: bool) -> Result<i32> {
    let containers = manager.list().await?;
    if json {
        emit_json(&containers);
        return Ok(0);
    }
    if containers.is_empty() {
        println!("no containers; run `spindb create` to make one");
        return Ok(0);
    }
    let rows: Vec<Vec<String>> = containers
        .iter()
        .map(|cfg| {
            vec![
                cfg.name.clone(),
                cfg.engine.to_string(),
                cfg.version.clone(),
                if cfg.port == 0 {
                    "-".to_string()
                } else {
                    cfg.port.to_string()
                },
                cfg.status.to_string(),
            ]
        })
        .collect();
    print!(
        "{}",
        table(&["NAME", "ENGINE", "VERSION", "PORT", "STATUS"], &rows)
    );
    Ok(0)
}

pub async fn info(
    manager: &ContainerManager,
    name: &str,
    json: bool,
) -> Result<i32> {
    let cfg = manager.load(name, None).await?;
    let engine = engine_for(cfg.engine);
    let size = engine.database_size(manager.context(), &cfg).await?;
    let url = engine.connection_string(&cfg, None);

    if json {
        emit_json(&json!({
            "config": cfg,
            "sizeBytes": size,
            "connectionString": url,
        }));
        return Ok(0);
    }
    println!("name:     {}", cfg.name);
    println!("engine:   {} {}", cfg.engine, cfg.version);
    if let Some(backend) = &cfg.backend_version {
        println!("backend:  postgresql {backend}");
    }
    if cfg.port != 0 {
        println!("port:     {}", cfg.port);
    }
    println!("data:     {}", cfg.data_path.display());
    println!("status:   {}", cfg.status);
    match size {
        Some(bytes) => println!("size:     {bytes} bytes"),
        None => println!("size:     unknown"),
    }
    println!("url:      {url}");
    Ok(0)
}

pub async fn delete(
    manager: &ContainerManager,
    name: &str,
    force: bool,
    json: bool,
) -> Result<i32> {
    manager.delete(name, &DeleteOptions { force }).await?;
    if json {
        emit_json(&json!({ "name": name, "deleted": true }));
    } else {
        println!("{name} deleted");
    }
    Ok(0)
}

pub async fn clone(
    manager: &ContainerManager,
    src: &str,
    dst: &str,
    json: bool,
) -> Result<i32> {
    let cfg = manager.clone_container(src, dst).await?;
    if json {
        emit_json(&cfg);
    } else {
        println!("cloned {src} -> {dst} (port {})", cfg.port);
    }
    Ok(0)
}

pub async fn rename(
    manager: &ContainerManager,
    old: &str,
    new: &str,
    json: bool,
) -> Result<i32> {
    let cfg = manager.rename(old, new).await?;
    if json {
        emit_json(&cfg);
    } else {
        println!("renamed {old} -> {new}");
    }
    Ok(0)
}

pub async fn edit(
    manager: &ContainerManager,
    name: &str,
    port: Option<u16>,
    db_version: Option<String>,
    json: bool,
) -> Result<i32> {
    let cfg = manager.edit(name, port, db_version).await?;
    if json {
        emit_json(&cfg);
    } else {
        println!(
            "{} now {} {} on port {}",
            cfg.name, cfg.engine, cfg.version, cfg.port
        );
    }
    Ok(0)
}

pub async fn url(
    manager: &ContainerManager,
    name: &str,
    database: Option<&str>,
    copy: bool,
    json: bool,
) -> Result<i32> {
    let cfg = manager.load(name, None).await?;
    let url = engine_for(cfg.engine).connection_string(&cfg, database);
    if json {
        emit_json(&json!({ "name": name, "connectionString": url }));
    } else {
        println!("{url}");
    }
    if copy {
        spindb_core::platform::copy_to_clipboard(&url).await?;
        if !json {
            eprintln!("(copied to clipboard)");
        }
    }
    Ok(0)
}

pub async fn logs(
    manager: &ContainerManager,
    name: &str,
    tail: Option<usize>,
) -> Result<i32> {
    let cfg = manager.load(name, None).await?;
    if cfg.engine.is_file_based() {
        anyhow::bail!("{} containers have no server log", cfg.engine);
    }
    let path = manager.paths().container_log(&cfg.name, cfg.engine);
    let contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
    match tail {
        Some(n) => {
            let lines: Vec<&str> = contents.lines().collect();
            let start = lines.len().saturating_sub(n);
            for line in &lines[start..] {
                println!("{line}");
            }
        }
        None => print!("{contents}"),
    }
    Ok(0)
}
