//! `spindb registry` - file-based database imports.

use anyhow::Result;
use serde_json::json;

use spindb_core::{ContainerManager, FileRegistryStore};
use spindb_model::Engine;

use super::RegistryAction;
use crate::output::emit_json;

fn file_engine(id: &str) -> Result<Engine> {
    let engine: Engine = id.parse()?;
    if !engine.is_file_based() {
        anyhow::bail!("{engine} is not a file-based engine");
    }
    Ok(engine)
}

pub async fn run(
    manager: &ContainerManager,
    action: &RegistryAction,
    json: bool,
) -> Result<i32> {
    match action {
        RegistryAction::Import { name, path, engine } => {
            let engine = file_engine(engine)?;
            let store =
                FileRegistryStore::new(manager.paths().clone(), engine);
            store.register(name, path).await?;
            if json {
                emit_json(&json!({ "name": name, "path": path, "engine": engine }));
            } else {
                println!("registered {name} -> {}", path.display());
            }
        }
        RegistryAction::Scan { folder, engine } => {
            let engine = file_engine(engine)?;
            let store =
                FileRegistryStore::new(manager.paths().clone(), engine);
            let found = store.scan(folder).await?;
            if json {
                emit_json(&found);
            } else if found.is_empty() {
                println!("no unregistered database files in {}", folder.display());
            } else {
                for path in &found {
                    println!("{}", path.display());
                }
                println!("import one with: spindb registry import <name> <path>");
            }
        }
        RegistryAction::Ignore { folder, engine } => {
            let engine = file_engine(engine)?;
            let store =
                FileRegistryStore::new(manager.paths().clone(), engine);
            store.ignore_folder(folder).await?;
            println!("future scans will skip {}", folder.display());
        }
        RegistryAction::List => {
            let mut all = Vec::new();
            for engine in Engine::ALL.into_iter().filter(|e| e.is_file_based()) {
                let store =
                    FileRegistryStore::new(manager.paths().clone(), engine);
                let registry = store.load().await?;
                let orphans = store.find_orphans().await?;
                for (name, path) in registry.entries {
                    let orphaned = orphans.iter().any(|(n, _)| *n == name);
                    all.push(json!({
                        "engine": engine,
                        "name": name,
                        "path": path,
                        "orphaned": orphaned,
                    }));
                }
            }
            if json {
                emit_json(&all);
            } else if all.is_empty() {
                println!("no registered files");
            } else {
                for entry in &all {
                    let orphan_marker = if entry["orphaned"].as_bool() == Some(true)
                    {
                        " (missing!)"
                    } else {
                        ""
                    };
                    println!(
                        "{} [{}] {}{orphan_marker}",
                        entry["name"].as_str().unwrap_or_default(),
                        entry["engine"].as_str().unwrap_or_default(),
                        entry["path"].as_str().unwrap_or_default(),
                    );
                }
            }
        }
        RegistryAction::Clean => {
            let mut removed = 0usize;
            for engine in Engine::ALL.into_iter().filter(|e| e.is_file_based()) {
                let store =
                    FileRegistryStore::new(manager.paths().clone(), engine);
                removed += store.remove_orphans().await?;
            }
            if json {
                emit_json(&json!({ "removed": removed }));
            } else {
                println!("removed {removed} orphaned entries");
            }
        }
    }
    Ok(0)
}
