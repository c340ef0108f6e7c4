//! Persistence of `container.json` files.

use spindb_model::{ContainerConfig, Engine, SpinError};

use crate::fsutil;
use crate::paths::Paths;

/// Whether a container directory with a config exists.
pub fn exists(paths: &Paths, name: &str, engine: Engine) -> bool {
    paths.container_config(name, engine).exists()
}

/// Load one container's config.
pub async fn load(
    paths: &Paths,
    name: &str,
    engine: Engine,
) -> Result<ContainerConfig, SpinError> {
    let path = paths.container_config(name, engine);
    if !path.exists() {
        return Err(SpinError::ContainerNotFound {
            name: name.to_string(),
        });
    }
    fsutil::read_json(&path)
        .await
        .map_err(|err| SpinError::Unknown(format!("{err:#}")))
}

/// Persist a container's config atomically.
pub async fn save(
    paths: &Paths,
    cfg: &ContainerConfig,
) -> Result<(), SpinError> {
    fsutil::atomic_write_json(&paths.container_config(&cfg.name, cfg.engine), cfg)
        .await
        .map_err(|err| SpinError::Unknown(format!("{err:#}")))
}

/// Load every container config under `containers/`. Directories without
/// a readable config are skipped, not errors; doctor reports them.
pub async fn load_all(
    paths: &Paths,
) -> Result<Vec<ContainerConfig>, SpinError> {
    let mut out = Vec::new();
    let containers_dir = paths.containers();
    if !containers_dir.exists() {
        return Ok(out);
    }
    for engine in Engine::ALL {
        let engine_dir = containers_dir.join(engine.id());
        let Ok(mut entries) = tokio::fs::read_dir(&engine_dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match load(paths, &name, engine).await {
                Ok(cfg) => out.push(cfg),
                Err(err) => {
                    tracing::warn!(
                        container = %name,
                        engine = %engine,
                        error = %err,
                        "skipping unreadable container config"
                    );
                }
            }
        }
    }
    Ok(out)
}

/// How many containers other than `excluding` reference
/// `(engine, version)`. Gates binary deletion.
pub async fn references(
    paths: &Paths,
    engine: Engine,
    version: &str,
    excluding: &str,
) -> usize {
    match load_all(paths).await {
        Ok(all) => all
            .iter()
            .filter(|cfg| {
                cfg.engine == engine
                    && cfg.version == version
                    && cfg.name != excluding
            })
            .count(),
        Err(_) => {
            // When in doubt, assume referenced so nothing gets deleted.
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spindb_model::ContainerStatus;
    use std::path::PathBuf;

    fn config(name: &str, engine: Engine, version: &str) -> ContainerConfig {
        ContainerConfig {
            name: name.to_string(),
            engine,
            version: version.to_string(),
            port: 5432,
            database: name.to_string(),
            databases: vec![],
            data_path: PathBuf::from("/tmp/x"),
            binary_path: PathBuf::from("/tmp/bin"),
            status: ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: None,
        }
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path());
        let cfg = config("myapp", Engine::PostgreSql, "17.5");
        save(&paths, &cfg).await.unwrap();
        assert!(exists(&paths, "myapp", Engine::PostgreSql));

        let loaded = load(&paths, "myapp", Engine::PostgreSql).await.unwrap();
        assert_eq!(loaded.name, "myapp");
        assert_eq!(loaded.version, "17.5");
    }

    #[tokio::test]
    async fn load_all_skips_broken_configs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path());
        save(&paths, &config("good", Engine::Redis, "8.0.2"))
            .await
            .unwrap();

        let broken = paths.container_path("broken", Engine::Redis);
        tokio::fs::create_dir_all(&broken).await.unwrap();
        tokio::fs::write(broken.join("container.json"), b"{not json")
            .await
            .unwrap();

        let all = load_all(&paths).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "good");
    }

    #[tokio::test]
    async fn references_excludes_the_owner() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path());
        save(&paths, &config("a", Engine::PostgreSql, "17.5"))
            .await
            .unwrap();
        save(&paths, &config("b", Engine::PostgreSql, "17.5"))
            .await
            .unwrap();
        save(&paths, &config("c", Engine::PostgreSql, "16.9"))
            .await
            .unwrap();

        assert_eq!(references(&paths, Engine::PostgreSql, "17.5", "a").await, 1);
        assert_eq!(references(&paths, Engine::PostgreSql, "16.9", "c").await, 0);
    }
}
