//! Health checks over the whole installation, run concurrently.
//!
//! Each check is independent and reports `{name, status, message,
//! details?, action?}`; the CLI renders them and exits non-zero when any
//! check errors in non-interactive mode.

use futures::future::join_all;
use serde::Serialize;

use spindb_model::{ContainerStatus, Engine, EngineDefaults};

use crate::containers::ContainerManager;
use crate::file_registry::FileRegistryStore;
use crate::registry::RegistryClient;
use crate::settings::Settings;
use crate::version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Suggested fix, phrased as a command the user can run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl CheckResult {
    fn ok(name: &str, message: impl Into<String>) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.into(),
            details: None,
            action: None,
        }
    }

    fn warning(
        name: &str,
        message: impl Into<String>,
        action: Option<String>,
    ) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.into(),
            details: None,
            action,
        }
    }

    fn error(
        name: &str,
        message: impl Into<String>,
        action: Option<String>,
    ) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.into(),
            details: None,
            action,
        }
    }
}

/// Run every check concurrently and collect the results in a stable
/// order.
pub async fn run_all(manager: &ContainerManager) -> Vec<CheckResult> {
    let checks = join_all([
        check_configuration(manager),
        check_binary_path_cache(manager),
        check_containers(manager),
        check_file_registries(manager),
        check_client_tools(manager),
        check_outdated_versions(manager),
        check_orphaned_directories(manager),
    ])
    .await;
    checks.into_iter().flatten().collect()
}

fn boxed<'a, F>(
    fut: F,
) -> futures::future::BoxFuture<'a, Vec<CheckResult>>
where
    F: std::future::Future<Output = Vec<CheckResult>> + Send + 'a,
{
    Box::pin(fut)
}

fn check_configuration(
    manager: &ContainerManager,
) -> futures::future::BoxFuture<'_, Vec<CheckResult>> {
    boxed(async move {
        let name = "configuration";
        let config_path = manager.paths().config();
        if !config_path.exists() {
            return vec![CheckResult::ok(name, "no user configuration (defaults apply)")];
        }
        match Settings::load(manager.paths()).await {
            Ok(_) => vec![CheckResult::ok(name, "config.json is valid")],
            Err(err) => vec![CheckResult::error(
                name,
                format!("config.json is unreadable: {err:#}"),
                Some(format!("fix or delete {}", config_path.display())),
            )],
        }
    })
}

fn check_binary_path_cache(
    manager: &ContainerManager,
) -> futures::future::BoxFuture<'_, Vec<CheckResult>> {
    boxed(async move {
        let name = "binary-path-cache";
        let Ok(settings) = Settings::load(manager.paths()).await else {
            // The configuration check already reports the parse failure.
            return Vec::new();
        };
        let stale = settings.stale_binary_paths();
        if stale.is_empty() {
            vec![CheckResult::ok(name, "cached tool paths all resolve")]
        } else {
            let tools: Vec<&str> = stale.iter().map(|(tool, _)| *tool).collect();
            vec![CheckResult::warning(
                name,
                format!("{} cached tool path(s) no longer exist", stale.len()),
                Some(format!(
                    "re-run the tools once to refresh: {}",
                    tools.join(", ")
                )),
            )]
        }
    })
}

fn check_containers(
    manager: &ContainerManager,
) -> futures::future::BoxFuture<'_, Vec<CheckResult>> {
    boxed(async move {
        let name = "containers";
        let containers = match manager.list().await {
            Ok(containers) => containers,
            Err(err) => {
                return vec![CheckResult::error(
                    name,
                    format!("could not enumerate containers: {err}"),
                    None,
                )];
            }
        };
        let mut results = Vec::new();
        let mut healthy = 0usize;
        for cfg in &containers {
            if cfg.status == ContainerStatus::Missing {
                results.push(CheckResult::warning(
                    name,
                    format!(
                        "'{}' points at a missing file {}",
                        cfg.name,
                        cfg.data_path.display()
                    ),
                    Some(format!("spindb delete {}", cfg.name)),
                ));
                continue;
            }
            if !cfg.engine.is_file_based()
                && !cfg.binary_path.as_os_str().is_empty()
                && !cfg.binary_path.exists()
            {
                results.push(CheckResult::error(
                    name,
                    format!(
                        "'{}' references missing binaries at {}",
                        cfg.name,
                        cfg.binary_path.display()
                    ),
                    Some(format!("spindb start {} (re-downloads)", cfg.name)),
                ));
                continue;
            }
            healthy += 1;
        }
        results.insert(
            0,
            CheckResult::ok(
                name,
                format!("{healthy}/{} containers healthy", containers.len()),
            ),
        );
        results
    })
}

fn check_file_registries(
    manager: &ContainerManager,
) -> futures::future::BoxFuture<'_, Vec<CheckResult>> {
    boxed(async move {
        let name = "file-registry";
        let mut results = Vec::new();
        for engine in Engine::ALL.into_iter().filter(|e| e.is_file_based()) {
            let store =
                FileRegistryStore::new(manager.paths().clone(), engine);
            match store.find_orphans().await {
                Ok(orphans) if orphans.is_empty() => {}
                Ok(orphans) => results.push(CheckResult::warning(
                    name,
                    format!(
                        "{} {} registry entries point at missing files",
                        orphans.len(),
                        engine
                    ),
                    Some("spindb registry clean".to_string()),
                )),
                Err(err) => results.push(CheckResult::error(
                    name,
                    format!("{engine} registry unreadable: {err}"),
                    None,
                )),
            }
        }
        if results.is_empty() {
            results.push(CheckResult::ok(name, "no orphaned registry entries"));
        }
        results
    })
}

fn check_client_tools(
    manager: &ContainerManager,
) -> futures::future::BoxFuture<'_, Vec<CheckResult>> {
    boxed(async move {
        let name = "client-tools";
        let containers = manager.list().await.unwrap_or_default();
        let mut missing = Vec::new();
        for cfg in &containers {
            let defaults = EngineDefaults::for_engine(cfg.engine);
            for tool in defaults.client_tools {
                let bundled = !cfg.binary_path.as_os_str().is_empty()
                    && crate::engines::tool_path(cfg, tool).exists();
                if !bundled && which::which(tool).is_err() {
                    let entry = format!("{tool} ({})", cfg.engine);
                    if !missing.contains(&entry) {
                        missing.push(entry);
                    }
                }
            }
        }
        if missing.is_empty() {
            vec![CheckResult::ok(name, "all client tools resolve")]
        } else {
            vec![CheckResult::warning(
                name,
                format!("missing client tools: {}", missing.join(", ")),
                Some("install them or re-download the engine binaries".to_string()),
            )]
        }
    })
}

fn check_outdated_versions(
    manager: &ContainerManager,
) -> futures::future::BoxFuture<'_, Vec<CheckResult>> {
    boxed(async move {
        let name = "outdated-versions";
        let registry = RegistryClient::new();
        let Ok(catalog) = registry.fetch_catalog().await else {
            return vec![CheckResult::warning(
                name,
                "registry unreachable; skipping version check",
                None,
            )];
        };
        let containers = manager.list().await.unwrap_or_default();
        let mut outdated = Vec::new();
        for cfg in &containers {
            if let Some(latest) = catalog.versions(cfg.engine).first() {
                if version::compare(latest, &cfg.version)
                    == std::cmp::Ordering::Greater
                    && version::matches(cfg.engine, &cfg.version, latest)
                {
                    outdated.push(format!(
                        "{} ({} -> {latest})",
                        cfg.name, cfg.version
                    ));
                }
            }
        }
        if outdated.is_empty() {
            vec![CheckResult::ok(name, "all containers on current patch versions")]
        } else {
            vec![CheckResult::warning(
                name,
                format!("newer patch releases available: {}", outdated.join(", ")),
                Some("spindb edit <name> --db-version <version>".to_string()),
            )]
        }
    })
}

fn check_orphaned_directories(
    manager: &ContainerManager,
) -> futures::future::BoxFuture<'_, Vec<CheckResult>> {
    boxed(async move {
        let name = "orphaned-directories";
        let mut orphans = Vec::new();
        for engine in Engine::ALL {
            let dir = manager.paths().containers().join(engine.id());
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                if !entry.path().is_dir() {
                    continue;
                }
                if !entry.path().join("container.json").exists() {
                    orphans.push(format!(
                        "{}/{}",
                        engine,
                        entry.file_name().to_string_lossy()
                    ));
                }
            }
        }
        if orphans.is_empty() {
            vec![CheckResult::ok(name, "no orphaned container directories")]
        } else {
            vec![CheckResult::warning(
                name,
                format!(
                    "{} directories without a container.json: {}",
                    orphans.len(),
                    orphans.join(", ")
                ),
                Some("remove them from ~/.spindb/containers".to_string()),
            )]
        }
    })
}

/// Whether the result set should make a non-interactive `doctor` exit 1.
pub fn has_issues(results: &[CheckResult]) -> bool {
    results
        .iter()
        .any(|r| matches!(r.status, CheckStatus::Error | CheckStatus::Warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Paths;

    fn manager(dir: &std::path::Path) -> ContainerManager {
        ContainerManager::new(
            Paths::with_root(dir),
            RegistryClient::with_bases(vec![]),
        )
    }

    #[tokio::test]
    async fn empty_installation_is_mostly_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let results = run_all(&mgr).await;
        // Registry check warns (no network in tests); everything else ok.
        let errors: Vec<_> = results
            .iter()
            .filter(|r| r.status == CheckStatus::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[tokio::test]
    async fn orphaned_directories_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        tokio::fs::create_dir_all(
            dir.path().join("containers/redis/leftover"),
        )
        .await
        .unwrap();

        let results = run_all(&mgr).await;
        let orphan = results
            .iter()
            .find(|r| r.name == "orphaned-directories")
            .unwrap();
        assert_eq!(orphan.status, CheckStatus::Warning);
        assert!(orphan.message.contains("redis/leftover"));
        assert!(has_issues(&results));
    }

    #[tokio::test]
    async fn broken_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("config.json"), b"{oops")
            .await
            .unwrap();

        let results = run_all(&mgr).await;
        let config = results
            .iter()
            .find(|r| r.name == "configuration")
            .unwrap();
        assert_eq!(config.status, CheckStatus::Error);
        assert!(config.action.is_some());
    }
}
