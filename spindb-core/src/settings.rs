//! User-level configuration at `~/.spindb/config.json`: cached client-tool
//! paths and preferences. Loaded lazily, written atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::fsutil;
use crate::paths::Paths;

/// Preferences controlling CLI behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Ask before `delete` removes a container (interactive mode only).
    pub confirm_delete: bool,
    /// Engine assumed when `--engine` is omitted.
    pub default_engine: Option<spindb_model::Engine>,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            confirm_delete: true,
            default_engine: None,
        }
    }
}

/// Contents of `config.json`. Unknown keys are ignored on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Cache of resolved client-tool paths, keyed by tool name
    /// (`psql`, `mongosh`, ...). Doctor flags entries whose file is gone.
    pub binary_paths: HashMap<String, PathBuf>,
    pub preferences: Preferences,
}

impl Settings {
    /// Load settings, returning defaults when the file does not exist.
    pub async fn load(paths: &Paths) -> Result<Settings> {
        let path = paths.config();
        if !path.exists() {
            return Ok(Settings::default());
        }
        fsutil::read_json(&path).await
    }

    /// Persist atomically.
    pub async fn save(&self, paths: &Paths) -> Result<()> {
        fsutil::atomic_write_json(&paths.config(), self).await
    }

    /// Record a resolved tool path for later runs.
    pub fn cache_binary_path(&mut self, tool: &str, path: PathBuf) {
        self.binary_paths.insert(tool.to_string(), path);
    }

    /// Cached path for `tool`, only if it still exists on disk.
    pub fn cached_binary_path(&self, tool: &str) -> Option<&Path> {
        self.binary_paths
            .get(tool)
            .map(PathBuf::as_path)
            .filter(|p| p.exists())
    }

    /// Cache entries whose target no longer exists.
    pub fn stale_binary_paths(&self) -> Vec<(&str, &Path)> {
        self.binary_paths
            .iter()
            .filter(|(_, path)| !path.exists())
            .map(|(tool, path)| (tool.as_str(), path.as_path()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path());
        let settings = Settings::load(&paths).await.unwrap();
        assert!(settings.binary_paths.is_empty());
        assert!(settings.preferences.confirm_delete);
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path());

        let mut settings = Settings::default();
        settings.cache_binary_path("psql", PathBuf::from("/no/such/psql"));
        settings.preferences.confirm_delete = false;
        settings.save(&paths).await.unwrap();

        let reloaded = Settings::load(&paths).await.unwrap();
        assert!(!reloaded.preferences.confirm_delete);
        assert_eq!(reloaded.binary_paths.len(), 1);
        // The cached path no longer exists, so lookups skip it and doctor
        // reports it stale.
        assert!(reloaded.cached_binary_path("psql").is_none());
        assert_eq!(reloaded.stale_binary_paths().len(), 1);
    }
}
