//! Registry of file-based databases living outside the canonical layout.
//!
//! Users import SQLite/DuckDB files created elsewhere; the registry maps
//! a logical name to the absolute path, remembers folders the user chose
//! not to register ("ignored"), and detects orphans whose file is gone.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use spindb_model::{Engine, SpinError, validate_container_name};

use crate::fsutil;
use crate::paths::Paths;

/// File extensions that look like a database for each file engine.
pub fn candidate_extensions(engine: Engine) -> &'static [&'static str] {
    match engine {
        Engine::DuckDb => &["duckdb", "ddb"],
        _ => &["sqlite", "sqlite3", "db"],
    }
}

/// Serialized registry contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileRegistry {
    /// Logical name -> absolute file path.
    pub entries: BTreeMap<String, PathBuf>,
    /// Folders the user declined to register; scans skip them forever.
    pub ignored_folders: BTreeSet<PathBuf>,
}

/// One engine's registry file under the storage root.
#[derive(Debug, Clone)]
pub struct FileRegistryStore {
    paths: Paths,
    engine: Engine,
}

impl FileRegistryStore {
    pub fn new(paths: Paths, engine: Engine) -> FileRegistryStore {
        FileRegistryStore { paths, engine }
    }

    fn file(&self) -> PathBuf {
        self.paths
            .root()
            .join(format!("{}-registry.json", self.engine.id()))
    }

    pub async fn load(&self) -> Result<FileRegistry, SpinError> {
        let path = self.file();
        if !path.exists() {
            return Ok(FileRegistry::default());
        }
        fsutil::read_json(&path)
            .await
            .map_err(|err| SpinError::Unknown(format!("{err:#}")))
    }

    pub async fn save(&self, registry: &FileRegistry) -> Result<(), SpinError> {
        fsutil::atomic_write_json(&self.file(), registry)
            .await
            .map_err(|err| SpinError::Unknown(format!("{err:#}")))
    }

    /// Register a file under a logical name.
    pub async fn register(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<(), SpinError> {
        validate_container_name(name)?;
        if !path.exists() {
            return Err(SpinError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let mut registry = self.load().await?;
        if registry.entries.contains_key(name) {
            return Err(SpinError::ContainerAlreadyExists {
                name: name.to_string(),
            });
        }
        registry
            .entries
            .insert(name.to_string(), path.to_path_buf());
        self.save(&registry).await
    }

    pub async fn unregister(&self, name: &str) -> Result<(), SpinError> {
        let mut registry = self.load().await?;
        if registry.entries.remove(name).is_none() {
            return Err(SpinError::ContainerNotFound {
                name: name.to_string(),
            });
        }
        self.save(&registry).await
    }

    /// Mark a folder as permanently declined for scans.
    pub async fn ignore_folder(&self, folder: &Path) -> Result<(), SpinError> {
        let mut registry = self.load().await?;
        registry.ignored_folders.insert(folder.to_path_buf());
        self.save(&registry).await
    }

    /// Entries whose file no longer exists.
    pub async fn find_orphans(
        &self,
    ) -> Result<Vec<(String, PathBuf)>, SpinError> {
        let registry = self.load().await?;
        Ok(registry
            .entries
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .collect())
    }

    /// Drop every orphaned entry; returns how many were removed.
    pub async fn remove_orphans(&self) -> Result<usize, SpinError> {
        let mut registry = self.load().await?;
        let before = registry.entries.len();
        registry.entries.retain(|_, path| path.exists());
        let removed = before - registry.entries.len();
        if removed > 0 {
            self.save(&registry).await?;
        }
        Ok(removed)
    }

    /// Database-looking files directly inside `folder`, honoring the
    /// ignored set and skipping files already registered.
    pub async fn scan(&self, folder: &Path) -> Result<Vec<PathBuf>, SpinError> {
        let registry = self.load().await?;
        if registry.ignored_folders.contains(folder) {
            return Ok(Vec::new());
        }
        let registered: BTreeSet<&PathBuf> =
            registry.entries.values().collect();
        let extensions = candidate_extensions(self.engine);
        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(folder).await.map_err(|_| {
            SpinError::FileNotFound {
                path: folder.to_path_buf(),
            }
        })?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.contains(&ext));
            if matches && !registered.contains(&path) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> FileRegistryStore {
        FileRegistryStore::new(Paths::with_root(dir), Engine::Sqlite)
    }

    #[tokio::test]
    async fn register_and_find_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let db = dir.path().join("notes.sqlite");
        tokio::fs::write(&db, b"").await.unwrap();
        store.register("notes", &db).await.unwrap();

        assert!(store.find_orphans().await.unwrap().is_empty());
        tokio::fs::remove_file(&db).await.unwrap();

        let orphans = store.find_orphans().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].0, "notes");

        assert_eq!(store.remove_orphans().await.unwrap(), 1);
        assert!(store.find_orphans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let db = dir.path().join("a.sqlite");
        tokio::fs::write(&db, b"").await.unwrap();
        store.register("a", &db).await.unwrap();
        let err = store.register("a", &db).await.unwrap_err();
        assert_eq!(err.code(), "CONTAINER_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn scan_honors_ignored_folders_and_registrations() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let folder = dir.path().join("dbs");
        tokio::fs::create_dir_all(&folder).await.unwrap();
        tokio::fs::write(folder.join("one.sqlite"), b"").await.unwrap();
        tokio::fs::write(folder.join("two.db"), b"").await.unwrap();
        tokio::fs::write(folder.join("readme.txt"), b"").await.unwrap();

        let found = store.scan(&folder).await.unwrap();
        assert_eq!(found.len(), 2);

        // Registering one file removes it from future scans.
        store
            .register("one", &folder.join("one.sqlite"))
            .await
            .unwrap();
        assert_eq!(store.scan(&folder).await.unwrap().len(), 1);

        // Declining the folder silences it permanently.
        store.ignore_folder(&folder).await.unwrap();
        assert!(store.scan(&folder).await.unwrap().is_empty());
    }
}
