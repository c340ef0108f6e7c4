//! Acquisition and verification of engine server binaries.
//!
//! One generic [`BinaryManager`] drives download, extraction, layout
//! normalization, verification, and deletion for every engine; the
//! engine-specific knowledge (archive shape, verify probe) comes from
//! [`layout`] and the defaults table.

pub mod extract;
pub mod layout;

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use spindb_model::{
    Arch, Engine, EngineDefaults, InstalledBinary, Platform, SpinError,
    executable_extension,
};

use crate::paths::Paths;
use crate::registry::{RegistryClient, archive_extension};
use crate::version;

/// Streamed download progress: bytes so far, total if known.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

fn internal(err: anyhow::Error) -> SpinError {
    SpinError::Unknown(format!("{err:#}"))
}

/// Downloads, verifies, and enumerates installed binaries for one engine.
#[derive(Debug, Clone)]
pub struct BinaryManager {
    paths: Paths,
    registry: RegistryClient,
    engine: Engine,
}

impl BinaryManager {
    pub fn new(paths: Paths, registry: RegistryClient, engine: Engine) -> Self {
        BinaryManager {
            paths,
            registry,
            engine,
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Server executable name including the platform extension.
    pub fn server_binary_name(&self, platform: Platform) -> String {
        let defaults = EngineDefaults::for_engine(self.engine);
        // Launcher scripts keep their own extension.
        if defaults.server_binary.contains('.') {
            defaults.server_binary.to_string()
        } else {
            format!(
                "{}{}",
                defaults.server_binary,
                executable_extension(platform)
            )
        }
    }

    /// Root directory of one installed binary
    /// (`~/.spindb/bin/{engine}-{version}-{platform}-{arch}`).
    pub fn bin_root(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
    ) -> PathBuf {
        self.paths.binary_path(self.engine, ver, platform, arch)
    }

    /// Directory holding the executables (`bin_root/bin`).
    pub fn bin_dir(&self, ver: &str, platform: Platform, arch: Arch) -> PathBuf {
        self.bin_root(ver, platform, arch).join("bin")
    }

    /// Absolute path of the server executable for one installed binary.
    pub fn server_binary_path(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
    ) -> PathBuf {
        let name = self.server_binary_name(platform);
        let root = self.bin_root(ver, platform, arch);
        let canonical = root.join("bin").join(&name);
        if canonical.exists() {
            canonical
        } else {
            // PreserveTree archives may ship the launcher at the top.
            root.join(&name)
        }
    }

    /// Whether the expected bin path contains the engine's server binary.
    pub fn is_installed(&self, ver: &str, platform: Platform, arch: Arch) -> bool {
        self.server_binary_path(ver, platform, arch).exists()
    }

    /// Parse `root/bin/*` directory names into installed tuples for this
    /// engine, keeping only those that still contain the server binary.
    pub fn list_installed(&self) -> Vec<InstalledBinary> {
        let Ok(entries) = std::fs::read_dir(self.paths.bin()) else {
            return Vec::new();
        };
        let mut installed: Vec<InstalledBinary> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                InstalledBinary::parse_dir_name(&name)
            })
            .filter(|bin| bin.engine == self.engine)
            .filter(|bin| {
                self.is_installed(&bin.version, bin.platform, bin.arch)
            })
            .collect();
        installed.sort_by(|a, b| version::compare(&b.version, &a.version));
        installed
    }

    /// `is_installed` ? path : `download`.
    pub async fn ensure_installed(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<PathBuf, SpinError> {
        if self.is_installed(ver, platform, arch) {
            return Ok(self.bin_dir(ver, platform, arch));
        }
        self.download(ver, platform, arch, on_progress).await
    }

    /// Download, extract, normalize, chmod, verify. On any failure the
    /// partially-created bin directory is removed; pre-existing
    /// directories are left alone.
    pub async fn download(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<PathBuf, SpinError> {
        let bin_root = self.bin_root(ver, platform, arch);
        let freshly_created = !bin_root.exists();

        let result = self
            .download_inner(ver, platform, arch, on_progress)
            .await;
        if result.is_err() && freshly_created {
            let _ = tokio::fs::remove_dir_all(&bin_root).await;
        }
        result?;
        info!(engine = %self.engine, version = ver, "binary installed");
        Ok(self.bin_dir(ver, platform, arch))
    }

    async fn download_inner(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), SpinError> {
        let stage = self
            .paths
            .bin()
            .join(format!(".staging-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&stage).await?;

        let result = self
            .download_into_stage(&stage, ver, platform, arch, on_progress)
            .await;
        let _ = tokio::fs::remove_dir_all(&stage).await;
        result
    }

    async fn download_into_stage(
        &self,
        stage: &std::path::Path,
        ver: &str,
        platform: Platform,
        arch: Arch,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), SpinError> {
        let archive =
            stage.join(format!("artifact.{}", archive_extension(platform)));
        let url = self
            .fetch_to_file(&archive, ver, platform, arch, on_progress)
            .await?;
        debug!(%url, "artifact downloaded, extracting");

        let unpacked = stage.join("unpacked");
        tokio::fs::create_dir_all(&unpacked).await?;
        extract::extract_archive(&archive, &unpacked, platform)
            .await
            .map_err(internal)?;

        let bin_root = self.bin_root(ver, platform, arch);
        layout::normalize_layout(&unpacked, &bin_root, self.engine)
            .map_err(internal)?;
        layout::chmod_binaries(&bin_root).map_err(internal)?;

        self.verify(ver, platform, arch).await
    }

    /// Stream the artifact to `dest` under the 5-minute deadline.
    async fn fetch_to_file(
        &self,
        dest: &std::path::Path,
        ver: &str,
        platform: Platform,
        arch: Arch,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<String, SpinError> {
        let resp = self
            .registry
            .fetch_artifact(self.engine, ver, platform, arch)
            .await?;
        let url = resp.url().to_string();
        let total = resp.content_length();

        let write = async {
            let mut file = tokio::fs::File::create(dest).await?;
            let mut stream = resp.bytes_stream();
            let mut downloaded: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|err| SpinError::DownloadFailed {
                    url: url.clone(),
                    reason: err.to_string(),
                })?;
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                if let Some(progress) = on_progress {
                    progress(downloaded, total);
                }
            }
            file.flush().await?;
            Ok::<(), SpinError>(())
        };

        match tokio::time::timeout(DOWNLOAD_TIMEOUT, write).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SpinError::DownloadTimedOut {
                    url,
                    timeout_secs: DOWNLOAD_TIMEOUT.as_secs(),
                });
            }
        }
        Ok(url)
    }

    /// Execute the server binary's version probe and accept on exact or
    /// major match. QuestDB's JVM launcher has no `--version`; it is
    /// verified by the presence of the launcher script and its jar tree.
    pub async fn verify(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
    ) -> Result<(), SpinError> {
        if self.engine == Engine::QuestDb {
            return self.verify_questdb(ver, platform, arch);
        }

        let binary = self.server_binary_path(ver, platform, arch);
        let output = tokio::process::Command::new(&binary)
            .arg("--version")
            .output()
            .await
            .map_err(|err| SpinError::StartFailed {
                engine: self.engine.id().to_string(),
                container: String::new(),
                reason: format!(
                    "failed to execute {}: {err}",
                    binary.display()
                ),
            })?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let actual = parse_reported_version(&text).ok_or_else(|| {
            SpinError::BinaryVersionMismatch {
                engine: self.engine.id().to_string(),
                expected: ver.to_string(),
                actual: text.trim().to_string(),
            }
        })?;

        if version::matches(self.engine, ver, &actual) {
            Ok(())
        } else {
            warn!(
                engine = %self.engine,
                expected = ver,
                actual = %actual,
                "version probe mismatch"
            );
            Err(SpinError::BinaryVersionMismatch {
                engine: self.engine.id().to_string(),
                expected: ver.to_string(),
                actual,
            })
        }
    }

    fn verify_questdb(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
    ) -> Result<(), SpinError> {
        let script = self.server_binary_path(ver, platform, arch);
        let root = self.bin_root(ver, platform, arch);
        let has_jar = std::fs::read_dir(root.join("bin"))
            .map(|entries| {
                entries.flatten().any(|e| {
                    e.file_name().to_string_lossy().ends_with(".jar")
                })
            })
            .unwrap_or(false);
        if script.exists() && has_jar {
            Ok(())
        } else {
            Err(SpinError::BinaryVersionMismatch {
                engine: self.engine.id().to_string(),
                expected: ver.to_string(),
                actual: "launcher script or jar missing".to_string(),
            })
        }
    }

    /// Remove the bin tree. The caller is responsible for confirming no
    /// container still references it.
    pub async fn delete(
        &self,
        ver: &str,
        platform: Platform,
        arch: Arch,
    ) -> Result<(), SpinError> {
        let root = self.bin_root(ver, platform, arch);
        if root.exists() {
            tokio::fs::remove_dir_all(&root).await?;
            info!(engine = %self.engine, version = ver, "binary removed");
        }
        Ok(())
    }
}

/// First dotted numeric token in a `--version` banner.
fn parse_reported_version(text: &str) -> Option<String> {
    let re = regex::Regex::new(r"(\d+(?:\.\d+)+)").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &std::path::Path, engine: Engine) -> BinaryManager {
        BinaryManager::new(
            Paths::with_root(dir),
            RegistryClient::with_bases(vec![]),
            engine,
        )
    }

    #[test]
    fn version_banners_parse() {
        assert_eq!(
            parse_reported_version("postgres (PostgreSQL) 17.5").unwrap(),
            "17.5"
        );
        assert_eq!(
            parse_reported_version("Redis server v=8.0.2 sha=0000:0").unwrap(),
            "8.0.2"
        );
        assert_eq!(
            parse_reported_version("ClickHouse local version 25.5.2.47.")
                .unwrap(),
            "25.5.2.47"
        );
        assert!(parse_reported_version("no digits here").is_none());
    }

    #[test]
    fn list_installed_matches_only_complete_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), Engine::Redis);

        // Complete install.
        let good = dir
            .path()
            .join("bin/redis-8.0.2-linux-x64/bin");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::write(good.join(mgr.server_binary_name(Platform::Linux)), b"")
            .unwrap();

        // Directory without the server binary.
        std::fs::create_dir_all(
            dir.path().join("bin/redis-7.4.0-linux-x64/bin"),
        )
        .unwrap();
        // Foreign directory.
        std::fs::create_dir_all(dir.path().join("bin/some-cache")).unwrap();

        let installed = mgr.list_installed();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].version, "8.0.2");
    }

    #[test]
    fn is_installed_checks_server_binary() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), Engine::PostgreSql);
        assert!(!mgr.is_installed("17.5", Platform::Linux, Arch::X64));

        let bin = dir
            .path()
            .join("bin/postgresql-17.5-linux-x64/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("postgres"), b"").unwrap();
        assert!(mgr.is_installed("17.5", Platform::Linux, Arch::X64));
    }
}
