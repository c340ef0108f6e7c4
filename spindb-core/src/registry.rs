//! Client for the binary artifact registry.
//!
//! A well-known URL serves a JSON catalog enumerating the published
//! versions per engine; artifacts hang off a deterministic path per
//! `(engine, version, platform, arch)`. A secondary mirror is tried when
//! the primary fails; HTTP 404 on an artifact means "not published".

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use spindb_model::{Arch, Engine, Platform, SpinError};

use crate::version;

/// Primary registry endpoint.
pub const PRIMARY_REGISTRY: &str = "https://registry.spindb.io";
/// CDN mirror tried when the primary is unreachable.
pub const FALLBACK_REGISTRY: &str = "https://spindb-registry.b-cdn.net";

const CATALOG_PATH: &str = "/catalog.json";
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Published versions for one engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineCatalog {
    #[serde(default)]
    pub versions: Vec<String>,
}

/// The registry's version catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub engines: HashMap<String, EngineCatalog>,
}

impl Catalog {
    /// All published versions for `engine`, newest first.
    pub fn versions(&self, engine: Engine) -> Vec<String> {
        let mut versions = self
            .engines
            .get(engine.id())
            .map(|c| c.versions.clone())
            .unwrap_or_default();
        versions.sort_by(|a, b| version::compare(b, a));
        versions
    }

    /// Resolve a requested version against the catalog: an exact version
    /// is returned as-is if published; a major-only request resolves to
    /// the newest published version of that major.
    pub fn resolve(&self, engine: Engine, requested: &str) -> Option<String> {
        let published = self.versions(engine);
        if published.iter().any(|v| v == requested) {
            return Some(requested.to_string());
        }
        published
            .into_iter()
            .find(|v| version::matches(engine, requested, v))
    }
}

/// Archive extension per platform: `tar.gz` on Unix, `zip` on Windows.
pub const fn archive_extension(platform: Platform) -> &'static str {
    match platform {
        Platform::Win32 => "zip",
        _ => "tar.gz",
    }
}

/// Artifact path under a registry base URL.
pub fn artifact_path(
    engine: Engine,
    ver: &str,
    platform: Platform,
    arch: Arch,
) -> String {
    format!(
        "/{engine}/{ver}/{engine}-{ver}-{platform}-{arch}.{ext}",
        ext = archive_extension(platform)
    )
}

/// HTTP client over the registry with mirror fallback.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    bases: Vec<String>,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    pub fn new() -> RegistryClient {
        RegistryClient::with_bases(vec![
            PRIMARY_REGISTRY.to_string(),
            FALLBACK_REGISTRY.to_string(),
        ])
    }

    /// Client over explicit base URLs; tests point this at a local server.
    pub fn with_bases(bases: Vec<String>) -> RegistryClient {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        RegistryClient { client, bases }
    }

    /// GET `path` off each base in order, returning the first successful
    /// response. A 404 anywhere is terminal (the mirrors are replicas);
    /// network errors and 5xx fall through to the next base.
    pub async fn fetch_with_registry_fallback(
        &self,
        path: &str,
    ) -> Result<reqwest::Response, SpinError> {
        let mut last_error: Option<SpinError> = None;
        for base in &self.bases {
            let url = format!("{base}{path}");
            debug!(%url, "fetching from registry");
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Err(SpinError::DownloadFailed {
                        url,
                        reason: "not found".to_string(),
                    });
                }
                Ok(resp) => {
                    warn!(%url, status = %resp.status(), "registry returned an error");
                    last_error = Some(SpinError::DownloadFailed {
                        url,
                        reason: format!("HTTP {}", resp.status()),
                    });
                }
                Err(err) => {
                    warn!(%url, error = %err, "registry fetch failed");
                    last_error = Some(SpinError::ConnectionFailed {
                        url,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            SpinError::Unknown("no registry base URLs configured".to_string())
        }))
    }

    /// Fetch and parse the version catalog.
    pub async fn fetch_catalog(&self) -> Result<Catalog, SpinError> {
        let resp = self.fetch_with_registry_fallback(CATALOG_PATH).await?;
        resp.json::<Catalog>().await.map_err(|err| {
            SpinError::DownloadFailed {
                url: CATALOG_PATH.to_string(),
                reason: format!("invalid catalog JSON: {err}"),
            }
        })
    }

    /// Open a streaming response for an artifact archive. 404 maps to
    /// [`SpinError::BinaryNotPublished`].
    pub async fn fetch_artifact(
        &self,
        engine: Engine,
        ver: &str,
        platform: Platform,
        arch: Arch,
    ) -> Result<reqwest::Response, SpinError> {
        let path = artifact_path(engine, ver, platform, arch);
        self.fetch_with_registry_fallback(&path)
            .await
            .map_err(|err| match err {
                SpinError::DownloadFailed { reason, .. }
                    if reason == "not found" =>
                {
                    SpinError::BinaryNotPublished {
                        engine: engine.id().to_string(),
                        version: ver.to_string(),
                        platform: platform.id().to_string(),
                        arch: arch.id().to_string(),
                    }
                }
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(versions: &[&str]) -> Catalog {
        let mut engines = HashMap::new();
        engines.insert(
            "postgresql".to_string(),
            EngineCatalog {
                versions: versions.iter().map(|s| s.to_string()).collect(),
            },
        );
        Catalog { engines }
    }

    #[test]
    fn artifact_paths_follow_the_convention() {
        assert_eq!(
            artifact_path(
                Engine::PostgreSql,
                "17.5",
                Platform::Linux,
                Arch::X64
            ),
            "/postgresql/17.5/postgresql-17.5-linux-x64.tar.gz"
        );
        assert_eq!(
            artifact_path(Engine::Redis, "8.0.2", Platform::Win32, Arch::X64),
            "/redis/8.0.2/redis-8.0.2-win32-x64.zip"
        );
    }

    #[test]
    fn resolve_prefers_exact_then_newest_of_major() {
        let cat = catalog(&["16.9", "17.4", "17.5", "18.0"]);
        assert_eq!(
            cat.resolve(Engine::PostgreSql, "17.4").unwrap(),
            "17.4"
        );
        assert_eq!(cat.resolve(Engine::PostgreSql, "17").unwrap(), "17.5");
        assert_eq!(cat.resolve(Engine::PostgreSql, "18").unwrap(), "18.0");
        assert!(cat.resolve(Engine::PostgreSql, "15").is_none());
    }

    #[test]
    fn versions_are_sorted_newest_first() {
        let cat = catalog(&["16.9", "18.0", "17.5"]);
        assert_eq!(
            cat.versions(Engine::PostgreSql),
            vec!["18.0", "17.5", "16.9"]
        );
    }
}
