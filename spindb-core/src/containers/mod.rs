//! The on-disk registry of containers and their transactional lifecycle
//! operations.
//!
//! Every mutation that takes more than one step (create, delete with
//! binary GC, clone, restore sources) runs under a [`Transaction`] so a
//! failure anywhere unwinds cleanly.

pub mod store;

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use spindb_model::{
    Arch, ContainerConfig, ContainerStatus, Engine, EngineDefaults, Platform,
    SpinError, validate_container_name, validate_database_name,
};

use crate::binaries::BinaryManager;
use crate::engines::{
    DatabaseEngine, EngineContext, RestoreOptions, StartOutcome, engine_for,
};
use crate::paths::Paths;
use crate::ports;
use crate::registry::RegistryClient;
use crate::transaction::with_transaction;

/// Everything `create` needs to know.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub name: String,
    pub engine: Engine,
    /// Engine-native version or major; `None` means the engine default.
    pub version: Option<String>,
    /// Explicit port; must be free. `None` allocates from the range.
    pub port: Option<u16>,
    /// Primary database name; defaults to the container name.
    pub database: Option<String>,
    /// File-based engines only: place the data file here instead of the
    /// canonical layout.
    pub path: Option<PathBuf>,
    pub start: bool,
    /// Local backup to restore after creation.
    pub from: Option<PathBuf>,
    /// Remote instance to pull after creation.
    pub from_url: Option<String>,
    /// FerretDB only: version of the embedded PostgreSQL backend.
    pub backend_version: Option<String>,
}

impl CreateSpec {
    pub fn new(name: impl Into<String>, engine: Engine) -> CreateSpec {
        CreateSpec {
            name: name.into(),
            engine,
            version: None,
            port: None,
            database: None,
            path: None,
            start: false,
            from: None,
            from_url: None,
            backend_version: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Also delete the installed binary when this was its last
    /// referencing container.
    pub force: bool,
}

/// Owner of `containers/{engine}/{name}/container.json` and the lifecycle
/// operations over them.
#[derive(Clone)]
pub struct ContainerManager {
    paths: Paths,
    ctx: EngineContext,
    registry: RegistryClient,
}

impl std::fmt::Debug for ContainerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerManager")
            .field("root", &self.paths.root())
            .finish()
    }
}

impl ContainerManager {
    pub fn new(paths: Paths, registry: RegistryClient) -> ContainerManager {
        let ctx = EngineContext::new(paths.clone());
        ContainerManager {
            paths,
            ctx,
            registry,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Load one container; when `engine` is unknown, search all engines
    /// for the name.
    pub async fn load(
        &self,
        name: &str,
        engine: Option<Engine>,
    ) -> Result<ContainerConfig, SpinError> {
        match engine {
            Some(engine) => {
                store::load(&self.paths, name, engine).await
            }
            None => {
                for engine in Engine::ALL {
                    if let Ok(cfg) =
                        store::load(&self.paths, name, engine).await
                    {
                        return Ok(cfg);
                    }
                }
                Err(SpinError::ContainerNotFound {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Enumerate all containers with freshly recomputed status.
    pub async fn list(&self) -> Result<Vec<ContainerConfig>, SpinError> {
        let mut containers = store::load_all(&self.paths).await?;
        for cfg in &mut containers {
            cfg.status = self.probe_status(cfg).await;
        }
        containers.sort_by(|a, b| {
            (a.engine.id(), a.name.as_str()).cmp(&(b.engine.id(), b.name.as_str()))
        });
        Ok(containers)
    }

    async fn probe_status(&self, cfg: &ContainerConfig) -> ContainerStatus {
        let engine = engine_for(cfg.engine);
        if cfg.engine.is_file_based() {
            if cfg.data_path.exists() {
                ContainerStatus::Available
            } else {
                ContainerStatus::Missing
            }
        } else {
            match engine.status(&self.ctx, cfg).await {
                Ok(true) => ContainerStatus::Running,
                _ => ContainerStatus::Stopped,
            }
        }
    }

    /// The central multi-step operation. All steps run inside one
    /// transaction; any failure rolls back in reverse.
    pub async fn create(
        &self,
        spec: CreateSpec,
    ) -> Result<ContainerConfig, SpinError> {
        // Step 1: fail fast on name shape and uniqueness.
        validate_container_name(&spec.name)?;
        if store::exists(&self.paths, &spec.name, spec.engine) {
            return Err(SpinError::ContainerAlreadyExists {
                name: spec.name.clone(),
            });
        }
        if let Some(db) = &spec.database {
            validate_database_name(db)?;
        }

        let defaults = EngineDefaults::for_engine(spec.engine);
        let platform = Platform::current();
        let arch = Arch::current();

        // Step 2: allocate a port (server-based only). An explicit port
        // must be free; otherwise scan the engine's range.
        let port = match (spec.engine.is_file_based(), spec.port) {
            (true, _) => 0,
            (false, Some(explicit)) => {
                if !ports::is_port_available(explicit) {
                    return Err(SpinError::PortInUse { port: explicit });
                }
                explicit
            }
            (false, None) => {
                ports::allocate_port(defaults.port_range, defaults.default_port)?
            }
        };

        let version = self
            .resolve_version(
                spec.engine,
                spec.version.as_deref().unwrap_or(defaults.default_version),
            )
            .await;

        let database = spec
            .database
            .clone()
            .unwrap_or_else(|| spec.name.replace('-', "_"));
        validate_database_name(&database)?;

        let data_path = match (&spec.path, spec.engine.is_file_based()) {
            (Some(custom), true) => absolutize(custom),
            _ => self.paths.container_data(&spec.name, spec.engine),
        };

        let mut cfg = ContainerConfig {
            name: spec.name.clone(),
            engine: spec.engine,
            version: version.clone(),
            port,
            database: database.clone(),
            databases: vec![database],
            data_path,
            binary_path: PathBuf::new(),
            status: ContainerStatus::Stopped,
            created_at: Utc::now(),
            backend_version: match spec.engine {
                Engine::FerretDb => Some(
                    spec.backend_version
                        .clone()
                        .unwrap_or_else(|| "17.5".to_string()),
                ),
                _ => None,
            },
        };

        let manager = self.clone();
        let created = with_transaction(async move |tx| {
            // Step 3: binaries.
            cfg.binary_path = manager
                .ensure_binaries(tx, &cfg, platform, arch)
                .await?;

            // Step 4: data directory, with the container directory's
            // removal registered first so partial init is cleaned.
            let container_dir =
                manager.paths.container_path(&cfg.name, cfg.engine);
            {
                let dir = container_dir.clone();
                tx.add_rollback(
                    format!("remove container directory {}", dir.display()),
                    move || {
                        Box::pin(async move {
                            if dir.exists() {
                                tokio::fs::remove_dir_all(&dir).await?;
                            }
                            Ok(())
                        })
                    },
                )?;
            }
            tokio::fs::create_dir_all(&container_dir).await?;

            // An externally-placed data file is outside the container
            // directory; it only rolls back when this create made it.
            let external_file = spec
                .path
                .as_ref()
                .map(|custom| absolutize(custom))
                .filter(|file| !file.exists());

            let engine = engine_for(cfg.engine);
            engine.init_data_dir(&manager.ctx, &cfg).await?;

            if let Some(file) = external_file {
                tx.add_rollback(
                    format!("remove data file {}", file.display()),
                    move || {
                        Box::pin(async move {
                            if file.exists() {
                                tokio::fs::remove_file(&file).await?;
                            }
                            Ok(())
                        })
                    },
                )?;
            }

            // Step 5: persist the config.
            store::save(&manager.paths, &cfg).await?;
            {
                let paths = manager.paths.clone();
                let name = cfg.name.clone();
                let engine_id = cfg.engine;
                tx.add_rollback("remove container config", move || {
                    Box::pin(async move {
                        let path = paths.container_config(&name, engine_id);
                        if path.exists() {
                            tokio::fs::remove_file(&path).await?;
                        }
                        Ok(())
                    })
                })?;
            }

            // Steps 6/7: start, and load a restore source. Both need
            // a running server; a `--start=false` create with a
            // source stops again afterwards.
            let wants_running = spec.start
                || spec.from.is_some()
                || spec.from_url.is_some();
            if wants_running && !cfg.engine.is_file_based() {
                let ctx = manager.ctx.clone();
                let stop_cfg = cfg.clone();
                engine.start(&ctx, &cfg).await?;
                tx.add_rollback("stop container", move || {
                    Box::pin(async move {
                        engine_for(stop_cfg.engine)
                            .stop(&ctx, &stop_cfg)
                            .await?;
                        Ok(())
                    })
                })?;
            }

            if let Some(source) = &spec.from {
                engine
                    .restore(
                        &manager.ctx,
                        &cfg,
                        source,
                        &RestoreOptions::default(),
                    )
                    .await?;
            }
            if let Some(url) = &spec.from_url {
                let dump = crate::tempdir::temp_file("pull", "dump");
                let result = async {
                    engine
                        .dump_from_connection_string(
                            &manager.ctx,
                            url,
                            &dump,
                        )
                        .await?;
                    engine
                        .restore(
                            &manager.ctx,
                            &cfg,
                            &dump,
                            &RestoreOptions::default(),
                        )
                        .await
                }
                .await;
                let _ = tokio::fs::remove_file(&dump).await;
                result?;
            }

            if !spec.start
                && (spec.from.is_some() || spec.from_url.is_some())
                && !cfg.engine.is_file_based()
            {
                engine.stop(&manager.ctx, &cfg).await?;
            }

            // Step 8 happens in with_transaction: commit.
            Ok(cfg)
        })
        .await?;

        let mut final_cfg = created;
        final_cfg.status = self.probe_status(&final_cfg).await;
        store::save(&self.paths, &final_cfg).await?;
        info!(
            container = %final_cfg.name,
            engine = %final_cfg.engine,
            port = final_cfg.port,
            "container created"
        );
        Ok(final_cfg)
    }

    /// Resolve a requested version against the registry catalog; network
    /// trouble degrades to using the request verbatim.
    async fn resolve_version(&self, engine: Engine, requested: &str) -> String {
        match self.registry.fetch_catalog().await {
            Ok(catalog) => catalog
                .resolve(engine, requested)
                .unwrap_or_else(|| requested.to_string()),
            Err(err) => {
                debug!(error = %err, "catalog unavailable; using requested version");
                requested.to_string()
            }
        }
    }

    /// Ensure the engine binary (and FerretDB's backend) is installed,
    /// registering removal only when this create performed the install.
    async fn ensure_binaries(
        &self,
        tx: &mut crate::transaction::Transaction,
        cfg: &ContainerConfig,
        platform: Platform,
        arch: Arch,
    ) -> Result<PathBuf, SpinError> {
        if cfg.engine.is_file_based() {
            // Clients for file engines come from PATH, or from an
            // already-installed local binary; no network on create.
            let manager = BinaryManager::new(
                self.paths.clone(),
                self.registry.clone(),
                cfg.engine,
            );
            if manager.is_installed(&cfg.version, platform, arch) {
                return Ok(manager.bin_dir(&cfg.version, platform, arch));
            }
            return Ok(PathBuf::new());
        }

        let manager = BinaryManager::new(
            self.paths.clone(),
            self.registry.clone(),
            cfg.engine,
        );
        let was_installed = manager.is_installed(&cfg.version, platform, arch);
        let bin_dir = manager
            .ensure_installed(&cfg.version, platform, arch, None)
            .await?;
        if !was_installed {
            let gc_manager = manager.clone();
            let version = cfg.version.clone();
            let paths = self.paths.clone();
            let engine = cfg.engine;
            let container = cfg.name.clone();
            tx.add_rollback("remove freshly installed binary", move || {
                Box::pin(async move {
                    // Another container may have started referencing the
                    // binary in the meantime; leave it alone then.
                    let others = store::references(
                        &paths, engine, &version, &container,
                    )
                    .await;
                    if others == 0 {
                        gc_manager.delete(&version, platform, arch).await?;
                    }
                    Ok(())
                })
            })?;
        }

        if cfg.engine == Engine::FerretDb {
            let backend_version =
                cfg.backend_version.clone().unwrap_or_else(|| "17.5".to_string());
            let backend = BinaryManager::new(
                self.paths.clone(),
                self.registry.clone(),
                Engine::PostgreSql,
            );
            let backend_installed =
                backend.is_installed(&backend_version, platform, arch);
            backend
                .ensure_installed(&backend_version, platform, arch, None)
                .await?;
            if !backend_installed {
                let gc = backend.clone();
                let version = backend_version.clone();
                tx.add_rollback("remove ferretdb backend binary", move || {
                    Box::pin(async move {
                        gc.delete(&version, platform, arch).await?;
                        Ok(())
                    })
                })?;
            }
        }
        Ok(bin_dir)
    }

    pub async fn start(&self, name: &str) -> Result<StartOutcome, SpinError> {
        let mut cfg = self.load(name, None).await?;
        let engine = engine_for(cfg.engine);

        // The verification predicate must hold before running; a missing
        // binary (deleted, or a synced config) is re-acquired here.
        if !cfg.engine.is_file_based() {
            let manager = BinaryManager::new(
                self.paths.clone(),
                self.registry.clone(),
                cfg.engine,
            );
            cfg.binary_path = manager
                .ensure_installed(
                    &cfg.version,
                    Platform::current(),
                    Arch::current(),
                    None,
                )
                .await?;
        }

        let outcome = engine.start(&self.ctx, &cfg).await?;
        cfg.status = self.probe_status(&cfg).await;
        store::save(&self.paths, &cfg).await?;
        Ok(outcome)
    }

    pub async fn stop(&self, name: &str) -> Result<(), SpinError> {
        let mut cfg = self.load(name, None).await?;
        let engine = engine_for(cfg.engine);
        engine.stop(&self.ctx, &cfg).await?;
        cfg.status = self.probe_status(&cfg).await;
        store::save(&self.paths, &cfg).await?;
        Ok(())
    }

    /// Stop if running, remove the container directory, and optionally
    /// garbage-collect the now-unreferenced binary.
    pub async fn delete(
        &self,
        name: &str,
        opts: &DeleteOptions,
    ) -> Result<(), SpinError> {
        let cfg = self.load(name, None).await?;
        let engine = engine_for(cfg.engine);

        if !cfg.engine.is_file_based()
            && engine.status(&self.ctx, &cfg).await.unwrap_or(false)
        {
            engine.stop(&self.ctx, &cfg).await?;
        }

        let container_dir = self.paths.container_path(&cfg.name, cfg.engine);
        if container_dir.exists() {
            tokio::fs::remove_dir_all(&container_dir).await?;
        }

        if opts.force && !cfg.engine.is_file_based() {
            let remaining = store::references(
                &self.paths,
                cfg.engine,
                &cfg.version,
                &cfg.name,
            )
            .await;
            if remaining == 0 {
                let manager = BinaryManager::new(
                    self.paths.clone(),
                    self.registry.clone(),
                    cfg.engine,
                );
                manager
                    .delete(&cfg.version, Platform::current(), Arch::current())
                    .await?;
            } else {
                debug!(
                    engine = %cfg.engine,
                    version = %cfg.version,
                    remaining,
                    "binary still referenced; keeping"
                );
            }
        }
        info!(container = name, "container deleted");
        Ok(())
    }

    /// Copy a stopped container's data into a new container on a fresh
    /// port. The clone is not started.
    pub async fn clone_container(
        &self,
        src: &str,
        dst: &str,
    ) -> Result<ContainerConfig, SpinError> {
        validate_container_name(dst)?;
        let src_cfg = self.load(src, None).await?;
        if store::exists(&self.paths, dst, src_cfg.engine) {
            return Err(SpinError::ContainerAlreadyExists {
                name: dst.to_string(),
            });
        }
        let engine = engine_for(src_cfg.engine);
        if !src_cfg.engine.is_file_based()
            && engine.status(&self.ctx, &src_cfg).await.unwrap_or(false)
        {
            return Err(SpinError::ContainerRunning {
                name: src.to_string(),
            });
        }

        let defaults = EngineDefaults::for_engine(src_cfg.engine);
        let port = if src_cfg.engine.is_file_based() {
            0
        } else {
            ports::allocate_port(defaults.port_range, defaults.default_port)?
        };

        let mut dst_cfg = src_cfg.clone();
        dst_cfg.name = dst.to_string();
        dst_cfg.port = port;
        dst_cfg.data_path = self.paths.container_data(dst, src_cfg.engine);
        dst_cfg.created_at = Utc::now();

        let manager = self.clone();
        let cloned = with_transaction(async move |tx| {
            let dst_dir =
                manager.paths.container_path(&dst_cfg.name, dst_cfg.engine);
            {
                let dir = dst_dir.clone();
                tx.add_rollback(
                    format!("remove clone directory {}", dir.display()),
                    move || {
                        Box::pin(async move {
                            if dir.exists() {
                                tokio::fs::remove_dir_all(&dir).await?;
                            }
                            Ok(())
                        })
                    },
                )?;
            }
            tokio::fs::create_dir_all(&dst_dir).await?;

            if src_cfg.engine.is_file_based() {
                if src_cfg.data_path.exists() {
                    tokio::fs::copy(&src_cfg.data_path, &dst_cfg.data_path)
                        .await?;
                }
            } else {
                crate::fsutil::copy_dir_all(
                    &src_cfg.data_path,
                    &dst_cfg.data_path,
                )
                .map_err(|err| SpinError::Unknown(format!("{err:#}")))?;
                // Engine config files carry the old name, port, and
                // absolute paths; re-point them.
                rewrite_engine_configs(
                    &manager.paths,
                    &src_cfg,
                    &dst_cfg,
                )
                .await?;
            }

            dst_cfg.status = if src_cfg.engine.is_file_based() {
                ContainerStatus::Available
            } else {
                ContainerStatus::Stopped
            };
            store::save(&manager.paths, &dst_cfg).await?;
            Ok(dst_cfg)
        })
        .await?;
        info!(src, dst, "container cloned");
        Ok(cloned)
    }

    /// Rename a stopped container: move its directory and regenerate the
    /// paths engines persist inside their config files.
    pub async fn rename(
        &self,
        old: &str,
        new: &str,
    ) -> Result<ContainerConfig, SpinError> {
        validate_container_name(new)?;
        let cfg = self.load(old, None).await?;
        if store::exists(&self.paths, new, cfg.engine) {
            return Err(SpinError::ContainerAlreadyExists {
                name: new.to_string(),
            });
        }
        let engine = engine_for(cfg.engine);
        if !cfg.engine.is_file_based()
            && engine.status(&self.ctx, &cfg).await.unwrap_or(false)
        {
            return Err(SpinError::ContainerRunning {
                name: old.to_string(),
            });
        }

        let old_dir = self.paths.container_path(old, cfg.engine);
        let new_dir = self.paths.container_path(new, cfg.engine);
        tokio::fs::rename(&old_dir, &new_dir).await?;

        let mut new_cfg = cfg.clone();
        new_cfg.name = new.to_string();
        // A data path inside the container dir moves with it; an external
        // file (file-based `--path`) stays put.
        if cfg.data_path.starts_with(&old_dir) {
            let relative = cfg
                .data_path
                .strip_prefix(&old_dir)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            new_cfg.data_path = new_dir.join(relative);
            // File-based data files are named after the container.
            if cfg.engine.is_file_based() {
                let renamed = self.paths.container_data(new, cfg.engine);
                if new_cfg.data_path.exists() {
                    tokio::fs::rename(&new_cfg.data_path, &renamed).await?;
                }
                new_cfg.data_path = renamed;
            }
        }

        if !cfg.engine.is_file_based() {
            rewrite_engine_configs(&self.paths, &cfg, &new_cfg).await?;
        }
        store::save(&self.paths, &new_cfg).await?;
        info!(old, new, "container renamed");
        Ok(new_cfg)
    }

    /// Change the port and/or version of a stopped container, keeping the
    /// engine's on-disk config in line.
    pub async fn edit(
        &self,
        name: &str,
        new_port: Option<u16>,
        new_version: Option<String>,
    ) -> Result<ContainerConfig, SpinError> {
        let cfg = self.load(name, None).await?;
        let engine = engine_for(cfg.engine);
        if !cfg.engine.is_file_based()
            && engine.status(&self.ctx, &cfg).await.unwrap_or(false)
        {
            return Err(SpinError::ContainerRunning {
                name: name.to_string(),
            });
        }

        let mut new_cfg = cfg.clone();
        if let Some(port) = new_port {
            if cfg.engine.is_file_based() {
                return Err(SpinError::Unknown(format!(
                    "{} containers have no port",
                    cfg.engine
                )));
            }
            if port != cfg.port && !ports::is_port_available(port) {
                return Err(SpinError::PortInUse { port });
            }
            new_cfg.port = port;
        }
        if let Some(version) = new_version {
            let resolved = self.resolve_version(cfg.engine, &version).await;
            if !cfg.engine.is_file_based() {
                let manager = BinaryManager::new(
                    self.paths.clone(),
                    self.registry.clone(),
                    cfg.engine,
                );
                new_cfg.binary_path = manager
                    .ensure_installed(
                        &resolved,
                        Platform::current(),
                        Arch::current(),
                        None,
                    )
                    .await?;
            }
            new_cfg.version = resolved;
        }

        if !cfg.engine.is_file_based() && new_cfg.port != cfg.port {
            rewrite_engine_configs(&self.paths, &cfg, &new_cfg).await?;
        }
        store::save(&self.paths, &new_cfg).await?;
        info!(container = name, "container updated");
        Ok(new_cfg)
    }

    /// Add a logical database on a multi-database engine and record it.
    pub async fn add_database(
        &self,
        name: &str,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        let mut cfg = self.load(name, None).await?;
        let engine = engine_for(cfg.engine);
        if !cfg.engine.supports_multiple_databases() {
            return Err(SpinError::DatabaseCreateFailed {
                database: db.to_string(),
                reason: format!("{} manages a single database", cfg.engine),
            });
        }
        engine.create_database(&self.ctx, &cfg, db).await?;
        if !cfg.databases.iter().any(|existing| existing == db) {
            cfg.databases.push(db.to_string());
            store::save(&self.paths, &cfg).await?;
        }
        Ok(())
    }

    pub async fn remove_database(
        &self,
        name: &str,
        db: &str,
    ) -> Result<(), SpinError> {
        validate_database_name(db)?;
        let mut cfg = self.load(name, None).await?;
        let engine = engine_for(cfg.engine);
        if db == cfg.database {
            return Err(SpinError::DatabaseCreateFailed {
                database: db.to_string(),
                reason: "cannot drop the container's primary database"
                    .to_string(),
            });
        }
        engine.drop_database(&self.ctx, &cfg, db).await?;
        cfg.databases.retain(|existing| existing != db);
        store::save(&self.paths, &cfg).await?;
        Ok(())
    }
}

/// Engine config files persist ports, names, and absolute paths; after a
/// clone or rename, re-point every occurrence of the old container root
/// and data path at the new ones.
async fn rewrite_engine_configs(
    paths: &Paths,
    old_cfg: &ContainerConfig,
    new_cfg: &ContainerConfig,
) -> Result<(), SpinError> {
    const CONFIG_FILES: &[&str] = &[
        "redis.conf",
        "valkey.conf",
        "config.xml",
        "config.yaml",
        "data/postgresql.conf",
        "data/pg/postgresql.conf",
        "data/conf/server.conf",
    ];
    let old_dir = paths.container_path(&old_cfg.name, old_cfg.engine);
    let new_dir = paths.container_path(&new_cfg.name, new_cfg.engine);
    let old_root = old_dir.display().to_string();
    let new_root = new_dir.display().to_string();
    let old_port = old_cfg.port.to_string();
    let new_port = new_cfg.port.to_string();

    for rel in CONFIG_FILES {
        let path = new_dir.join(rel);
        let Ok(contents) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        let rewritten = contents
            .replace(&old_root, &new_root)
            .replace(&old_port, &new_port);
        if rewritten != contents {
            tokio::fs::write(&path, rewritten).await?;
            warn!(
                file = %path.display(),
                "rewrote engine config for new identity"
            );
        }
    }
    Ok(())
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> ContainerManager {
        ContainerManager::new(
            Paths::with_root(dir),
            RegistryClient::with_bases(vec![]),
        )
    }

    #[tokio::test]
    async fn create_sqlite_and_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let cfg = mgr
            .create(CreateSpec::new("notes", Engine::Sqlite))
            .await
            .unwrap();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.status, ContainerStatus::Available);
        assert!(cfg.data_path.exists());

        let listed = mgr.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "notes");
        assert_eq!(listed[0].status, ContainerStatus::Available);

        // Removing the file flips the status to missing.
        tokio::fs::remove_file(&cfg.data_path).await.unwrap();
        let listed = mgr.list().await.unwrap();
        assert_eq!(listed[0].status, ContainerStatus::Missing);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(CreateSpec::new("notes", Engine::Sqlite))
            .await
            .unwrap();
        let err = mgr
            .create(CreateSpec::new("notes", Engine::Sqlite))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTAINER_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn create_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let err = mgr
            .create(CreateSpec::new("2fast", Engine::Sqlite))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONTAINER_NAME");
    }

    #[tokio::test]
    async fn create_with_custom_path_registers_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let custom = dir.path().join("elsewhere").join("notes.sqlite");
        let mut spec = CreateSpec::new("notes", Engine::Sqlite);
        spec.path = Some(custom.clone());
        let cfg = mgr.create(spec).await.unwrap();
        assert_eq!(cfg.data_path, custom);
        assert!(custom.exists());
    }

    #[tokio::test]
    async fn clone_copies_data_and_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let cfg = mgr
            .create(CreateSpec::new("prod", Engine::Sqlite))
            .await
            .unwrap();
        tokio::fs::write(&cfg.data_path, b"precious").await.unwrap();

        let clone = mgr.clone_container("prod", "test").await.unwrap();
        assert_eq!(
            tokio::fs::read(&clone.data_path).await.unwrap(),
            b"precious"
        );
        assert!(cfg.data_path.exists());
        assert_ne!(clone.data_path, cfg.data_path);

        mgr.delete("test", &DeleteOptions::default()).await.unwrap();
        assert!(cfg.data_path.exists());
        assert!(mgr.load("prod", None).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_the_container_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(CreateSpec::new("notes", Engine::Sqlite))
            .await
            .unwrap();
        mgr.delete("notes", &DeleteOptions::default()).await.unwrap();
        assert!(
            !dir.path()
                .join("containers/sqlite/notes")
                .exists()
        );
        let err = mgr.load("notes", None).await.unwrap_err();
        assert_eq!(err.code(), "CONTAINER_NOT_FOUND");
    }

    #[tokio::test]
    async fn rename_moves_directory_and_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let cfg = mgr
            .create(CreateSpec::new("drafts", Engine::Sqlite))
            .await
            .unwrap();
        tokio::fs::write(&cfg.data_path, b"text").await.unwrap();

        let renamed = mgr.rename("drafts", "notes").await.unwrap();
        assert_eq!(renamed.name, "notes");
        assert!(renamed.data_path.ends_with("notes.sqlite"));
        assert_eq!(
            tokio::fs::read(&renamed.data_path).await.unwrap(),
            b"text"
        );
        assert!(mgr.load("drafts", None).await.is_err());
    }
}
