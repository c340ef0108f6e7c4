//! Core library for SpinDB.
//!
//! This crate centralizes everything below the CLI surface: resolving the
//! per-user storage layout, acquiring and verifying engine binaries from
//! the artifact registry, starting and stopping database servers as
//! managed OS processes, the transactional container lifecycle, and the
//! higher-level operations built on top of it (pull, docker export,
//! doctor). The `spindb` binary is a thin clap layer over these modules.

pub mod binaries;
pub mod containers;
pub mod docker;
pub mod doctor;
pub mod engines;
pub mod file_registry;
pub mod fsutil;
pub mod logging;
pub mod paths;
pub mod platform;
pub mod ports;
pub mod process;
pub mod pull;
pub mod registry;
pub mod settings;
pub mod tempdir;
pub mod transaction;
pub mod version;

pub use binaries::BinaryManager;
pub use containers::{ContainerManager, CreateSpec, DeleteOptions};
pub use doctor::{CheckResult, CheckStatus};
pub use engines::{
    BackupFormat, BackupOptions, DatabaseEngine, EngineContext,
    RestoreOptions, ScriptRequest, StartOutcome, engine_for,
};
pub use file_registry::FileRegistryStore;
pub use paths::Paths;
pub use process::ProcessManager;
pub use pull::{PullMode, PullOptions, PullOutcome};
pub use registry::RegistryClient;
pub use settings::Settings;
pub use transaction::{Transaction, with_transaction};
