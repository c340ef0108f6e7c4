//! Core data model definitions shared across SpinDB crates.
#![allow(missing_docs)]

pub mod binary;
pub mod container;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod platform;

// Intentionally curated re-exports for downstream consumers.
pub use binary::{InstalledBinary, bin_dir_name};
pub use container::{
    ContainerConfig, ContainerStatus, validate_container_name,
    validate_database_name,
};
pub use defaults::{EngineDefaults, PidFileLocation};
pub use engine::Engine;
pub use error::{Severity, SpinError, Result as SpinResult};
pub use platform::{Arch, Platform, executable_extension};
