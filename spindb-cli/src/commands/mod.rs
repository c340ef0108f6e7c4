//! CLI surface: argument definitions and dispatch.

mod data;
mod doctor_cmd;
mod export;
mod lifecycle;
mod registry_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use spindb_core::ContainerManager;

#[derive(Parser)]
#[command(
    name = "spindb",
    version,
    about = "Run local databases without Docker",
    propagate_version = true
)]
pub struct Cli {
    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose diagnostics on stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Container name
    pub name: String,
    /// Database engine (postgresql, mysql, redis, sqlite, ...)
    #[arg(long, short)]
    pub engine: String,
    /// Engine version or major (defaults to the engine's current version)
    #[arg(long = "db-version")]
    pub db_version: Option<String>,
    /// Explicit port; must be free
    #[arg(long, short)]
    pub port: Option<u16>,
    /// Primary database name (defaults to the container name)
    #[arg(long, short)]
    pub database: Option<String>,
    /// File-based engines: place the data file here
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Start the server after creation
    #[arg(long)]
    pub start: bool,
    /// Restore this local backup into the new container
    #[arg(long)]
    pub from: Option<PathBuf>,
    /// Pull data from this remote connection string
    #[arg(long = "from-url")]
    pub from_url: Option<String>,
    /// FerretDB: version of the embedded PostgreSQL backend
    #[arg(long = "backend-version")]
    pub backend_version: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a container
    Create(CreateArgs),
    /// Start a container's server
    Start { name: String },
    /// Stop a container's server
    Stop { name: String },
    /// List containers with live status
    List,
    /// Show a container's configuration, size, and connection string
    Info { name: String },
    /// Delete a container (and optionally its binary)
    Delete {
        name: String,
        /// Also remove the engine binary when unreferenced
        #[arg(long)]
        force: bool,
    },
    /// Copy a stopped container into a new one on a fresh port
    Clone { src: String, dst: String },
    /// Rename a stopped container
    Rename { old: String, new: String },
    /// Change a stopped container's port or version
    Edit {
        name: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long = "db-version")]
        db_version: Option<String>,
    },
    /// Produce a backup
    Backup {
        name: String,
        /// Output file (or directory for archive formats)
        #[arg(long, short)]
        output: PathBuf,
        /// sql | dump | archive (engine default otherwise)
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        database: Option<String>,
    },
    /// Load a backup
    Restore {
        name: String,
        /// Backup file to load
        #[arg(long, short)]
        input: PathBuf,
        /// Drop existing objects first where supported
        #[arg(long)]
        clean: bool,
        #[arg(long)]
        database: Option<String>,
    },
    /// Execute a script file and/or inline statement
    Run {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        sql: Option<String>,
    },
    /// Open the engine's interactive client
    Connect {
        name: String,
        #[arg(long)]
        database: Option<String>,
    },
    /// Print the connection string
    Url {
        name: String,
        #[arg(long)]
        database: Option<String>,
        /// Copy to the system clipboard as well
        #[arg(long)]
        copy: bool,
    },
    /// Print the engine's log
    Logs {
        name: String,
        /// Only the last N lines
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Export deployment artifacts
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },
    /// Replicate a remote database into a container
    Pull {
        name: String,
        #[arg(long = "from-url")]
        from_url: String,
        /// Load into a new database instead of replacing the primary
        #[arg(long = "clone")]
        clone_into: Option<String>,
        /// Script to run after a successful pull
        #[arg(long = "post-script")]
        post_script: Option<PathBuf>,
        /// Replace mode: drop the safety-copy database on success
        #[arg(long = "drop-backup")]
        drop_backup: bool,
        #[arg(long)]
        force: bool,
    },
    /// Run health checks over the installation
    Doctor,
    /// Manage registered file-based databases
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
    /// Manage logical databases inside a container
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
pub enum ExportTarget {
    /// Emit a Dockerfile, compose file, and credentials for a container
    Docker {
        name: String,
        /// Output directory
        #[arg(long, short)]
        output: PathBuf,
        /// Published port (defaults to the container's)
        #[arg(long)]
        port: Option<u16>,
        /// Ship a fresh backup as initialization data
        #[arg(long = "include-data")]
        include_data: bool,
        /// Ship this existing backup instead
        #[arg(long)]
        backup: Option<PathBuf>,
        /// Skip self-signed TLS generation
        #[arg(long = "skip-tls")]
        skip_tls: bool,
    },
}

#[derive(Subcommand)]
pub enum RegistryAction {
    /// Register an existing database file under a name
    Import {
        name: String,
        path: PathBuf,
        #[arg(long, short, default_value = "sqlite")]
        engine: String,
    },
    /// List database-looking files in a folder
    Scan {
        folder: PathBuf,
        #[arg(long, short, default_value = "sqlite")]
        engine: String,
    },
    /// Permanently skip a folder in future scans
    Ignore {
        folder: PathBuf,
        #[arg(long, short, default_value = "sqlite")]
        engine: String,
    },
    /// Show registered files and orphans
    List,
    /// Remove entries whose file no longer exists
    Clean,
}

#[derive(Subcommand)]
pub enum DbAction {
    /// Create a logical database inside a container
    Add { container: String, database: String },
    /// Drop a logical database
    Remove { container: String, database: String },
}

/// Dispatch to the handlers; returns the process exit code.
pub async fn run(cli: &Cli, manager: &ContainerManager) -> Result<i32> {
    match &cli.command {
        Command::Create(args) => lifecycle::create(manager, args, cli.json).await,
        Command::Start { name } => lifecycle::start(manager, name, cli.json).await,
        Command::Stop { name } => lifecycle::stop(manager, name, cli.json).await,
        Command::List => lifecycle::list(manager, cli.json).await,
        Command::Info { name } => lifecycle::info(manager, name, cli.json).await,
        Command::Delete { name, force } => {
            lifecycle::delete(manager, name, *force, cli.json).await
        }
        Command::Clone { src, dst } => {
            lifecycle::clone(manager, src, dst, cli.json).await
        }
        Command::Rename { old, new } => {
            lifecycle::rename(manager, old, new, cli.json).await
        }
        Command::Edit {
            name,
            port,
            db_version,
        } => lifecycle::edit(manager, name, *port, db_version.clone(), cli.json).await,
        Command::Url {
            name,
            database,
            copy,
        } => lifecycle::url(manager, name, database.as_deref(), *copy, cli.json).await,
        Command::Logs { name, tail } => {
            lifecycle::logs(manager, name, *tail).await
        }
        Command::Backup {
            name,
            output,
            format,
            database,
        } => {
            data::backup(
                manager,
                name,
                output,
                format.as_deref(),
                database.clone(),
                cli.json,
            )
            .await
        }
        Command::Restore {
            name,
            input,
            clean,
            database,
        } => data::restore(manager, name, input, *clean, database.clone(), cli.json).await,
        Command::Run { name, file, sql } => {
            data::run_script(manager, name, file.clone(), sql.clone()).await
        }
        Command::Connect { name, database } => {
            data::connect(manager, name, database.as_deref()).await
        }
        Command::Export { target } => match target {
            ExportTarget::Docker {
                name,
                output,
                port,
                include_data,
                backup,
                skip_tls,
            } => {
                export::docker(
                    manager,
                    name,
                    output.clone(),
                    *port,
                    *include_data,
                    backup.clone(),
                    *skip_tls,
                    cli.json,
                )
                .await
            }
        },
        Command::Pull {
            name,
            from_url,
            clone_into,
            post_script,
            drop_backup,
            force,
        } => {
            data::pull(
                manager,
                name,
                from_url,
                clone_into.clone(),
                post_script.clone(),
                *drop_backup,
                *force,
                cli.json,
            )
            .await
        }
        Command::Doctor => doctor_cmd::doctor(manager, cli.json).await,
        Command::Registry { action } => {
            registry_cmd::run(manager, action, cli.json).await
        }
        Command::Db { action } => match action {
            DbAction::Add {
                container,
                database,
            } => data::add_database(manager, container, database).await,
            DbAction::Remove {
                container,
                database,
            } => data::remove_database(manager, container, database).await,
        },
    }
}
