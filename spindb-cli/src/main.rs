//! The `spindb` binary: a clap layer over `spindb-core`.

mod commands;
mod output;

use clap::Parser;
use spindb_core::{Paths, RegistryClient, logging};

use commands::{Cli, run};
use output::render_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let paths = Paths::resolve();
    // A second init (tests, embedding) is harmless.
    let _ = logging::init(&paths, cli.verbose);

    let manager =
        spindb_core::ContainerManager::new(paths, RegistryClient::new());
    match run(&cli, &manager).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            render_error(&err, cli.json);
            std::process::exit(1);
        }
    }
}
