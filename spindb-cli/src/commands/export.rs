//! `spindb export docker`.

use std::path::PathBuf;

use anyhow::Result;

use spindb_core::ContainerManager;
use spindb_core::docker::{ExportOptions, export};

use crate::output::emit_json;

#[allow(clippy::too_many_arguments)]
pub async fn docker(
    manager: &ContainerManager,
    name: &str,
    output: PathBuf,
    port: Option<u16>,
    include_data: bool,
    backup: Option<PathBuf>,
    skip_tls: bool,
    json: bool,
) -> Result<i32> {
    let outcome = export(
        manager,
        name,
        &ExportOptions {
            output_dir: output,
            port,
            include_data,
            backup_path: backup,
            skip_tls,
        },
    )
    .await?;

    if json {
        emit_json(&outcome);
        return Ok(0);
    }
    println!("exported to {}", outcome.output_dir.display());
    for file in &outcome.files {
        println!("  {file}");
    }
    println!(
        "credentials: {} / {}",
        outcome.credentials.username, outcome.credentials.password
    );
    println!("next: cd {} && docker compose up -d", outcome.output_dir.display());
    Ok(0)
}
