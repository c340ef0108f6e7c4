//! `spindb doctor`.

use std::io::IsTerminal;

use anyhow::Result;

use spindb_core::ContainerManager;
use spindb_core::doctor::{CheckStatus, has_issues, run_all};

use crate::output::emit_json;

pub async fn doctor(manager: &ContainerManager, json: bool) -> Result<i32> {
    let results = run_all(manager).await;

    if json {
        emit_json(&results);
    } else {
        for result in &results {
            let marker = match result.status {
                CheckStatus::Ok => "ok ",
                CheckStatus::Warning => "warn",
                CheckStatus::Error => "FAIL",
            };
            println!("[{marker}] {}: {}", result.name, result.message);
            if let Some(action) = &result.action {
                println!("       fix: {action}");
            }
        }
    }

    // Non-interactive runs signal issues through the exit code.
    let non_interactive = json
        || !std::io::stdout().is_terminal()
        || std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok();
    if non_interactive && has_issues(&results) {
        return Ok(1);
    }
    Ok(0)
}
