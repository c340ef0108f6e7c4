//! Archive unpacking via the OS-provided facilities: `tar` on Unix,
//! PowerShell `Expand-Archive` on Windows. The PowerShell command line is
//! passed base64-encoded (UTF-16LE) so paths with spaces or non-ASCII
//! survive.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::process::Command;

use spindb_model::Platform;

use crate::platform::powershell;

/// Unpack `archive` into `dest` (created beforehand by the caller).
pub async fn extract_archive(
    archive: &Path,
    dest: &Path,
    platform: Platform,
) -> Result<()> {
    match platform {
        Platform::Win32 => extract_zip(archive, dest).await,
        _ => extract_tarball(archive, dest).await,
    }
}

async fn extract_tarball(archive: &Path, dest: &Path) -> Result<()> {
    let status = Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .status()
        .await
        .context("failed to run tar")?;
    if !status.success() {
        bail!(
            "tar exited with {status} while extracting {}",
            archive.display()
        );
    }
    Ok(())
}

async fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let script = format!(
        "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
        archive.display().to_string().replace('\'', "''"),
        dest.display().to_string().replace('\'', "''"),
    );
    let status = powershell(&script)
        .status()
        .await
        .context("failed to run PowerShell Expand-Archive")?;
    if !status.success() {
        bail!(
            "Expand-Archive exited with {status} while extracting {}",
            archive.display()
        );
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tarball_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("pg/bin")).unwrap();
        std::fs::write(src.join("pg/bin/postgres"), b"#!/bin/sh\n").unwrap();

        let archive = dir.path().join("pg.tar.gz");
        let status = std::process::Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(&src)
            .arg("pg")
            .status()
            .unwrap();
        assert!(status.success());

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        extract_archive(&archive, &dest, Platform::current())
            .await
            .unwrap();
        assert!(dest.join("pg/bin/postgres").exists());
    }
}
