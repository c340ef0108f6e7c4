//! Archive layout normalization.
//!
//! Published archives come in two shapes: `{engine}/bin/*` (already
//! canonical) and `{engine}/*` (flat). Normalization turns both into
//! `binPath/bin/{executables}` with metadata left at the top. Engines
//! that bundle a runtime whose load paths assume co-location keep their
//! tree untouched instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use spindb_model::Engine;

/// How an engine's archive is reshaped after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutRule {
    /// Synthesize `bin/` when the archive is flat.
    Standard,
    /// Leave the extracted tree exactly as shipped (bundled JRE or
    /// similar runtime next to the launcher).
    PreserveTree,
}

/// Per-engine normalization rule.
pub const fn rule_for(engine: Engine) -> LayoutRule {
    match engine {
        Engine::QuestDb => LayoutRule::PreserveTree,
        _ => LayoutRule::Standard,
    }
}

/// Extensions and names that mark an entry as metadata rather than an
/// executable when flattening a flat archive.
fn is_metadata_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    const METADATA_EXTENSIONS: &[&str] = &[
        ".txt", ".md", ".html", ".pdf", ".json", ".yaml", ".yml", ".conf",
        ".cfg", ".ini", ".sample", ".sql", ".xml",
    ];
    const METADATA_NAMES: &[&str] =
        &["license", "licence", "copying", "readme", "notice", "changelog"];

    if METADATA_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }
    METADATA_NAMES
        .iter()
        .any(|n| lower == *n || lower.starts_with(&format!("{n}.")))
}

fn is_executable_name(name: &str) -> bool {
    if is_metadata_name(name) {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    // No extension, or an executable one.
    !lower.contains('.')
        || lower.ends_with(".exe")
        || lower.ends_with(".sh")
        || lower.ends_with(".bat")
        || lower.ends_with(".dll")
        || lower.ends_with(".so")
        || lower.ends_with(".dylib")
}

/// Descend through single-directory wrappers (`{engine}-{version}/...`)
/// to the effective archive root.
fn effective_root(stage: &Path) -> Result<PathBuf> {
    let mut root = stage.to_path_buf();
    for _ in 0..3 {
        let entries: Vec<_> = std::fs::read_dir(&root)
            .with_context(|| format!("failed to read {}", root.display()))?
            .collect::<std::io::Result<Vec<_>>>()?;
        let dirs: Vec<_> = entries
            .iter()
            .filter(|e| e.path().is_dir())
            .collect();
        let files = entries.iter().filter(|e| e.path().is_file()).count();
        if files == 0 && dirs.len() == 1 {
            root = dirs[0].path();
        } else {
            break;
        }
    }
    Ok(root)
}

/// Reshape the extracted tree at `stage` into `bin_path`.
///
/// On return, `bin_path/bin/` contains the executables (Standard), or the
/// shipped tree sits under `bin_path` untouched (PreserveTree).
pub fn normalize_layout(
    stage: &Path,
    bin_path: &Path,
    engine: Engine,
) -> Result<()> {
    let root = effective_root(stage)?;
    std::fs::create_dir_all(bin_path)
        .with_context(|| format!("failed to create {}", bin_path.display()))?;

    match rule_for(engine) {
        LayoutRule::PreserveTree => move_tree(&root, bin_path),
        LayoutRule::Standard => {
            if root.join("bin").is_dir() {
                // Shape 1: already canonical; adopt the whole tree so
                // libraries and share/ stay next to bin/.
                move_tree(&root, bin_path)
            } else {
                normalize_flat(&root, bin_path)
            }
        }
    }
}

/// Shape 2: classify entries and move executables into a synthesized
/// `bin/`, leaving metadata (and support directories) at the top.
fn normalize_flat(root: &Path, bin_path: &Path) -> Result<()> {
    let bin_dir = bin_path.join("bin");
    std::fs::create_dir_all(&bin_dir)?;

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let target = if entry.path().is_file() && is_executable_name(&name) {
            bin_dir.join(&name)
        } else {
            bin_path.join(&name)
        };
        move_entry(&entry.path(), &target)?;
    }
    Ok(())
}

fn move_tree(root: &Path, dest: &Path) -> Result<()> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        move_entry(&entry.path(), &dest.join(entry.file_name()))?;
    }
    Ok(())
}

/// Rename, falling back to copy when the stage sits on another
/// filesystem.
fn move_entry(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if from.is_dir() {
        crate::fsutil::copy_dir_all(from, to)?;
        std::fs::remove_dir_all(from)?;
    } else if from.is_file() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    } else {
        bail!("cannot move {}", from.display());
    }
    Ok(())
}

/// Mark everything under `bin/` (and a PreserveTree root) executable.
/// No-op on Windows.
pub fn chmod_binaries(bin_path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut roots = vec![bin_path.join("bin")];
        roots.push(bin_path.to_path_buf());
        for root in roots {
            let Ok(entries) = std::fs::read_dir(&root) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if is_executable_name(&name) {
                        std::fs::set_permissions(
                            &path,
                            std::fs::Permissions::from_mode(0o755),
                        )?;
                    }
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = bin_path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn bin_subdir_shape_is_adopted_whole() {
        let dir = tempfile::tempdir().unwrap();
        let stage = dir.path().join("stage");
        touch(&stage.join("postgresql-17.5/bin/postgres"));
        touch(&stage.join("postgresql-17.5/bin/psql"));
        touch(&stage.join("postgresql-17.5/share/postgres.bki"));

        let bin_path = dir.path().join("out");
        normalize_layout(&stage, &bin_path, Engine::PostgreSql).unwrap();
        assert!(bin_path.join("bin/postgres").exists());
        assert!(bin_path.join("bin/psql").exists());
        assert!(bin_path.join("share/postgres.bki").exists());
    }

    #[test]
    fn flat_shape_synthesizes_bin() {
        let dir = tempfile::tempdir().unwrap();
        let stage = dir.path().join("stage");
        touch(&stage.join("duckdb"));
        touch(&stage.join("README.md"));
        touch(&stage.join("LICENSE"));

        let bin_path = dir.path().join("out");
        normalize_layout(&stage, &bin_path, Engine::DuckDb).unwrap();
        assert!(bin_path.join("bin/duckdb").exists());
        assert!(bin_path.join("README.md").exists());
        assert!(bin_path.join("LICENSE").exists());
        assert!(!bin_path.join("bin/README.md").exists());
    }

    #[test]
    fn preserve_tree_keeps_runtime_layout() {
        let dir = tempfile::tempdir().unwrap();
        let stage = dir.path().join("stage");
        touch(&stage.join("questdb-8.3.1/bin/questdb.sh"));
        touch(&stage.join("questdb-8.3.1/bin/questdb.jar"));
        touch(&stage.join("questdb-8.3.1/jre/bin/java"));

        let bin_path = dir.path().join("out");
        normalize_layout(&stage, &bin_path, Engine::QuestDb).unwrap();
        assert!(bin_path.join("bin/questdb.sh").exists());
        assert!(bin_path.join("jre/bin/java").exists());
    }

    #[test]
    fn executable_classification() {
        assert!(is_executable_name("redis-server"));
        assert!(is_executable_name("questdb.sh"));
        assert!(is_executable_name("mysqld.exe"));
        assert!(!is_executable_name("README.md"));
        assert!(!is_executable_name("LICENSE"));
        assert!(!is_executable_name("redis.conf"));
    }
}
