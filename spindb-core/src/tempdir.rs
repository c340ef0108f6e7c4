//! Operation-scoped temp paths under the OS temp directory.
//!
//! Names are uuid-suffixed so concurrent operations never collide; the
//! operation that creates a path owns its cleanup on both success and
//! rollback.

use std::path::PathBuf;

/// A unique file path like `$TMPDIR/spindb-{kind}-{uuid}.{ext}`. Nothing
/// is created on disk.
pub fn temp_file(kind: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "spindb-{kind}-{}.{ext}",
        uuid::Uuid::new_v4().simple()
    ))
}

/// A unique directory path; the caller creates and removes it.
pub fn temp_dir(kind: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "spindb-{kind}-{}",
        uuid::Uuid::new_v4().simple()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_unique_and_namespaced() {
        let a = temp_file("pull", "dump");
        let b = temp_file("pull", "dump");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("spindb-pull-"));
        assert!(a.extension().unwrap() == "dump");
        assert!(temp_dir("export") != temp_dir("export"));
    }
}
