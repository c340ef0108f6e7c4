use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::platform::{Arch, Platform};

/// A verified, on-disk set of executables for one
/// `(engine, version, platform, arch)` tuple.
///
/// Many containers may share one installed binary; deletion is only
/// permitted once no container references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledBinary {
    pub engine: Engine,
    pub version: String,
    pub platform: Platform,
    pub arch: Arch,
}

impl InstalledBinary {
    /// Directory name under `~/.spindb/bin/` hosting this binary.
    pub fn dir_name(&self) -> String {
        bin_dir_name(self.engine, &self.version, self.platform, self.arch)
    }

    /// Parse a bin directory name of the form
    /// `{engine}-{version}-{platform}-{arch}`. Returns `None` for
    /// directories that do not match (foreign entries are skipped, not
    /// errors).
    pub fn parse_dir_name(name: &str) -> Option<InstalledBinary> {
        let (engine_id, rest) = name.split_once('-')?;
        let engine: Engine = engine_id.parse().ok()?;
        // Version may itself contain dots but never hyphens; platform and
        // arch are the last two hyphenated segments.
        let (rest, arch_id) = rest.rsplit_once('-')?;
        let (version, platform_id) = rest.rsplit_once('-')?;
        let platform: Platform = platform_id.parse().ok()?;
        let arch: Arch = arch_id.parse().ok()?;
        if version.is_empty() {
            return None;
        }
        Some(InstalledBinary {
            engine,
            version: version.to_string(),
            platform,
            arch,
        })
    }
}

impl Display for InstalledBinary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// Canonical bin directory name for a binary tuple.
pub fn bin_dir_name(
    engine: Engine,
    version: &str,
    platform: Platform,
    arch: Arch,
) -> String {
    format!("{engine}-{version}-{platform}-{arch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_name_round_trips() {
        let bin = InstalledBinary {
            engine: Engine::PostgreSql,
            version: "17.5".to_string(),
            platform: Platform::Linux,
            arch: Arch::X64,
        };
        let name = bin.dir_name();
        assert_eq!(name, "postgresql-17.5-linux-x64");
        assert_eq!(InstalledBinary::parse_dir_name(&name).unwrap(), bin);
    }

    #[test]
    fn date_style_versions_parse() {
        let parsed =
            InstalledBinary::parse_dir_name("clickhouse-25.5.2.47-darwin-arm64")
                .unwrap();
        assert_eq!(parsed.engine, Engine::ClickHouse);
        assert_eq!(parsed.version, "25.5.2.47");
        assert_eq!(parsed.platform, Platform::Darwin);
        assert_eq!(parsed.arch, Arch::Arm64);
    }

    #[test]
    fn foreign_directories_are_skipped() {
        assert!(InstalledBinary::parse_dir_name("not-a-binary").is_none());
        assert!(InstalledBinary::parse_dir_name("tmp").is_none());
        assert!(InstalledBinary::parse_dir_name("postgresql-17.5-linux").is_none());
        assert!(InstalledBinary::parse_dir_name("oracle-19-linux-x64").is_none());
    }
}
