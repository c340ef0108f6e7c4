use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpinError;

/// Operating systems the binary registry publishes artifacts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Darwin,
    Linux,
    Win32,
}

impl Platform {
    /// Detect the platform SpinDB is running on.
    pub const fn current() -> Platform {
        if cfg!(target_os = "macos") {
            Platform::Darwin
        } else if cfg!(windows) {
            Platform::Win32
        } else {
            Platform::Linux
        }
    }

    pub const fn id(self) -> &'static str {
        match self {
            Platform::Darwin => "darwin",
            Platform::Linux => "linux",
            Platform::Win32 => "win32",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Platform {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "darwin" => Ok(Platform::Darwin),
            "linux" => Ok(Platform::Linux),
            "win32" => Ok(Platform::Win32),
            other => Err(SpinError::UnknownPlatform {
                platform: other.to_string(),
            }),
        }
    }
}

/// CPU architectures the binary registry publishes artifacts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
}

impl Arch {
    pub const fn current() -> Arch {
        if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            Arch::X64
        }
    }

    pub const fn id(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Arch {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x64" => Ok(Arch::X64),
            "arm64" => Ok(Arch::Arm64),
            other => Err(SpinError::UnknownPlatform {
                platform: other.to_string(),
            }),
        }
    }
}

/// Suffix appended to executable names: empty on Unix, `.exe` on Windows.
pub const fn executable_extension(platform: Platform) -> &'static str {
    match platform {
        Platform::Win32 => ".exe",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_ids_round_trip() {
        for p in [Platform::Darwin, Platform::Linux, Platform::Win32] {
            assert_eq!(p.id().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn arch_ids_round_trip() {
        for a in [Arch::X64, Arch::Arm64] {
            assert_eq!(a.id().parse::<Arch>().unwrap(), a);
        }
    }

    #[test]
    fn exe_extension_is_windows_only() {
        assert_eq!(executable_extension(Platform::Win32), ".exe");
        assert_eq!(executable_extension(Platform::Linux), "");
        assert_eq!(executable_extension(Platform::Darwin), "");
    }
}
