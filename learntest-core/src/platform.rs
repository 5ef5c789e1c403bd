//! Comparison Platforms
//!
//! Reference results are stored per platform because floating point output
//! and some text layouts differ between compilers and operating systems.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of platforms that may own a reference result tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Linux with GCC
    LinuxGcc,
    /// Windows with MSVC
    WindowsMsvc,
    /// macOS with Clang
    MacosClang,
}

impl Platform {
    /// All supported platforms, in reference lookup order
    pub const ALL: [Platform; 3] = [
        Platform::LinuxGcc,
        Platform::WindowsMsvc,
        Platform::MacosClang,
    ];

    /// Platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::WindowsMsvc
        } else if cfg!(target_os = "macos") {
            Platform::MacosClang
        } else {
            Platform::LinuxGcc
        }
    }

    /// Stable identifier used in settings and reference directory names
    pub fn id(self) -> &'static str {
        match self {
            Platform::LinuxGcc => "linux-gcc",
            Platform::WindowsMsvc => "windows-msvc",
            Platform::MacosClang => "macos-clang",
        }
    }

    /// Comma separated list of accepted identifiers, for diagnostics
    pub fn supported_ids() -> String {
        Self::ALL
            .iter()
            .map(|p| p.id())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Operating system names are what older corpora used for their trees
        match s.trim().to_lowercase().as_str() {
            "linux-gcc" | "linux" => Ok(Platform::LinuxGcc),
            "windows-msvc" | "windows" => Ok(Platform::WindowsMsvc),
            "macos-clang" | "macos" | "darwin" => Ok(Platform::MacosClang),
            other => Err(format!(
                "unknown platform '{}' (expected one of: {})",
                other,
                Platform::supported_ids()
            )),
        }
    }
}
