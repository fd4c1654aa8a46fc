use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::RemeshError;

/// Subdirectory of the install directory holding the remesher binaries
pub const BIN_DIR: &str = "bin";

/// Prefix of the CUDA build of each binary
pub const ACCELERATED_PREFIX: &str = "cuda_";

/// Operating system families the remesher ships binaries for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
}

impl Platform {
    /// Base binary name for this platform, without the acceleration prefix
    pub fn executable_name(&self) -> &'static str {
        match self {
            Platform::Linux => "quadriflow",
            Platform::MacOS => "quadriflow_osx",
            Platform::Windows => "quadriflow.exe",
        }
    }
}

impl FromStr for Platform {
    type Err = RemeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" => Ok(Platform::MacOS),
            "windows" | "win32" => Ok(Platform::Windows),
            _ => Err(RemeshError::UnsupportedPlatform(s.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Linux => "linux",
            Platform::MacOS => "macos",
            Platform::Windows => "windows",
        };
        f.write_str(name)
    }
}

/// A resolved remesher binary: where it should be and which build it is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableDescriptor {
    pub path: PathBuf,
    pub platform: Platform,
    pub accelerated: bool,
}

impl ExecutableDescriptor {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Maps platform and acceleration preference to a binary under `<install_dir>/bin`.
///
/// The install directory is configuration handed in at startup. Resolution
/// never touches the filesystem; whether the binary is really there is
/// checked when the run is about to launch it.
#[derive(Debug, Clone)]
pub struct ExecutableResolver {
    install_dir: PathBuf,
}

impl ExecutableResolver {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn resolve(&self, platform: Platform, use_acceleration: bool) -> ExecutableDescriptor {
        let base = platform.executable_name();
        let name = if use_acceleration {
            format!("{}{}", ACCELERATED_PREFIX, base)
        } else {
            base.to_string()
        };

        ExecutableDescriptor {
            path: self.install_dir.join(BIN_DIR).join(name),
            platform,
            accelerated: use_acceleration,
        }
    }
}
