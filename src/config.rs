//! Build configuration.
//!
//! Settings come from an optional TOML file; everything has a default so a
//! missing file is not an error. Privilege-elevation hints are read from the
//! environment into [`ElevationHints`] so callers can inject them in tests.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default packing tool.
pub const DEFAULT_PACKER: &str = "mksquashfs";

/// Program name expected in the elevation command before ownership is fixed.
pub const DEFAULT_OWNER_PROGRAM: &str = "sif-builder";

/// Config file name under the user config directory.
pub const CONFIG_FILE: &str = "sif-builder/config.toml";

/// Options passed to the squashfs packer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackerConfig {
    /// Tool looked up on PATH.
    pub program: String,

    /// Compression algorithm (gzip, zstd, xz, lzo, lz4).
    ///
    /// `None` leaves the choice to the tool.
    pub compression: Option<String>,

    /// Block size (e.g., "128K", "1M").
    pub block_size: Option<String>,

    /// Whether to include extended attributes.
    pub xattrs: bool,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PACKER.to_string(),
            compression: None,
            block_size: None,
            xattrs: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OwnershipConfig {
    /// Substring that must appear in the elevation command.
    pub program: String,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_OWNER_PROGRAM.to_string(),
        }
    }
}

/// Top-level build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub packer: PackerConfig,
    pub ownership: OwnershipConfig,
}

impl BuildConfig {
    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(path, &raw)
    }

    fn from_toml(path: &Path, raw: &str) -> Result<Self> {
        let config: BuildConfig = toml::from_str(raw).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if config.packer.program.trim().is_empty() {
            return Err(Error::Config {
                path: path.to_path_buf(),
                reason: "packer.program must not be empty".into(),
            });
        }
        Ok(config)
    }

    /// Load from an explicit path, else the user config file, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// `$XDG_CONFIG_HOME/sif-builder/config.toml` or platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Hints left by a privilege-elevation wrapper (sudo).
///
/// All fields are optional; absence is never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElevationHints {
    /// Command line that was elevated (`SUDO_COMMAND`).
    pub command: Option<String>,
    /// Original user name (`SUDO_USER`).
    pub user: Option<String>,
    /// Original numeric user id (`SUDO_UID`).
    pub uid: Option<String>,
    /// Original numeric group id (`SUDO_GID`).
    pub gid: Option<String>,
}

impl ElevationHints {
    pub fn from_env() -> Self {
        Self {
            command: non_empty_var("SUDO_COMMAND"),
            user: non_empty_var("SUDO_USER"),
            uid: non_empty_var("SUDO_UID"),
            gid: non_empty_var("SUDO_GID"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
