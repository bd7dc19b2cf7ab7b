//! Error types for building and opening images.

use std::path::PathBuf;

use crate::process::CmdError;

/// Result type alias for image build and inspection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or opening an image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Build Errors
    // =========================================================================
    /// The filesystem packing tool is not on PATH.
    #[error("{tool} is not installed on this system (install: {package})")]
    ToolNotFound { tool: String, package: String },

    /// The packing tool ran but did not produce a payload.
    #[error("failed to pack {root} into a squashfs payload")]
    PackingFailed {
        root: PathBuf,
        #[source]
        source: CmdError,
    },

    /// A partition payload file could not be opened or stat-ed.
    #[error("partition payload {path} is unavailable")]
    PayloadUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the container failed partway.
    #[error("failed to write container {path}")]
    AssemblyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Changing the artifact owner failed. Never returned by a build, only logged.
    #[error("failed to change owner of {path} to {uid}:{gid}")]
    OwnershipAdjustFailed {
        path: PathBuf,
        uid: u32,
        gid: u32,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Format Errors
    // =========================================================================
    /// No registered format matched the file header.
    #[error("{path}: image format not recognized")]
    UnrecognizedFormat { path: PathBuf },

    /// The file claims to be a known format but is structurally broken.
    #[error("{path}: corrupt {format} image: {reason}")]
    CorruptFormat {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    /// A directory (or other non-regular file) was given as an image path.
    #[error("{path} is not a regular file")]
    NotAFile { path: PathBuf },

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// I/O error outside of the assembly path (opening, reading headers).
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration file.
    #[error("invalid configuration {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(
        path: impl Into<PathBuf>,
        format: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Error::CorruptFormat {
            path: path.into(),
            format,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_mentions_package() {
        let err = Error::ToolNotFound {
            tool: "mksquashfs".into(),
            package: "squashfs-tools".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mksquashfs"));
        assert!(msg.contains("squashfs-tools"));
    }

    #[test]
    fn test_corrupt_format_distinct_from_unrecognized() {
        let corrupt = Error::corrupt("/tmp/x.img", "squashfs", "truncated superblock");
        let unknown = Error::UnrecognizedFormat {
            path: "/tmp/x.img".into(),
        };
        assert!(corrupt.to_string().contains("corrupt squashfs"));
        assert!(unknown.to_string().contains("not recognized"));
    }
}
