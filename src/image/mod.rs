//! Opening image files through a registry of recognized formats.
//!
//! Opening a path walks through these steps:
//!
//! ```text
//! stat ──(not a regular file)──────────────────────────> NotAFile
//!   │
//! read HEADER_WINDOW bytes
//!   │
//! detect (REGISTRY order) ──(no match)─────────────────> UnrecognizedFormat
//!   │
//! initialize (payload offset/size) ──(inconsistent)────> CorruptFormat
//!   │
//! apply access policy ──> Image
//! ```
//!
//! Nothing format-specific is trusted before detection succeeds, and no
//! [`Image`] is returned when any step fails.

pub mod sif;
pub mod squashfs;

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// Bytes read from the start of a file for detection. Covers the largest
/// magic field among registered formats.
pub const HEADER_WINDOW: usize = 2048;

/// Formats known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Sif,
    Squashfs,
}

impl FormatKind {
    pub fn name(&self) -> &'static str {
        match self {
            FormatKind::Sif => "sif",
            FormatKind::Squashfs => "squashfs",
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities every registered image format provides.
pub trait ImageFormat: Sync {
    fn kind(&self) -> FormatKind;

    /// Whether `window` (the first bytes of the file) carries this format's magic.
    fn detect(&self, window: &[u8]) -> bool;

    /// Effective writability for a requested mode.
    fn open_writable(&self, requested: bool) -> bool;

    /// Fill in the payload offset and size of a detected image.
    fn initialize(&self, image: &mut Image, meta: &Metadata) -> Result<()>;
}

/// Registered formats in detection priority order.
pub static REGISTRY: &[&dyn ImageFormat] = &[&sif::SifFormat, &squashfs::SquashfsFormat];

/// First registered format whose detector matches `window`.
pub fn identify(window: &[u8]) -> Option<&'static dyn ImageFormat> {
    REGISTRY.iter().copied().find(|format| format.detect(window))
}

/// An opened image. The file closes when the handle drops.
#[derive(Debug)]
pub struct Image {
    pub path: PathBuf,
    pub name: String,
    pub format: FormatKind,
    /// Effective mode after the format's access policy.
    pub writable: bool,
    /// Start of the filesystem payload within the file.
    pub offset: u64,
    /// Length of the filesystem payload.
    pub size: u64,
    file: File,
}

impl Image {
    pub fn file(&self) -> &File {
        &self.file
    }
}

/// Open `path` as an image, identifying its format first.
///
/// `writable` is a request: formats may downgrade it (squashfs always opens
/// read-only).
pub fn open(path: &Path, writable: bool) -> Result<Image> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if !meta.is_file() {
        return Err(Error::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let window = read_window(&file).map_err(|e| Error::io(path, e))?;

    let format = identify(&window).ok_or_else(|| Error::UnrecognizedFormat {
        path: path.to_path_buf(),
    })?;
    tracing::debug!(path = %path.display(), format = %format.kind(), "image format detected");

    let mut image = Image {
        path: path.to_path_buf(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        format: format.kind(),
        writable: false,
        offset: 0,
        size: 0,
        file,
    };
    format.initialize(&mut image, &meta)?;

    if format.open_writable(writable) {
        image.file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        image.writable = true;
    } else if writable {
        tracing::debug!(path = %path.display(), format = %image.format, "opening read-only");
    }

    Ok(image)
}

/// Read up to [`HEADER_WINDOW`] bytes from the start of `file`.
fn read_window(file: &File) -> std::io::Result<Vec<u8>> {
    let mut window = Vec::with_capacity(HEADER_WINDOW);
    file.take(HEADER_WINDOW as u64).read_to_end(&mut window)?;
    Ok(window)
}
