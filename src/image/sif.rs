//! SIF image format.
//!
//! The payload of a SIF image is its primary system partition.

use std::fs::Metadata;

use super::{FormatKind, Image, ImageFormat};
use crate::error::{Error, Result};
use crate::sif::layout::has_magic;
use crate::sif::SifFile;

/// Registry entry for SIF containers.
pub struct SifFormat;

impl ImageFormat for SifFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Sif
    }

    fn detect(&self, window: &[u8]) -> bool {
        has_magic(window)
    }

    fn open_writable(&self, requested: bool) -> bool {
        requested
    }

    fn initialize(&self, image: &mut Image, meta: &Metadata) -> Result<()> {
        if meta.is_dir() {
            return Err(Error::NotAFile {
                path: image.path.clone(),
            });
        }

        let sif = SifFile::parse(&mut image.file(), &image.path)?;
        let part = sif
            .primary_partition()
            .ok_or_else(|| Error::corrupt(&image.path, "sif", "no primary system partition"))?;

        image.offset = part.fileoff as u64;
        image.size = part.filelen as u64;
        Ok(())
    }
}
