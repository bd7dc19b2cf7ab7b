//! Squashfs image format.
//!
//! A squashfs image is always the whole of its file here, so the payload
//! spans offset 0 to the file size. Squashfs is immutable: it is always
//! opened read-only whatever mode the caller asks for.

use std::fs::Metadata;
use std::os::unix::fs::FileExt;

use super::{FormatKind, Image, ImageFormat};
use crate::error::{Error, Result};

/// `hsqs` read as a little-endian u32.
pub const SQUASHFS_MAGIC: u32 = 0x7371_7368;

/// On-disk superblock size.
pub const SUPERBLOCK_SIZE: usize = 96;

/// Only squashfs 4.x is produced by current tools.
pub const SUPPORTED_MAJOR: u16 = 4;

const SB_MAJOR: usize = 28;
const SB_BYTES_USED: usize = 40;

/// Registry entry for squashfs.
pub struct SquashfsFormat;

impl ImageFormat for SquashfsFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Squashfs
    }

    fn detect(&self, window: &[u8]) -> bool {
        has_magic(window)
    }

    fn open_writable(&self, _requested: bool) -> bool {
        false
    }

    fn initialize(&self, image: &mut Image, meta: &Metadata) -> Result<()> {
        if meta.is_dir() {
            return Err(Error::NotAFile {
                path: image.path.clone(),
            });
        }

        let file_len = meta.len();
        if file_len < SUPERBLOCK_SIZE as u64 {
            return Err(Error::corrupt(
                &image.path,
                "squashfs",
                format!("file is {file_len} bytes, shorter than the superblock"),
            ));
        }

        let mut sb = [0u8; SUPERBLOCK_SIZE];
        image
            .file()
            .read_exact_at(&mut sb, 0)
            .map_err(|e| Error::io(&image.path, e))?;

        if !has_magic(&sb) {
            return Err(Error::corrupt(&image.path, "squashfs", "bad superblock magic"));
        }

        let major = u16::from_le_bytes([sb[SB_MAJOR], sb[SB_MAJOR + 1]]);
        if major != SUPPORTED_MAJOR {
            return Err(Error::corrupt(
                &image.path,
                "squashfs",
                format!("unsupported version {major}"),
            ));
        }

        let mut used = [0u8; 8];
        used.copy_from_slice(&sb[SB_BYTES_USED..SB_BYTES_USED + 8]);
        let bytes_used = u64::from_le_bytes(used);
        if bytes_used > file_len {
            return Err(Error::corrupt(
                &image.path,
                "squashfs",
                format!("superblock declares {bytes_used} bytes but file holds {file_len}"),
            ));
        }

        image.offset = 0;
        image.size = file_len;
        Ok(())
    }
}

fn has_magic(window: &[u8]) -> bool {
    window
        .get(..4)
        .map(|m| u32::from_le_bytes([m[0], m[1], m[2], m[3]]) == SQUASHFS_MAGIC)
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::image::{self, open};
    use crate::preflight;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A minimal squashfs 4.0 superblock padded to `len` bytes.
    pub(crate) fn superblock_image(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len.max(SUPERBLOCK_SIZE)];
        data[0..4].copy_from_slice(&SQUASHFS_MAGIC.to_le_bytes());
        data[SB_MAJOR..SB_MAJOR + 2].copy_from_slice(&SUPPORTED_MAJOR.to_le_bytes());
        data[SB_BYTES_USED..SB_BYTES_USED + 8].copy_from_slice(&(len as u64).to_le_bytes());
        data
    }

    /// Real squashfs built with mksquashfs, or `None` when it is not installed.
    fn mksquashfs_image(dir: &Path) -> Option<PathBuf> {
        if !preflight::command_exists("mksquashfs") {
            eprintln!("mksquashfs is not available, skipping");
            return None;
        }
        let root = dir.join("root");
        fs::create_dir_all(&root).unwrap();
        let output = dir.join("real.sqfs");
        crate::process::Cmd::new("mksquashfs")
            .arg_path(&root)
            .arg_path(&output)
            .arg("-noappend")
            .run()
            .unwrap();
        Some(output)
    }

    #[test]
    fn test_detect() {
        let format = SquashfsFormat;
        assert!(format.detect(&superblock_image(4096)));
        assert!(!format.detect(b"sqsh"));
        assert!(!format.detect(b"hs"));
        assert!(!format.detect(&[]));
    }

    #[test]
    fn test_open_mode_always_read_only() {
        let format = SquashfsFormat;
        assert!(!format.open_writable(true));
        assert!(!format.open_writable(false));
    }

    #[test]
    fn test_open_downgrades_writable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rootfs.sqfs");
        fs::write(&path, superblock_image(4096)).unwrap();

        for requested in [true, false] {
            let img = open(&path, requested).unwrap();
            assert_eq!(img.format, image::FormatKind::Squashfs);
            assert!(!img.writable);
            assert_eq!(img.offset, 0);
            assert_eq!(img.size, 4096);
        }
    }

    #[test]
    fn test_truncated_superblock_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("short.sqfs");
        fs::write(&path, &superblock_image(SUPERBLOCK_SIZE)[..40]).unwrap();

        assert!(matches!(
            open(&path, false),
            Err(Error::CorruptFormat { format: "squashfs", .. })
        ));
    }

    #[test]
    fn test_bytes_used_past_eof_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cut.sqfs");
        let data = superblock_image(8192);
        fs::write(&path, &data[..1024]).unwrap();

        let err = open(&path, false).unwrap_err();
        assert!(err.to_string().contains("declares 8192 bytes"));
    }

    #[test]
    fn test_wrong_version_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("v3.sqfs");
        let mut data = superblock_image(4096);
        data[SB_MAJOR] = 3;
        fs::write(&path, data).unwrap();

        assert!(matches!(open(&path, false), Err(Error::CorruptFormat { .. })));
    }

    #[test]
    fn test_initializer_rejects_directory() {
        let temp = TempDir::new().unwrap();
        let file = fs::File::open(temp.path()).unwrap();
        let meta = file.metadata().unwrap();
        let mut img = Image {
            path: temp.path().to_path_buf(),
            name: "dir".into(),
            format: image::FormatKind::Squashfs,
            writable: false,
            offset: 0,
            size: 0,
            file,
        };

        let result = SquashfsFormat.initialize(&mut img, &meta);
        assert!(matches!(result, Err(Error::NotAFile { .. })));
    }

    #[test]
    fn test_real_image() {
        let temp = TempDir::new().unwrap();
        let Some(path) = mksquashfs_image(temp.path()) else {
            return;
        };

        let img = open(&path, true).unwrap();
        assert_eq!(img.format, image::FormatKind::Squashfs);
        assert!(!img.writable);
        assert_eq!(img.size, fs::metadata(&path).unwrap().len());
    }
}
