//! Build bundle: the private working area of one build.
//!
//! A bundle owns a temporary directory holding the staged root filesystem
//! (`<bundle>/rootfs`) and any intermediate payloads. The directory and
//! everything left in it are removed when the bundle drops.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::artifact::filesystem::copy_tree;
use crate::error::{Error, Result};

const ROOTFS_DIR: &str = "rootfs";

/// Working area for a single container build.
pub struct Bundle {
    dir: TempDir,
    /// Definition file text stored in the container.
    pub recipe: String,
}

impl Bundle {
    /// Create a bundle under the system temp directory.
    pub fn new(recipe: impl Into<String>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sif-bundle-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        Self::with_dir(dir, recipe.into())
    }

    /// Create a bundle under `parent`.
    pub fn new_in(parent: &Path, recipe: impl Into<String>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sif-bundle-")
            .tempdir_in(parent)
            .map_err(|e| Error::io(parent, e))?;
        Self::with_dir(dir, recipe.into())
    }

    fn with_dir(dir: TempDir, recipe: String) -> Result<Self> {
        let rootfs = dir.path().join(ROOTFS_DIR);
        fs::create_dir(&rootfs).map_err(|e| Error::io(&rootfs, e))?;
        Ok(Self { dir, recipe })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Staged root filesystem. Consumed by packing.
    pub fn rootfs(&self) -> PathBuf {
        self.dir.path().join(ROOTFS_DIR)
    }

    /// Copy `src` into the staged root.
    pub fn stage_rootfs(&self, src: &Path) -> Result<()> {
        tracing::info!(src = %src.display(), "staging root filesystem");
        copy_tree(src, &self.rootfs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_rootfs() {
        let parent = TempDir::new().unwrap();
        let bundle = Bundle::new_in(parent.path(), "Bootstrap: scratch\n").unwrap();

        assert!(bundle.rootfs().is_dir());
        assert!(bundle.path().starts_with(parent.path()));
        assert_eq!(bundle.recipe, "Bootstrap: scratch\n");
    }

    #[test]
    fn test_drop_removes_bundle() {
        let parent = TempDir::new().unwrap();
        let path = {
            let bundle = Bundle::new_in(parent.path(), "").unwrap();
            bundle.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_stage_rootfs() {
        let parent = TempDir::new().unwrap();
        let src = parent.path().join("src");
        fs::create_dir_all(src.join("etc")).unwrap();
        fs::write(src.join("etc/hostname"), "container\n").unwrap();

        let bundle = Bundle::new_in(parent.path(), "").unwrap();
        bundle.stage_rootfs(&src).unwrap();

        assert_eq!(
            fs::read_to_string(bundle.rootfs().join("etc/hostname")).unwrap(),
            "container\n"
        );
        assert!(src.join("etc/hostname").exists());
    }
}
