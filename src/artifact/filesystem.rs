//! Filesystem helpers for staging a root filesystem into a bundle.

use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;

use crate::error::{Error, Result};

const STAGED_DIR_OWNER_WRITE: u32 = 0o200;

/// Recursively copy `src` into `dst`, preserving symlinks and modes.
///
/// Symlinks are recreated as links, never followed, so a rootfs with
/// absolute links (`/bin -> usr/bin`) copies as-is. Directory modes are
/// applied after their contents and always keep owner write, so the staged
/// copy can be removed by the user who made it.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let src_meta = fs::symlink_metadata(src).map_err(|e| Error::io(src, e))?;
    if !src_meta.is_dir() {
        return Err(Error::NotAFile {
            path: src.to_path_buf(),
        });
    }

    fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;

    for entry in fs::read_dir(src).map_err(|e| Error::io(src, e))? {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let kind = entry.file_type().map_err(|e| Error::io(&from, e))?;

        if kind.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| Error::io(&from, e))?;
            if fs::symlink_metadata(&to).is_ok() {
                fs::remove_file(&to).map_err(|e| Error::io(&to, e))?;
            }
            symlink(&target, &to).map_err(|e| Error::io(&to, e))?;
        } else if kind.is_dir() {
            copy_tree(&from, &to)?;
        } else if kind.is_file() {
            fs::copy(&from, &to).map_err(|e| Error::io(&from, e))?;
        } else {
            // Device nodes, sockets and fifos need privileges to recreate.
            tracing::warn!(path = %from.display(), "skipping special file");
        }
    }

    let mode = src_meta.permissions().mode() | STAGED_DIR_OWNER_WRITE;
    fs::set_permissions(dst, fs::Permissions::from_mode(mode)).map_err(|e| Error::io(dst, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");

        fs::create_dir_all(src.join("usr/bin")).unwrap();
        fs::write(src.join("usr/bin/hello"), "#!/bin/sh\necho hello\n").unwrap();
        fs::set_permissions(src.join("usr/bin/hello"), fs::Permissions::from_mode(0o755)).unwrap();
        symlink("usr/bin", src.join("bin")).unwrap();
        symlink("/etc/does-not-exist", src.join("dangling")).unwrap();

        copy_tree(&src, &dst).unwrap();

        assert_eq!(
            fs::read_to_string(dst.join("usr/bin/hello")).unwrap(),
            "#!/bin/sh\necho hello\n"
        );
        let mode = fs::metadata(dst.join("usr/bin/hello")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(dst.join("bin").is_symlink());
        assert_eq!(fs::read_link(dst.join("bin")).unwrap(), Path::new("usr/bin"));
        assert!(dst.join("dangling").is_symlink());
    }

    #[test]
    fn test_read_only_directory_stays_removable() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");

        fs::create_dir_all(src.join("usr/share")).unwrap();
        fs::write(src.join("usr/share/doc"), "x").unwrap();
        fs::set_permissions(src.join("usr"), fs::Permissions::from_mode(0o555)).unwrap();

        copy_tree(&src, &dst).unwrap();

        let mode = fs::metadata(dst.join("usr")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        fs::remove_dir_all(&dst).unwrap();
        assert!(!dst.exists());

        fs::set_permissions(src.join("usr"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_copy_tree_rejects_file_source() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();

        let result = copy_tree(&file, &temp.path().join("dst"));
        assert!(matches!(result, Err(Error::NotAFile { .. })));
    }

    #[test]
    fn test_copy_tree_missing_source() {
        let temp = TempDir::new().unwrap();
        let result = copy_tree(&temp.path().join("missing"), &temp.path().join("dst"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
