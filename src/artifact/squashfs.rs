//! Squashfs partition packer.
//!
//! Wraps `mksquashfs` to turn a staged root directory into the raw payload
//! of a SIF partition.
//!
//! # Example
//!
//! ```rust,ignore
//! use sif_builder::artifact::squashfs::pack;
//! use sif_builder::config::PackerConfig;
//! use std::path::Path;
//!
//! let payload = pack(
//!     Path::new("bundle/rootfs"),
//!     Path::new("bundle"),
//!     &PackerConfig::default(),
//! )?;
//! // payload is deleted when dropped
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use tempfile::TempPath;

use crate::config::PackerConfig;
use crate::error::{Error, Result};
use crate::preflight;
use crate::process::{self, Cmd};

/// Removes the staged root when packing ends, on every exit path.
struct StagedRoot<'a>(&'a Path);

impl Drop for StagedRoot<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(root = %self.0.display(), error = %e, "failed to remove staged root");
            }
        }
    }
}

/// Pack `root` into a squashfs payload allocated under `work_dir`.
///
/// The staged root is removed once packing finishes, successfully or not.
/// The returned [`TempPath`] deletes the payload when dropped, so the caller
/// keeps it alive only until the container has been written.
///
/// # Errors
///
/// * [`Error::ToolNotFound`] - the packer is not on PATH
/// * [`Error::PackingFailed`] - the packer could not run or exited non-zero
pub fn pack(root: &Path, work_dir: &Path, options: &PackerConfig) -> Result<TempPath> {
    let _staged = StagedRoot(root);

    let packer = which::which(&options.program).map_err(|_| {
        tracing::error!("{} is not installed on this system", options.program);
        Error::ToolNotFound {
            tool: options.program.clone(),
            package: preflight::package_for(&options.program).to_string(),
        }
    })?;

    let payload = allocate_payload_path(work_dir)?;
    let args = packer_args(root, &payload, options, process::effective_uid());

    tracing::info!(root = %root.display(), "creating squashfs partition");
    Cmd::new(&packer)
        .args(&args)
        .error_msg(format!("{} failed", options.program))
        .run()
        .map_err(|source| Error::PackingFailed {
            root: root.to_path_buf(),
            source,
        })?;

    if let Ok(meta) = fs::metadata(&payload) {
        tracing::info!(size = meta.len(), "squashfs partition created");
    }

    Ok(payload)
}

/// Reserve a unique `squashfs-*.img` path and make sure nothing occupies it.
fn allocate_payload_path(work_dir: &Path) -> Result<TempPath> {
    let path = tempfile::Builder::new()
        .prefix("squashfs-")
        .suffix(".img")
        .tempfile_in(work_dir)
        .map_err(|e| Error::io(work_dir, e))?
        .into_temp_path();

    // mksquashfs must create the file itself.
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(path.to_path_buf(), e)),
    }
    Ok(path)
}

/// Arguments for `<packer> <root> <output> -noappend [-all-root]`.
///
/// `-all-root` is added for non-root builders so files inside the image are
/// owned by root, as they would be in a privileged build.
pub fn packer_args(
    root: &Path,
    output: &Path,
    options: &PackerConfig,
    euid: u32,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        root.as_os_str().to_os_string(),
        output.as_os_str().to_os_string(),
        "-noappend".into(),
    ];
    if euid != 0 {
        args.push("-all-root".into());
    }
    if let Some(comp) = &options.compression {
        args.push("-comp".into());
        args.push(comp.into());
    }
    if let Some(block_size) = &options.block_size {
        args.push("-b".into());
        args.push(block_size.into());
    }
    if !options.xattrs {
        args.push("-no-xattrs".into());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sif::{Arch, DataType, DescriptorInput, FsType, PartType, Payload};
    use tempfile::TempDir;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_args_as_root() {
        let args = packer_args(
            Path::new("/b/rootfs"),
            Path::new("/b/squashfs-1.img"),
            &PackerConfig::default(),
            0,
        );
        assert_eq!(strings(&args), ["/b/rootfs", "/b/squashfs-1.img", "-noappend"]);
    }

    #[test]
    fn test_args_as_user_add_all_root() {
        let args = packer_args(
            Path::new("/b/rootfs"),
            Path::new("/b/out.img"),
            &PackerConfig::default(),
            1000,
        );
        assert_eq!(strings(&args).last().unwrap(), "-all-root");
    }

    #[test]
    fn test_args_with_options() {
        let options = PackerConfig {
            compression: Some("zstd".into()),
            block_size: Some("1M".into()),
            xattrs: false,
            ..Default::default()
        };
        let args = strings(&packer_args(Path::new("r"), Path::new("o"), &options, 0));
        assert_eq!(args, ["r", "o", "-noappend", "-comp", "zstd", "-b", "1M", "-no-xattrs"]);
    }

    #[test]
    fn test_missing_tool_is_tool_not_found() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("rootfs");
        fs::create_dir_all(&root).unwrap();

        let options = PackerConfig {
            program: "definitely_not_a_real_command_12345".into(),
            ..Default::default()
        };
        let result = pack(&root, temp.path(), &options);

        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
        // staged root is cleaned up even on failure
        assert!(!root.exists());
    }

    #[test]
    fn test_failing_tool_is_packing_failed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("rootfs");
        fs::create_dir_all(&root).unwrap();

        let options = PackerConfig {
            program: "false".into(),
            ..Default::default()
        };
        let result = pack(&root, temp.path(), &options);

        assert!(matches!(result, Err(Error::PackingFailed { .. })));
        assert!(!root.exists());
        // no stray payload left behind
        let leftovers: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_pack_empty_root() {
        if !preflight::command_exists("mksquashfs") {
            eprintln!("mksquashfs is not available, skipping");
            return;
        }
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("rootfs");
        fs::create_dir_all(&root).unwrap();

        let payload = pack(&root, temp.path(), &PackerConfig::default()).unwrap();
        let payload_path = payload.to_path_buf();

        let produced = fs::metadata(&payload_path).unwrap().len();
        assert!(produced > 0);
        assert!(!root.exists());

        let input = DescriptorInput::partition(
            &payload_path,
            FsType::Squash,
            PartType::PrimarySystem,
            Arch::host(),
        )
        .unwrap();
        assert_eq!(input.datatype, DataType::Partition);
        assert_eq!(input.size, produced);
        assert!(matches!(input.payload, Payload::File(_)));
        drop(input);

        drop(payload);
        assert!(!payload_path.exists());
    }
}
