//! Artifact builders for SIF partitions.
//!
//! - [`filesystem`] - Copying a root filesystem into a build bundle
//! - [`squashfs`] - Packing a staged root into a squashfs payload (mksquashfs)

pub mod filesystem;
pub mod squashfs;
