//! SIF assembler: turns a staged bundle into a container image.
//!
//! ```text
//! bundle/rootfs ──mksquashfs──▶ squashfs-*.img ─┐
//! bundle.recipe ────────────────────────────────┴──▶ output.sif ──chown──▶ caller
//! ```
//!
//! The squashfs payload lives inside the bundle as a [`tempfile::TempPath`]
//! and is deleted once the container is written, whatever the outcome.

use std::path::Path;

use crate::artifact::squashfs;
use crate::build::bundle::Bundle;
use crate::build::ownership::normalize_ownership;
use crate::config::{BuildConfig, ElevationHints};
use crate::error::Result;
use crate::sif::{build_descriptors, create_container, Header};

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub header: Header,
    /// Whether the image was handed back to the sudo caller.
    pub ownership_adjusted: bool,
}

/// Builds SIF images from bundles.
#[derive(Debug, Clone)]
pub struct SifAssembler {
    config: BuildConfig,
    hints: ElevationHints,
}

impl SifAssembler {
    /// Assembler reading elevation hints from the process environment.
    pub fn new(config: BuildConfig) -> Self {
        Self::with_hints(config, ElevationHints::from_env())
    }

    pub fn with_hints(config: BuildConfig, hints: ElevationHints) -> Self {
        Self { config, hints }
    }

    /// Build the image at `path` from `bundle`.
    ///
    /// The bundle's staged root is consumed by packing. A packing failure
    /// returns before `path` is touched; an existing file there survives.
    pub fn assemble(&self, bundle: &Bundle, path: &Path) -> Result<BuildReport> {
        let payload = squashfs::pack(&bundle.rootfs(), bundle.path(), &self.config.packer)?;

        let inputs = build_descriptors(&bundle.recipe, &payload)?;
        let header = create_container(path, inputs)?;
        drop(payload);

        let ownership_adjusted =
            normalize_ownership(path, &self.hints, &self.config.ownership.program);

        tracing::info!(
            path = %path.display(),
            id = %header.id,
            size = header.dataoff + header.datalen,
            "SIF image created"
        );
        Ok(BuildReport {
            header,
            ownership_adjusted,
        })
    }
}
