//! Building and inspecting SIF container images.
//!
//! A SIF file bundles the definition file used to build a container with a
//! squashfs root filesystem partition in a single self-describing image.
//!
//! - **Building** - Stage a root filesystem in a [`Bundle`], pack it with
//!   `mksquashfs` and write the container with [`SifAssembler`]
//! - **Inspecting** - Identify an image file with [`image::open`] and read a
//!   container's descriptor table with [`SifFile`]
//! - **Preflight checks** - Host tool validation before builds
//!
//! # Architecture
//!
//! ```text
//! Bundle ──▶ artifact::squashfs::pack ──▶ sif::build_descriptors
//!                                               │
//!                                               ▼
//!            build::ownership ◀── sif::create_container
//!
//! image::open ──▶ REGISTRY [sif, squashfs] ──▶ Image { offset, size }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sif_builder::{BuildConfig, Bundle, SifAssembler};
//! use std::path::Path;
//!
//! let bundle = Bundle::new("Bootstrap: scratch\n")?;
//! bundle.stage_rootfs(Path::new("./rootfs"))?;
//!
//! let report = SifAssembler::new(BuildConfig::default())
//!     .assemble(&bundle, Path::new("alpine.sif"))?;
//! println!("built image {}", report.header.id);
//! ```

pub mod artifact;
pub mod build;
pub mod config;
pub mod error;
pub mod image;
pub mod library;
pub mod preflight;
pub mod process;
pub mod sif;

pub use build::{BuildReport, Bundle, SifAssembler};
pub use config::{BuildConfig, ElevationHints};
pub use error::{Error, Result};
pub use image::{FormatKind, Image};
pub use sif::SifFile;
