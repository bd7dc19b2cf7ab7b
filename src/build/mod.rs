//! Building SIF images.
//!
//! - [`bundle`] - Private working area holding the staged root filesystem
//! - [`assembler`] - Pack, wrap and write a container from a bundle
//! - [`ownership`] - Hand the finished image back to the sudo caller

pub mod assembler;
pub mod bundle;
pub mod ownership;

pub use assembler::{BuildReport, SifAssembler};
pub use bundle::Bundle;
