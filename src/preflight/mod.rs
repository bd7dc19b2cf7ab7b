//! Preflight checks for build validation.
//!
//! Validates that the host system has required tools before building.
//! This prevents cryptic errors halfway through a build.
//!
//! # Example
//!
//! ```rust
//! use sif_builder::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("mksquashfs") {
//!     println!("squashfs-tools not installed");
//! }
//!
//! let tools = &[("mksquashfs", "squashfs-tools")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::error::{Error, Result};
use crate::process;

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    process::exists(cmd)
}

/// Required host tools for building SIF images.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("mksquashfs", "squashfs-tools")];

/// Package that ships a given tool, for error messages.
pub fn package_for(tool: &str) -> &'static str {
    REQUIRED_TOOLS
        .iter()
        .find(|(t, _)| *t == tool)
        .map(|(_, p)| *p)
        .unwrap_or("squashfs-tools")
}

/// Check that specific tools are available.
///
/// Fails with [`Error::ToolNotFound`] naming every missing tool.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<(&str, &str)> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .copied()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(Error::ToolNotFound {
        tool: missing
            .iter()
            .map(|(t, _)| *t)
            .collect::<Vec<_>>()
            .join(", "),
        package: missing
            .iter()
            .map(|(_, p)| *p)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Check that all standard SIF-building tools are available.
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}
