//! Ownership of artifacts built under sudo.
//!
//! When the builder runs through `sudo`, the finished SIF would otherwise be
//! owned by root. The original caller's ids are recovered from the hints sudo
//! leaves in the environment and the file is handed back to them. Every
//! failure here is soft: the artifact is complete whoever owns it.

use std::path::Path;

use crate::config::ElevationHints;
use crate::error::Error;
use crate::process;

/// Ids to hand the artifact to, or `None` when ownership should stay as is.
///
/// Requires the elevation command to mention `program`, the current process
/// to be root, and the original user not to be root.
pub fn ownership_target(hints: &ElevationHints, euid: u32, program: &str) -> Option<(u32, u32)> {
    let command = hints.command.as_deref()?;
    if !command.contains(program) {
        return None;
    }
    if euid != 0 || hints.user.as_deref() == Some("root") {
        return None;
    }

    let (Some(uid), Some(gid)) = (hints.uid.as_deref(), hints.gid.as_deref()) else {
        tracing::error!("SUDO_UID or SUDO_GID is not set, leaving built image owned by root");
        return None;
    };

    match (uid.trim().parse::<u32>(), gid.trim().parse::<u32>()) {
        (Ok(uid), Ok(gid)) => Some((uid, gid)),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(uid, gid, error = %e, "invalid SUDO_UID/SUDO_GID, leaving built image owned by root");
            None
        }
    }
}

/// Give `path` back to the user who invoked sudo.
///
/// Returns whether ownership was changed. Never fails.
pub fn normalize_ownership(path: &Path, hints: &ElevationHints, program: &str) -> bool {
    normalize_ownership_as(path, hints, program, process::effective_uid())
}

fn normalize_ownership_as(path: &Path, hints: &ElevationHints, program: &str, euid: u32) -> bool {
    let Some((uid, gid)) = ownership_target(hints, euid, program) else {
        return false;
    };

    match std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), uid, gid, "changed image owner");
            true
        }
        Err(source) => {
            let err = Error::OwnershipAdjustFailed {
                path: path.to_path_buf(),
                uid,
                gid,
                source,
            };
            tracing::warn!(error = ?err, "{err}, leaving owner unchanged");
            false
        }
    }
}
