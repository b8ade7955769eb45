//! User namespace identity mapping.
//!
//! Maps the identity the caller had before unsharing onto a chosen ID inside
//! the new user namespace, one ID each for users and groups.

use std::io;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use runshare_common::constants::{PROC_GID_MAP, PROC_SETGROUPS, PROC_UID_MAP};
use runshare_common::error::{Result, RunshareError};
use runshare_common::types::SetgroupsPolicy;

use crate::kernel::Kernel;

/// IDs the caller's pre-unshare identity is mapped to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdMapping {
    /// In-namespace UID for the caller's real EUID.
    pub user: Option<Uid>,
    /// In-namespace GID for the caller's real EGID.
    pub group: Option<Gid>,
}

/// Writes a single-entry `"<inside> <outside> 1"` map to `path`.
///
/// # Errors
///
/// Returns an error if the map file cannot be written.
pub fn map_id<K: Kernel + ?Sized>(kernel: &K, path: &Path, inside: u32, outside: u32) -> Result<()> {
    let line = format!("{inside} {outside} 1");
    kernel
        .write_control_file(path, &line)
        .map_err(|e| RunshareError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    tracing::debug!(path = %path.display(), inside, outside, "wrote id map");
    Ok(())
}

/// Writes the setgroups policy of the current user namespace.
///
/// Kernels without the control file predate the restriction, so a missing
/// file is not an error.
///
/// # Errors
///
/// Returns an error if the control file exists but cannot be written.
pub fn setgroups_control<K: Kernel + ?Sized>(kernel: &K, policy: SetgroupsPolicy) -> Result<()> {
    let path = Path::new(PROC_SETGROUPS);
    match kernel.write_control_file(path, policy.as_str()) {
        Ok(()) => {
            tracing::debug!(%policy, "setgroups policy written");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RunshareError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Applies the UID then GID mapping against the pre-unshare identity.
///
/// A GID map can only be written once setgroups is denied, so the deny is
/// written first. Returns whether a GID map was written.
///
/// # Errors
///
/// Returns an error if any control file write fails.
pub fn apply_mapping<K: Kernel + ?Sized>(
    kernel: &K,
    mapping: IdMapping,
    real_euid: Uid,
    real_egid: Gid,
) -> Result<bool> {
    if let Some(uid) = mapping.user {
        map_id(kernel, Path::new(PROC_UID_MAP), uid.as_raw(), real_euid.as_raw())?;
    }
    let Some(gid) = mapping.group else {
        return Ok(false);
    };
    setgroups_control(kernel, SetgroupsPolicy::Deny)?;
    map_id(kernel, Path::new(PROC_GID_MAP), gid.as_raw(), real_egid.as_raw())?;
    Ok(true)
}
