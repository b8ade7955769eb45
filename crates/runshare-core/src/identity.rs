//! User and group identity resolution and the final credential switch.

use nix::unistd::{Gid, Group, Uid, User};
use runshare_common::error::{Result, RunshareError};

use crate::kernel::Kernel;

/// Resolves a user name or numeric UID.
///
/// The name service is consulted first, so a user literally named `"1000"`
/// wins over UID 1000.
///
/// # Errors
///
/// Returns a configuration error if the token is empty, names no user, and
/// is not a valid UID.
pub fn resolve_uid(token: &str) -> Result<Uid> {
    if token.is_empty() {
        return Err(RunshareError::config("empty user name"));
    }
    if let Ok(Some(user)) = User::from_name(token) {
        return Ok(user.uid);
    }
    token
        .parse::<u32>()
        .ok()
        .filter(|raw| *raw != u32::MAX)
        .map(Uid::from_raw)
        .ok_or_else(|| RunshareError::config(format!("failed to parse uid '{token}'")))
}

/// Resolves a group name or numeric GID.
///
/// # Errors
///
/// Returns a configuration error if the token is empty, names no group, and
/// is not a valid GID.
pub fn resolve_gid(token: &str) -> Result<Gid> {
    if token.is_empty() {
        return Err(RunshareError::config("empty group name"));
    }
    if let Ok(Some(group)) = Group::from_name(token) {
        return Ok(group.gid);
    }
    token
        .parse::<u32>()
        .ok()
        .filter(|raw| *raw != u32::MAX)
        .map(Gid::from_raw)
        .ok_or_else(|| RunshareError::config(format!("failed to parse gid '{token}'")))
}

/// Switches to the requested credentials, GID first.
///
/// Changing the GID needs privileges that may be gone once the UID has
/// changed, and supplementary groups are cleared before the GID switch.
///
/// # Errors
///
/// Returns an error if `setgroups(2)`, `setgid(2)` or `setuid(2)` fails.
pub fn switch_credentials<K: Kernel + ?Sized>(
    kernel: &K,
    uid: Option<Uid>,
    gid: Option<Gid>,
) -> Result<()> {
    if let Some(gid) = gid {
        kernel
            .setgroups(&[])
            .map_err(|e| RunshareError::syscall("setgroups", e))?;
        kernel
            .setgid(gid)
            .map_err(|e| RunshareError::syscall(format!("setgid({gid})"), e))?;
        tracing::debug!(%gid, "switched gid");
    }
    if let Some(uid) = uid {
        kernel
            .setuid(uid)
            .map_err(|e| RunshareError::syscall(format!("setuid({uid})"), e))?;
        tracing::debug!(%uid, "switched uid");
    }
    Ok(())
}
