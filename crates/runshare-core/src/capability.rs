//! Ambient capability propagation.
//!
//! After a user namespace has been entered and credentials switched, the
//! permitted capabilities would be lost on the next `execve(2)` of a
//! non-privileged binary. Raising them into the ambient set keeps them.

use runshare_common::error::{Result, RunshareError};

use crate::kernel::Kernel;

/// Capability bit sets of a thread, one bit per capability number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySets {
    /// Capabilities currently in effect.
    pub effective: u64,
    /// Capabilities the thread may assume.
    pub permitted: u64,
    /// Capabilities preserved across `execve(2)`.
    pub inheritable: u64,
}

/// Moves every permitted capability into the inheritable set, then raises
/// each inheritable capability up to `last_cap` into the ambient set.
///
/// `last_cap` must have been queried before any fork.
///
/// # Errors
///
/// Returns an error if `capget(2)`, `capset(2)` or
/// `prctl(PR_CAP_AMBIENT_RAISE)` fails.
pub fn propagate_ambient<K: Kernel + ?Sized>(kernel: &K, last_cap: u32) -> Result<()> {
    let mut sets = kernel
        .capget()
        .map_err(|e| RunshareError::syscall("capget", e))?;

    // A capability can only be ambient if it is both permitted and inheritable.
    sets.inheritable = sets.permitted;
    kernel
        .capset(&sets)
        .map_err(|e| RunshareError::syscall("capset", e))?;

    let mut raised = 0_u32;
    for cap in (0..u64::BITS).take_while(|cap| *cap <= last_cap) {
        if sets.inheritable & (1_u64 << cap) == 0 {
            continue;
        }
        kernel
            .raise_ambient(cap)
            .map_err(|e| RunshareError::syscall(format!("prctl(PR_CAP_AMBIENT_RAISE, {cap})"), e))?;
        raised += 1;
    }

    tracing::debug!(raised, last_cap, "ambient capabilities raised");
    Ok(())
}
