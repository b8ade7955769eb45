//! Time namespace clock offsets.
//!
//! Offsets are written to the namespace the caller's children will enter,
//! and only before any process has joined it.

use std::path::Path;

use runshare_common::constants::PROC_TIMENS_OFFSETS;
use runshare_common::error::{Result, RunshareError};

use crate::kernel::Kernel;

/// A clock that can be offset inside a time namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// `CLOCK_MONOTONIC`.
    Monotonic,
    /// `CLOCK_BOOTTIME`.
    Boottime,
}

impl Clock {
    /// Kernel clock ID.
    #[must_use]
    pub const fn id(self) -> libc::clockid_t {
        match self {
            Self::Monotonic => libc::CLOCK_MONOTONIC,
            Self::Boottime => libc::CLOCK_BOOTTIME,
        }
    }
}

/// Sets `clock` to run `seconds` ahead of the host inside the new time namespace.
///
/// # Errors
///
/// Returns an error if the offsets file cannot be written.
pub fn set_clock_offset<K: Kernel + ?Sized>(kernel: &K, clock: Clock, seconds: i64) -> Result<()> {
    let path = Path::new(PROC_TIMENS_OFFSETS);
    let line = format!("{} {seconds} 0", clock.id());
    kernel
        .write_control_file(path, &line)
        .map_err(|e| RunshareError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    tracing::debug!(?clock, seconds, "clock offset set");
    Ok(())
}
