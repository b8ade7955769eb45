//! Root and working directory change via `chroot(2)` and `chdir(2)`.

use std::path::Path;

use runshare_common::error::{Result, RunshareError};

use crate::kernel::Kernel;

/// Changes the root to `new_root` and the working directory to `new_dir`.
///
/// When the root changes and no directory is given, the working directory
/// becomes the new `/`. Returns whether the root was changed.
///
/// # Errors
///
/// Returns an error if `chroot(2)` or `chdir(2)` fails.
pub fn change_root<K: Kernel + ?Sized>(
    kernel: &K,
    new_root: Option<&Path>,
    new_dir: Option<&Path>,
) -> Result<bool> {
    let mut new_dir = new_dir;
    if let Some(root) = new_root {
        kernel.chroot(root).map_err(|e| {
            RunshareError::syscall(format!("cannot change root directory to '{}'", root.display()), e)
        })?;
        tracing::info!(root = %root.display(), "root changed");
        new_dir = new_dir.or_else(|| Some(Path::new("/")));
    }
    if let Some(dir) = new_dir {
        kernel
            .chdir(dir)
            .map_err(|e| RunshareError::syscall(format!("cannot chdir to '{}'", dir.display()), e))?;
        tracing::debug!(dir = %dir.display(), "working directory changed");
    }
    Ok(new_root.is_some())
}
