//! Mount propagation and `/proc` remounting inside a new mount namespace.

use std::path::Path;

use nix::errno::Errno;
use nix::mount::MsFlags;
use runshare_common::error::{Result, RunshareError};
use runshare_common::types::Propagation;

use crate::kernel::Kernel;

/// Mount flags that apply `propagation` recursively; empty for `Unchanged`.
#[must_use]
pub fn propagation_flags(propagation: Propagation) -> MsFlags {
    match propagation {
        Propagation::Slave => MsFlags::MS_REC | MsFlags::MS_SLAVE,
        Propagation::Private => MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        Propagation::Shared => MsFlags::MS_REC | MsFlags::MS_SHARED,
        Propagation::Unchanged => MsFlags::empty(),
    }
}

/// Applies `propagation` to every mount under `/`.
///
/// # Errors
///
/// Returns an error if the remount of `/` fails.
pub fn set_propagation<K: Kernel + ?Sized>(kernel: &K, propagation: Propagation) -> Result<()> {
    let flags = propagation_flags(propagation);
    if flags.is_empty() {
        return Ok(());
    }
    kernel
        .mount(Some("none"), Path::new("/"), None, flags)
        .map_err(|e| RunshareError::syscall("cannot change root filesystem propagation", e))?;
    tracing::debug!(%propagation, "root propagation changed");
    Ok(())
}

/// Mounts a fresh `proc` filesystem at `target`.
///
/// Unless `/` was already made recursively private, or the root was
/// changed, `target` is first made private so the new mount does not leak
/// into the parent namespace. `EINVAL` from that step means nothing is
/// mounted at `target` yet and is ignored.
///
/// # Errors
///
/// Returns an error if either mount call fails for any other reason.
pub fn mount_proc<K: Kernel + ?Sized>(
    kernel: &K,
    target: &Path,
    root_changed: bool,
    propagation: Propagation,
) -> Result<()> {
    if !root_changed && propagation != Propagation::Private {
        match kernel.mount(
            Some("none"),
            target,
            None,
            MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        ) {
            Ok(()) => {}
            Err(Errno::EINVAL) => {
                tracing::warn!(target = %target.display(), "nothing mounted at proc target, skipping private remount");
            }
            Err(e) => {
                return Err(RunshareError::syscall(
                    format!("cannot change {} filesystem propagation", target.display()),
                    e,
                ));
            }
        }
    }

    kernel
        .mount(
            Some("proc"),
            target,
            Some("proc"),
            MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV,
        )
        .map_err(|e| RunshareError::syscall(format!("mount {} failed", target.display()), e))?;
    tracing::info!(target = %target.display(), "proc mounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::kernel::recording::{Call, RecordingKernel};

    fn private_remount(target: &str) -> Call {
        Call::Mount {
            source: Some("none".into()),
            target: PathBuf::from(target),
            fstype: None,
            flags: MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        }
    }

    fn proc_mount(target: &str) -> Call {
        Call::Mount {
            source: Some("proc".into()),
            target: PathBuf::from(target),
            fstype: Some("proc".into()),
            flags: MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV,
        }
    }

    #[test]
    fn unchanged_propagation_issues_no_mount() {
        let kernel = RecordingKernel::new();
        set_propagation(&kernel, Propagation::Unchanged).expect("noop");
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn slave_propagation_is_recursive() {
        let kernel = RecordingKernel::new();
        set_propagation(&kernel, Propagation::Slave).expect("slave");
        assert_eq!(
            kernel.calls(),
            vec![Call::Mount {
                source: Some("none".into()),
                target: PathBuf::from("/"),
                fstype: None,
                flags: MsFlags::MS_REC | MsFlags::MS_SLAVE,
            }]
        );
    }

    #[test]
    fn proc_target_is_made_private_first_under_shared_root() {
        let kernel = RecordingKernel::new();
        mount_proc(&kernel, Path::new("/proc"), false, Propagation::Shared).expect("mount");
        assert_eq!(kernel.calls(), vec![private_remount("/proc"), proc_mount("/proc")]);
    }

    #[test]
    fn private_root_makes_the_extra_remount_redundant() {
        let kernel = RecordingKernel::new();
        mount_proc(&kernel, Path::new("/proc"), false, Propagation::Private).expect("mount");
        assert_eq!(kernel.calls(), vec![proc_mount("/proc")]);
    }

    #[test]
    fn changed_root_skips_the_extra_remount() {
        let kernel = RecordingKernel::new();
        mount_proc(&kernel, Path::new("/proc"), true, Propagation::Slave).expect("mount");
        assert_eq!(kernel.calls(), vec![proc_mount("/proc")]);
    }

    #[test]
    fn einval_from_private_remount_is_tolerated() {
        let kernel = RecordingKernel::new();
        kernel.fail_when(
            |c| matches!(c, Call::Mount { source: Some(s), .. } if s == "none"),
            Errno::EINVAL,
        );
        mount_proc(&kernel, Path::new("/mnt/proc"), false, Propagation::Unchanged)
            .expect("EINVAL ignored");
        assert_eq!(kernel.calls().last(), Some(&proc_mount("/mnt/proc")));
    }

    #[test]
    fn other_errors_from_private_remount_are_fatal() {
        let kernel = RecordingKernel::new();
        kernel.fail_when(
            |c| matches!(c, Call::Mount { source: Some(s), .. } if s == "none"),
            Errno::EPERM,
        );
        let err = mount_proc(&kernel, Path::new("/proc"), false, Propagation::Slave)
            .expect_err("EPERM is fatal");
        assert!(matches!(err, RunshareError::Syscall { source: Errno::EPERM, .. }));
        assert_eq!(kernel.calls().len(), 1);
    }
}
