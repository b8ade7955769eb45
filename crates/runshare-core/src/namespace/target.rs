//! Persistent namespace binding.
//!
//! A namespace outlives its last member process if its `/proc/<pid>/ns/*`
//! file is bind-mounted somewhere. When the mount namespace itself changes,
//! that bind has to be made from a process still in the old mount
//! namespace, otherwise it lands in the new one and is invisible outside.
//! [`BindHelper`] is that process: forked before `unshare`, it blocks on a
//! pipe until the caller reports that the new namespaces exist, checks that
//! the caller's mount namespace really changed, and performs the binds.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use nix::mount::MsFlags;
use nix::sys::wait::WaitStatus;
use nix::unistd::{ForkResult, Pid};
use runshare_common::constants::PIPE_SYNC_BYTE;
use runshare_common::error::{Result, RunshareError};
use runshare_common::types::NamespaceKind;

use super::{NamespaceTarget, NamespaceTargets};
use crate::kernel::{Kernel, wait_uninterrupted};

const HELPER_SUCCESS: i32 = 0;
const HELPER_FAILURE: i32 = 1;

/// Bind-mounts every target's namespace file of `pid` onto its path.
///
/// # Errors
///
/// Returns an error on the first bind mount the kernel refuses.
pub fn bind_targets<K: Kernel + ?Sized>(
    kernel: &K,
    pid: Pid,
    targets: &NamespaceTargets,
) -> Result<()> {
    for target in targets.iter() {
        bind_target(kernel, pid, target)?;
    }
    Ok(())
}

fn bind_target<K: Kernel + ?Sized>(kernel: &K, pid: Pid, target: &NamespaceTarget) -> Result<()> {
    let source = target.source_for(pid);
    let source_str = source.to_string_lossy();
    kernel
        .mount(Some(&source_str), &target.path, None, MsFlags::MS_BIND)
        .map_err(|e| {
            RunshareError::syscall(
                format!("mount {} on {}", source.display(), target.path.display()),
                e,
            )
        })?;
    tracing::debug!(kind = %target.kind, target = %target.path.display(), "namespace persisted");
    Ok(())
}

/// Inode of `pid`'s current mount namespace.
fn mount_namespace_inode<K: Kernel + ?Sized>(kernel: &K, pid: Pid) -> Result<u64> {
    let path = Path::new("/proc")
        .join(pid.to_string())
        .join(NamespaceKind::Mount.proc_entry());
    kernel.inode(&path).map_err(|e| RunshareError::Io { path, source: e })
}

/// Handle on the forked binder helper, held by the process that unshares.
#[derive(Debug)]
pub struct BindHelper {
    pid: Pid,
    trigger: File,
}

impl BindHelper {
    /// Records `owner`'s current mount namespace and forks the helper.
    ///
    /// Must run before `unshare`, so the helper's inode check has a
    /// baseline. The helper never returns; it exits with its bind result.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline cannot be read, or if creating the
    /// pipe or forking fails.
    pub fn spawn<K: Kernel + ?Sized>(
        kernel: &K,
        owner: Pid,
        targets: &NamespaceTargets,
    ) -> Result<Self> {
        let baseline = mount_namespace_inode(kernel, owner)?;
        let (read_end, write_end) =
            nix::unistd::pipe().map_err(|e| RunshareError::syscall("pipe", e))?;

        match kernel.fork().map_err(|e| RunshareError::syscall("fork", e))? {
            ForkResult::Child => {
                drop(write_end);
                let code = run_helper(kernel, File::from(read_end), owner, baseline, targets);
                kernel.exit(code)
            }
            ForkResult::Parent { child } => {
                drop(read_end);
                tracing::debug!(helper = %child, baseline, "namespace binder helper forked");
                Ok(Self {
                    pid: child,
                    trigger: File::from(write_end),
                })
            }
        }
    }

    /// Process ID of the helper.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Tells the helper the namespaces are in place and waits for its verdict.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipe write or the wait fails, or if the helper
    /// does not exit successfully.
    pub fn release<K: Kernel + ?Sized>(self, kernel: &K) -> Result<()> {
        let Self { pid, mut trigger } = self;
        // Closing the pipe unblocks the helper with EOF, so a failed write
        // still surfaces as a helper failure below.
        if let Err(e) = trigger.write_all(&[PIPE_SYNC_BYTE]) {
            tracing::warn!(helper = %pid, error = %e, "failed to signal binder helper");
        }
        drop(trigger);

        match wait_uninterrupted(kernel, pid)
            .map_err(|e| RunshareError::syscall(format!("waitpid({pid})"), e))?
        {
            WaitStatus::Exited(_, HELPER_SUCCESS) => {
                tracing::debug!(helper = %pid, "namespace binder helper finished");
                Ok(())
            }
            status => Err(RunshareError::NamespaceBind {
                message: format!("helper {pid} ended with {status:?}"),
            }),
        }
    }
}

/// Body of the helper process; returns its exit code.
fn run_helper<K: Kernel + ?Sized>(
    kernel: &K,
    mut trigger: File,
    owner: Pid,
    baseline: u64,
    targets: &NamespaceTargets,
) -> i32 {
    // Wait for the signal byte. EOF means the owner gave up.
    let mut byte = [0_u8; 1];
    match trigger.read_exact(&mut byte) {
        Ok(()) if byte[0] == PIPE_SYNC_BYTE => {}
        Ok(()) => {
            tracing::error!(byte = byte[0], "unexpected byte on binder pipe");
            return HELPER_FAILURE;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to read binder pipe");
            return HELPER_FAILURE;
        }
    }

    // Check, then act.
    match mount_namespace_inode(kernel, owner) {
        Ok(current) if current == baseline => {
            tracing::error!(%owner, "mount namespace unchanged, refusing to bind");
            return HELPER_FAILURE;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(error = %e, "cannot inspect owner mount namespace");
            return HELPER_FAILURE;
        }
    }
    match bind_targets(kernel, owner, targets) {
        Ok(()) => HELPER_SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "namespace bind failed");
            HELPER_FAILURE
        }
    }
}
