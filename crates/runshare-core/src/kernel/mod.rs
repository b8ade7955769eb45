//! Kernel primitive abstraction.
//!
//! Every system call the setup sequence issues goes through [`Kernel`], so the
//! orchestration order can be exercised without privileges. [`LinuxKernel`]
//! is the only production implementation.

mod linux;
#[cfg(test)]
pub(crate) mod recording;

use std::io;
use std::path::Path;

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::{ForkResult, Gid, Pid, Uid};

pub use linux::LinuxKernel;

use crate::capability::CapabilitySets;

/// The set of kernel primitives the setup sequence is built from.
pub trait Kernel {
    /// Process ID of the calling process.
    fn getpid(&self) -> Pid;

    /// Effective UID of the calling process.
    fn geteuid(&self) -> Uid;

    /// Effective GID of the calling process.
    fn getegid(&self) -> Gid;

    /// Moves the calling process into new namespaces.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `unshare(2)`.
    fn unshare(&self, flags: CloneFlags) -> nix::Result<()>;

    /// Forks the calling process.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `fork(2)`.
    fn fork(&self) -> nix::Result<ForkResult>;

    /// Waits for the given child to change state.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `waitpid(2)`, including `EINTR`.
    fn waitpid(&self, pid: Pid) -> nix::Result<WaitStatus>;

    /// Sends a signal to a process.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `kill(2)`.
    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()>;

    /// Terminates the calling process immediately, without unwinding.
    fn exit(&self, code: i32) -> !;

    /// Writes `contents` to an existing kernel control file in one call.
    ///
    /// # Errors
    ///
    /// Returns the error from opening or writing the file.
    fn write_control_file(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Inode number of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the error from `stat(2)`.
    fn inode(&self, path: &Path) -> io::Result<u64>;

    /// Issues `mount(2)` without filesystem-specific data.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `mount(2)`.
    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
    ) -> nix::Result<()>;

    /// Changes the root directory.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `chroot(2)`.
    fn chroot(&self, path: &Path) -> nix::Result<()>;

    /// Changes the working directory.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `chdir(2)`.
    fn chdir(&self, path: &Path) -> nix::Result<()>;

    /// Replaces the supplementary group list.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `setgroups(2)`.
    fn setgroups(&self, groups: &[Gid]) -> nix::Result<()>;

    /// Sets the GID.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `setgid(2)`.
    fn setgid(&self, gid: Gid) -> nix::Result<()>;

    /// Sets the UID.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `setuid(2)`.
    fn setuid(&self, uid: Uid) -> nix::Result<()>;

    /// Arranges for `signal` to be delivered when the parent process dies.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `prctl(PR_SET_PDEATHSIG)`.
    fn set_parent_death_signal(&self, signal: Signal) -> nix::Result<()>;

    /// Highest valid capability number on the running kernel.
    fn last_cap(&self) -> u32;

    /// Reads the capability sets of the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `capget(2)`.
    fn capget(&self) -> nix::Result<CapabilitySets>;

    /// Replaces the capability sets of the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `capset(2)`.
    fn capset(&self, sets: &CapabilitySets) -> nix::Result<()>;

    /// Adds one capability to the ambient set.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `prctl(PR_CAP_AMBIENT_RAISE)`.
    fn raise_ambient(&self, cap: u32) -> nix::Result<()>;
}

/// Waits for `pid`, retrying when the wait is interrupted by a signal.
///
/// # Errors
///
/// Returns any `waitpid(2)` errno other than `EINTR`.
pub fn wait_uninterrupted<K: Kernel + ?Sized>(kernel: &K, pid: Pid) -> nix::Result<WaitStatus> {
    loop {
        match kernel.waitpid(pid) {
            Err(Errno::EINTR) => tracing::debug!(%pid, "wait interrupted, retrying"),
            other => return other,
        }
    }
}
