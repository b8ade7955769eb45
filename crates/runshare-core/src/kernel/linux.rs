//! Direct system-call implementation of [`Kernel`].

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::OnceLock;

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::{ForkResult, Gid, Pid, Uid};
use runshare_common::constants::PROC_CAP_LAST_CAP;

use super::Kernel;
use crate::capability::CapabilitySets;

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

/// Upper bound for the capability probe when `cap_last_cap` is unreadable.
const CAP_PROBE_LIMIT: u32 = 63;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: libc::c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

/// [`Kernel`] backed by the running Linux kernel.
#[derive(Debug, Default)]
pub struct LinuxKernel {
    last_cap: OnceLock<u32>,
}

impl LinuxKernel {
    /// Creates a kernel handle with an empty capability cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_cap: OnceLock::new(),
        }
    }
}

impl Kernel for LinuxKernel {
    fn getpid(&self) -> Pid {
        nix::unistd::getpid()
    }

    fn geteuid(&self) -> Uid {
        nix::unistd::geteuid()
    }

    fn getegid(&self) -> Gid {
        nix::unistd::getegid()
    }

    fn unshare(&self, flags: CloneFlags) -> nix::Result<()> {
        nix::sched::unshare(flags)
    }

    #[allow(unsafe_code)]
    fn fork(&self) -> nix::Result<ForkResult> {
        // SAFETY: the setup sequence runs single-threaded; both sides only
        // continue with plain system calls or exit through `_exit`.
        unsafe { nix::unistd::fork() }
    }

    fn waitpid(&self, pid: Pid) -> nix::Result<WaitStatus> {
        nix::sys::wait::waitpid(pid, None)
    }

    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        nix::sys::signal::kill(pid, signal)
    }

    #[allow(unsafe_code)]
    fn exit(&self, code: i32) -> ! {
        // SAFETY: `_exit` is async-signal-safe and skips atexit handlers and
        // stdio flushing, so a forked helper leaves the parent's buffers alone.
        unsafe { libc::_exit(code) }
    }

    fn write_control_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(contents.as_bytes())
    }

    fn inode(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.ino())
    }

    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
    ) -> nix::Result<()> {
        nix::mount::mount(source, target, fstype, flags, None::<&str>)
    }

    fn chroot(&self, path: &Path) -> nix::Result<()> {
        nix::unistd::chroot(path)
    }

    fn chdir(&self, path: &Path) -> nix::Result<()> {
        nix::unistd::chdir(path)
    }

    fn setgroups(&self, groups: &[Gid]) -> nix::Result<()> {
        nix::unistd::setgroups(groups)
    }

    fn setgid(&self, gid: Gid) -> nix::Result<()> {
        nix::unistd::setgid(gid)
    }

    fn setuid(&self, uid: Uid) -> nix::Result<()> {
        nix::unistd::setuid(uid)
    }

    fn set_parent_death_signal(&self, signal: Signal) -> nix::Result<()> {
        nix::sys::prctl::set_pdeathsig(signal)
    }

    fn last_cap(&self) -> u32 {
        *self.last_cap.get_or_init(query_last_cap)
    }

    #[allow(unsafe_code)]
    fn capget(&self) -> nix::Result<CapabilitySets> {
        let mut header = CapUserHeader {
            version: LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        let mut data = [CapUserData::default(); 2];
        // SAFETY: header and data match the kernel's v3 capability ABI, which
        // fills exactly two data entries.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_capget,
                &raw mut header,
                data.as_mut_ptr(),
            )
        };
        let _ = Errno::result(ret)?;
        Ok(CapabilitySets {
            effective: join_words(data[0].effective, data[1].effective),
            permitted: join_words(data[0].permitted, data[1].permitted),
            inheritable: join_words(data[0].inheritable, data[1].inheritable),
        })
    }

    #[allow(unsafe_code, clippy::cast_possible_truncation)]
    fn capset(&self, sets: &CapabilitySets) -> nix::Result<()> {
        let mut header = CapUserHeader {
            version: LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        let data = [
            CapUserData {
                effective: sets.effective as u32,
                permitted: sets.permitted as u32,
                inheritable: sets.inheritable as u32,
            },
            CapUserData {
                effective: (sets.effective >> 32) as u32,
                permitted: (sets.permitted >> 32) as u32,
                inheritable: (sets.inheritable >> 32) as u32,
            },
        ];
        // SAFETY: header and data match the kernel's v3 capability ABI; the
        // kernel only reads from `data`.
        let ret = unsafe { libc::syscall(libc::SYS_capset, &raw mut header, data.as_ptr()) };
        Errno::result(ret).map(drop)
    }

    #[allow(unsafe_code)]
    fn raise_ambient(&self, cap: u32) -> nix::Result<()> {
        // SAFETY: PR_CAP_AMBIENT_RAISE takes a capability number and three
        // unused zero arguments.
        let ret = unsafe {
            libc::prctl(
                libc::PR_CAP_AMBIENT,
                libc::PR_CAP_AMBIENT_RAISE,
                libc::c_ulong::from(cap),
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            )
        };
        Errno::result(ret).map(drop)
    }
}

fn join_words(low: u32, high: u32) -> u64 {
    (u64::from(high) << 32) | u64::from(low)
}

/// Reads `cap_last_cap`, probing the bounding set when procfs is unavailable.
fn query_last_cap() -> u32 {
    if let Some(cap) = std::fs::read_to_string(PROC_CAP_LAST_CAP)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        return cap;
    }
    let mut last = 0;
    for cap in 0..=CAP_PROBE_LIMIT {
        if !capability_in_bounding_set_is_valid(cap) {
            break;
        }
        last = cap;
    }
    tracing::debug!(last, "probed last capability");
    last
}

#[allow(unsafe_code)]
fn capability_in_bounding_set_is_valid(cap: u32) -> bool {
    // SAFETY: PR_CAPBSET_READ only inspects the calling thread; it fails
    // with EINVAL for capability numbers the kernel does not know.
    let ret = unsafe {
        libc::prctl(
            libc::PR_CAPBSET_READ,
            libc::c_ulong::from(cap),
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    ret >= 0
}
