//! In-memory [`Kernel`] that records every call for ordering assertions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::{ForkResult, Gid, Pid, Uid};

use super::Kernel;
use crate::capability::CapabilitySets;

pub const SELF_PID: i32 = 4242;
pub const REAL_UID: u32 = 1000;
pub const REAL_GID: u32 = 1001;

/// One recorded kernel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Unshare(CloneFlags),
    Fork,
    Waitpid(Pid),
    Kill(Pid, Signal),
    Write(PathBuf, String),
    Inode(PathBuf),
    Mount {
        source: Option<String>,
        target: PathBuf,
        fstype: Option<String>,
        flags: MsFlags,
    },
    Chroot(PathBuf),
    Chdir(PathBuf),
    Setgroups(Vec<Gid>),
    Setgid(Gid),
    Setuid(Uid),
    ParentDeathSignal(Signal),
    Capget,
    Capset(CapabilitySets),
    RaiseAmbient(u32),
}

type FailRule = (fn(&Call) -> bool, Errno);

pub struct RecordingKernel {
    calls: RefCell<Vec<Call>>,
    forks: RefCell<VecDeque<ForkResult>>,
    waits: RefCell<VecDeque<nix::Result<WaitStatus>>>,
    inodes: RefCell<VecDeque<u64>>,
    failures: RefCell<Vec<FailRule>>,
    caps: CapabilitySets,
    last_cap: u32,
}

impl Default for RecordingKernel {
    fn default() -> Self {
        Self {
            calls: RefCell::default(),
            forks: RefCell::default(),
            waits: RefCell::default(),
            inodes: RefCell::default(),
            failures: RefCell::default(),
            caps: CapabilitySets::default(),
            last_cap: 40,
        }
    }
}

impl RecordingKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caps(mut self, caps: CapabilitySets, last_cap: u32) -> Self {
        self.caps = caps;
        self.last_cap = last_cap;
        self
    }

    pub fn push_fork(&self, result: ForkResult) {
        self.forks.borrow_mut().push_back(result);
    }

    pub fn push_wait(&self, result: nix::Result<WaitStatus>) {
        self.waits.borrow_mut().push_back(result);
    }

    pub fn push_inode(&self, ino: u64) {
        self.inodes.borrow_mut().push_back(ino);
    }

    pub fn fail_when(&self, matches: fn(&Call) -> bool, errno: Errno) {
        self.failures.borrow_mut().push((matches, errno));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn position(&self, matches: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(matches)
    }

    fn record(&self, call: Call) -> nix::Result<()> {
        let failure = self
            .failures
            .borrow()
            .iter()
            .find(|(matches, _)| matches(&call))
            .map(|(_, errno)| *errno);
        self.calls.borrow_mut().push(call);
        failure.map_or(Ok(()), Err)
    }
}

impl Kernel for RecordingKernel {
    fn getpid(&self) -> Pid {
        Pid::from_raw(SELF_PID)
    }

    fn geteuid(&self) -> Uid {
        Uid::from_raw(REAL_UID)
    }

    fn getegid(&self) -> Gid {
        Gid::from_raw(REAL_GID)
    }

    fn unshare(&self, flags: CloneFlags) -> nix::Result<()> {
        self.record(Call::Unshare(flags))
    }

    fn fork(&self) -> nix::Result<ForkResult> {
        self.record(Call::Fork)?;
        Ok(self
            .forks
            .borrow_mut()
            .pop_front()
            .unwrap_or(ForkResult::Child))
    }

    fn waitpid(&self, pid: Pid) -> nix::Result<WaitStatus> {
        self.record(Call::Waitpid(pid))?;
        self.waits
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(WaitStatus::Exited(pid, 0)))
    }

    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        self.record(Call::Kill(pid, signal))
    }

    fn exit(&self, code: i32) -> ! {
        panic!("recording kernel asked to exit with {code}")
    }

    fn write_control_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.record(Call::Write(path.to_path_buf(), contents.to_owned()))
            .map_err(io::Error::from)
    }

    fn inode(&self, path: &Path) -> io::Result<u64> {
        self.record(Call::Inode(path.to_path_buf()))
            .map_err(io::Error::from)?;
        Ok(self.inodes.borrow_mut().pop_front().unwrap_or(1))
    }

    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
    ) -> nix::Result<()> {
        self.record(Call::Mount {
            source: source.map(str::to_owned),
            target: target.to_path_buf(),
            fstype: fstype.map(str::to_owned),
            flags,
        })
    }

    fn chroot(&self, path: &Path) -> nix::Result<()> {
        self.record(Call::Chroot(path.to_path_buf()))
    }

    fn chdir(&self, path: &Path) -> nix::Result<()> {
        self.record(Call::Chdir(path.to_path_buf()))
    }

    fn setgroups(&self, groups: &[Gid]) -> nix::Result<()> {
        self.record(Call::Setgroups(groups.to_vec()))
    }

    fn setgid(&self, gid: Gid) -> nix::Result<()> {
        self.record(Call::Setgid(gid))
    }

    fn setuid(&self, uid: Uid) -> nix::Result<()> {
        self.record(Call::Setuid(uid))
    }

    fn set_parent_death_signal(&self, signal: Signal) -> nix::Result<()> {
        self.record(Call::ParentDeathSignal(signal))
    }

    fn last_cap(&self) -> u32 {
        self.last_cap
    }

    fn capget(&self) -> nix::Result<CapabilitySets> {
        self.record(Call::Capget)?;
        Ok(self.caps)
    }

    fn capset(&self, sets: &CapabilitySets) -> nix::Result<()> {
        self.record(Call::Capset(*sets))
    }

    fn raise_ambient(&self, cap: u32) -> nix::Result<()> {
        self.record(Call::RaiseAmbient(cap))
    }
}
