//! Validated isolation request.
//!
//! [`IsolationRequest`] is built once from the raw [`UnshareOptions`]
//! record. Every string is parsed and every identity resolved here, so a
//! bad option is reported before any kernel state changes.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use nix::sched::CloneFlags;
use nix::sys::signal::Signal;
use nix::unistd::{Gid, Uid};
use runshare_common::config::UnshareOptions;
use runshare_common::constants::DEFAULT_KILL_SIGNAL;
use runshare_common::error::{Result, RunshareError};
use runshare_common::types::{Propagation, SetgroupsPolicy};

use crate::identity::{resolve_gid, resolve_uid};
use crate::namespace::{NamespaceConfig, NamespaceTargets};

/// A fully parsed, immutable description of the desired isolation.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolationRequest {
    /// Namespaces requested explicitly.
    pub namespaces: NamespaceConfig,
    /// Namespaces to bind-mount onto persistent paths.
    pub targets: NamespaceTargets,
    /// Fork a primary child after entering the namespaces.
    pub fork: bool,
    /// Block until the primary child exits.
    pub wait: bool,
    /// Where to mount a fresh `proc` filesystem.
    pub mount_proc: Option<PathBuf>,
    /// New root directory.
    pub root: Option<PathBuf>,
    /// New working directory.
    pub new_dir: Option<PathBuf>,
    /// Map the caller to root.
    pub map_root_user: bool,
    /// Map the caller to its own pre-unshare IDs.
    pub map_current_user: bool,
    /// Explicit in-namespace UID for the caller.
    pub map_user: Option<Uid>,
    /// Explicit in-namespace GID for the caller.
    pub map_group: Option<Gid>,
    /// Raise permitted capabilities into the ambient set.
    pub keep_caps: bool,
    /// UID to switch to after setup.
    pub set_uid: Option<Uid>,
    /// GID to switch to after setup.
    pub set_gid: Option<Gid>,
    /// Setgroups policy; `None` leaves the control file alone.
    pub set_groups: Option<SetgroupsPolicy>,
    /// Propagation applied to `/` in a new mount namespace.
    pub propagation: Propagation,
    /// Forced boot-time clock offset in seconds.
    pub force_boottime: Option<i64>,
    /// Forced monotonic clock offset in seconds.
    pub force_monotonic: Option<i64>,
    /// Signal delivered to the forked child when its parent dies.
    pub kill_child: Option<Signal>,
}

impl IsolationRequest {
    /// The namespace flag mask, including every implied flag.
    ///
    /// Mounting proc implies a mount namespace, any identity mapping implies
    /// a user namespace, and persisting a namespace implies creating it.
    #[must_use]
    pub fn namespace_flags(&self) -> CloneFlags {
        let mut flags = self.namespaces.clone_flags() | self.targets.clone_flags();
        if self.mount_proc.is_some() {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.map_user.is_some()
            || self.map_group.is_some()
            || self.map_root_user
            || self.map_current_user
        {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        flags
    }

    /// Whether a primary child is forked; arming the kill signal implies it.
    #[must_use]
    pub const fn forks(&self) -> bool {
        self.fork || self.kill_child.is_some()
    }
}

impl TryFrom<&UnshareOptions> for IsolationRequest {
    type Error = RunshareError;

    fn try_from(opts: &UnshareOptions) -> Result<Self> {
        let kill_child = if opts.kill_child {
            Some(parse_signal(
                opts.kill_signal.as_deref().unwrap_or(DEFAULT_KILL_SIGNAL),
            )?)
        } else {
            None
        };

        for (kind, path) in &opts.persist {
            check_path(&format!("{kind} persist target"), path)?;
        }

        Ok(Self {
            namespaces: NamespaceConfig {
                user: opts.clone_newuser,
                cgroup: opts.clone_newcgroup,
                ipc: opts.clone_newipc,
                uts: opts.clone_newuts,
                net: opts.clone_newnet,
                pid: opts.clone_newpid,
                mount: opts.clone_newns,
                time: opts.clone_newtime,
            },
            targets: NamespaceTargets::new(
                opts.persist.iter().map(|(kind, path)| (*kind, path.clone())),
            ),
            fork: opts.fork,
            wait: opts.wait,
            mount_proc: optional_path("mount_proc", opts.mount_proc.as_deref())?,
            root: optional_path("root", opts.root.as_deref())?,
            new_dir: optional_path("new_dir", opts.new_dir.as_deref())?,
            map_root_user: opts.map_root_user,
            map_current_user: opts.map_current_user,
            map_user: opts.map_user.as_deref().map(resolve_uid).transpose()?,
            map_group: opts.map_group.as_deref().map(resolve_gid).transpose()?,
            keep_caps: opts.keep_caps,
            set_uid: opts.set_uid.as_deref().map(resolve_uid).transpose()?,
            set_gid: opts.set_gid.as_deref().map(resolve_gid).transpose()?,
            set_groups: opts
                .set_groups
                .as_deref()
                .map(SetgroupsPolicy::from_str)
                .transpose()?,
            propagation: opts
                .propagation
                .as_deref()
                .map(Propagation::from_str)
                .transpose()?
                .unwrap_or_default(),
            force_boottime: opts.force_boottime,
            force_monotonic: opts.force_monotonic,
            kill_child,
        })
    }
}

fn check_path(what: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(RunshareError::config(format!("{what}: empty path")));
    }
    Ok(())
}

fn optional_path(what: &str, path: Option<&Path>) -> Result<Option<PathBuf>> {
    path.map(|p| check_path(what, p).map(|()| p.to_path_buf()))
        .transpose()
}

/// Parses `KILL`, `SIGKILL` or a signal number.
fn parse_signal(token: &str) -> Result<Signal> {
    if let Ok(num) = token.parse::<i32>() {
        return Signal::try_from(num)
            .map_err(|_| RunshareError::config(format!("unknown signal: {token}")));
    }
    let upper = token.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&name).map_err(|_| RunshareError::config(format!("unknown signal: {token}")))
}
