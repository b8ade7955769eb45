//! Raw configuration record for a single isolation setup.
//!
//! [`UnshareOptions`] is what the argument parser or a JSON file produces.
//! Identity tokens and mode strings are kept verbatim here; they are parsed
//! and resolved when the record is turned into a validated request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunshareError};
use crate::types::NamespaceKind;

/// Every option recognized by the isolation setup, before validation.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnshareOptions {
    /// Request a new user namespace.
    pub clone_newuser: bool,
    /// Request a new cgroup namespace.
    pub clone_newcgroup: bool,
    /// Request a new IPC namespace.
    pub clone_newipc: bool,
    /// Request a new UTS namespace.
    pub clone_newuts: bool,
    /// Request a new network namespace.
    pub clone_newnet: bool,
    /// Request a new PID namespace.
    pub clone_newpid: bool,
    /// Request a new mount namespace.
    pub clone_newns: bool,
    /// Request a new time namespace.
    pub clone_newtime: bool,
    /// Fork a primary child after entering the namespaces.
    pub fork: bool,
    /// Block until the primary child exits.
    pub wait: bool,
    /// Mount a fresh `proc` filesystem at this path.
    pub mount_proc: Option<PathBuf>,
    /// `chroot` into this directory.
    pub root: Option<PathBuf>,
    /// `chdir` into this directory.
    pub new_dir: Option<PathBuf>,
    /// Map the caller to root inside the new user namespace.
    pub map_root_user: bool,
    /// Map the caller to its own effective IDs inside the new user namespace.
    pub map_current_user: bool,
    /// User name or UID the caller is mapped to.
    pub map_user: Option<String>,
    /// Group name or GID the caller is mapped to.
    pub map_group: Option<String>,
    /// Raise permitted capabilities into the ambient set.
    pub keep_caps: bool,
    /// User name or UID to switch to after setup.
    pub set_uid: Option<String>,
    /// Group name or GID to switch to after setup.
    pub set_gid: Option<String>,
    /// `"allow"` or `"deny"`.
    pub set_groups: Option<String>,
    /// `"slave"`, `"private"`, `"shared"` or `"unchanged"`.
    pub propagation: Option<String>,
    /// Boot-time clock offset in seconds for the new time namespace.
    pub force_boottime: Option<i64>,
    /// Monotonic clock offset in seconds for the new time namespace.
    pub force_monotonic: Option<i64>,
    /// Deliver a signal to the forked child when the parent dies.
    pub kill_child: bool,
    /// Signal name or number for `kill_child`; `SIGKILL` when absent.
    pub kill_signal: Option<String>,
    /// Paths the new namespaces are bind-mounted onto so they outlive the process.
    pub persist: BTreeMap<NamespaceKind, PathBuf>,
}

impl UnshareOptions {
    /// Loads options from a JSON document on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// options document.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RunshareError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Applies every option set in `other` on top of `self`.
    ///
    /// Boolean requests are additive; optional values in `other` replace
    /// those in `self`; persistent targets are merged per kind.
    pub fn overlay(&mut self, other: Self) {
        self.clone_newuser |= other.clone_newuser;
        self.clone_newcgroup |= other.clone_newcgroup;
        self.clone_newipc |= other.clone_newipc;
        self.clone_newuts |= other.clone_newuts;
        self.clone_newnet |= other.clone_newnet;
        self.clone_newpid |= other.clone_newpid;
        self.clone_newns |= other.clone_newns;
        self.clone_newtime |= other.clone_newtime;
        self.fork |= other.fork;
        self.wait |= other.wait;
        self.map_root_user |= other.map_root_user;
        self.map_current_user |= other.map_current_user;
        self.keep_caps |= other.keep_caps;
        self.kill_child |= other.kill_child;

        replace_if_some(&mut self.mount_proc, other.mount_proc);
        replace_if_some(&mut self.root, other.root);
        replace_if_some(&mut self.new_dir, other.new_dir);
        replace_if_some(&mut self.map_user, other.map_user);
        replace_if_some(&mut self.map_group, other.map_group);
        replace_if_some(&mut self.set_uid, other.set_uid);
        replace_if_some(&mut self.set_gid, other.set_gid);
        replace_if_some(&mut self.set_groups, other.set_groups);
        replace_if_some(&mut self.propagation, other.propagation);
        replace_if_some(&mut self.force_boottime, other.force_boottime);
        replace_if_some(&mut self.force_monotonic, other.force_monotonic);
        replace_if_some(&mut self.kill_signal, other.kill_signal);

        self.persist.extend(other.persist);
    }
}

fn replace_if_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}
