//! Domain primitive types used across the runshare workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RunshareError;

/// A kernel namespace kind that can be unshared and bound to a persistent path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// User and group ID isolation.
    User,
    /// Cgroup root directory isolation.
    Cgroup,
    /// System V IPC and POSIX message queue isolation.
    Ipc,
    /// Hostname and NIS domain isolation.
    Uts,
    /// Network stack isolation.
    Net,
    /// Process ID isolation.
    Pid,
    /// Mount table isolation.
    #[serde(alias = "mnt")]
    Mount,
    /// Boot-time and monotonic clock isolation.
    Time,
}

impl NamespaceKind {
    /// Every namespace kind, in the order persistent targets are bound.
    pub const ALL: [Self; 8] = [
        Self::User,
        Self::Cgroup,
        Self::Ipc,
        Self::Uts,
        Self::Net,
        Self::Pid,
        Self::Mount,
        Self::Time,
    ];

    /// Entry under `/proc/<pid>/` that refers to this namespace.
    ///
    /// PID and time namespaces only apply to children of the unsharing
    /// process, so their `*_for_children` entries are the ones worth binding.
    #[must_use]
    pub const fn proc_entry(self) -> &'static str {
        match self {
            Self::User => "ns/user",
            Self::Cgroup => "ns/cgroup",
            Self::Ipc => "ns/ipc",
            Self::Uts => "ns/uts",
            Self::Net => "ns/net",
            Self::Pid => "ns/pid_for_children",
            Self::Mount => "ns/mnt",
            Self::Time => "ns/time_for_children",
        }
    }

    /// Short lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Cgroup => "cgroup",
            Self::Ipc => "ipc",
            Self::Uts => "uts",
            Self::Net => "net",
            Self::Pid => "pid",
            Self::Mount => "mount",
            Self::Time => "time",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamespaceKind {
    type Err = RunshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "cgroup" => Ok(Self::Cgroup),
            "ipc" => Ok(Self::Ipc),
            "uts" => Ok(Self::Uts),
            "net" => Ok(Self::Net),
            "pid" => Ok(Self::Pid),
            "mount" | "mnt" => Ok(Self::Mount),
            "time" => Ok(Self::Time),
            other => Err(RunshareError::config(format!(
                "unknown namespace kind: {other}"
            ))),
        }
    }
}

/// Recursive mount-propagation mode applied to `/` in a new mount namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    /// Receive mount events from the parent namespace but do not send any.
    Slave,
    /// Neither send nor receive mount events.
    #[default]
    Private,
    /// Send and receive mount events.
    Shared,
    /// Leave the inherited propagation untouched.
    Unchanged,
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slave => write!(f, "slave"),
            Self::Private => write!(f, "private"),
            Self::Shared => write!(f, "shared"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

impl FromStr for Propagation {
    type Err = RunshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slave" => Ok(Self::Slave),
            "private" => Ok(Self::Private),
            "shared" => Ok(Self::Shared),
            "unchanged" => Ok(Self::Unchanged),
            other => Err(RunshareError::config(format!(
                "unsupported propagation mode: {other}"
            ))),
        }
    }
}

/// Policy written to `/proc/self/setgroups` for a new user namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetgroupsPolicy {
    /// Permit `setgroups(2)` inside the namespace.
    Allow,
    /// Permanently forbid `setgroups(2)` inside the namespace.
    Deny,
}

impl SetgroupsPolicy {
    /// The exact string the kernel expects in the control file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for SetgroupsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SetgroupsPolicy {
    type Err = RunshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(RunshareError::config(format!(
                "unsupported --setgroups argument '{other}'"
            ))),
        }
    }
}
