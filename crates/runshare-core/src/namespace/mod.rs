//! Linux namespace selection and persistence.
//!
//! [`NamespaceConfig`] records which namespaces were asked for explicitly;
//! [`NamespaceTargets`] records where the new namespaces should be
//! bind-mounted so they outlive the process that created them.

pub mod target;
pub mod time;
pub mod user;

use std::path::{Path, PathBuf};

use nix::sched::CloneFlags;
use runshare_common::types::NamespaceKind;

/// The `CLONE_NEW*` flag selecting a namespace kind.
#[must_use]
pub const fn clone_flag(kind: NamespaceKind) -> CloneFlags {
    match kind {
        NamespaceKind::User => CloneFlags::CLONE_NEWUSER,
        NamespaceKind::Cgroup => CloneFlags::CLONE_NEWCGROUP,
        NamespaceKind::Ipc => CloneFlags::CLONE_NEWIPC,
        NamespaceKind::Uts => CloneFlags::CLONE_NEWUTS,
        NamespaceKind::Net => CloneFlags::CLONE_NEWNET,
        NamespaceKind::Pid => CloneFlags::CLONE_NEWPID,
        NamespaceKind::Mount => CloneFlags::CLONE_NEWNS,
        NamespaceKind::Time => CloneFlags::from_bits_retain(libc::CLONE_NEWTIME),
    }
}

/// Which namespaces were requested explicitly.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate user and group IDs.
    pub user: bool,
    /// Isolate the cgroup root.
    pub cgroup: bool,
    /// Isolate IPC objects.
    pub ipc: bool,
    /// Isolate hostname and domain name.
    pub uts: bool,
    /// Isolate the network stack.
    pub net: bool,
    /// Isolate process IDs.
    pub pid: bool,
    /// Isolate the mount table.
    pub mount: bool,
    /// Isolate boot-time and monotonic clocks.
    pub time: bool,
}

impl NamespaceConfig {
    /// Whether `kind` was requested.
    #[must_use]
    pub const fn contains(&self, kind: NamespaceKind) -> bool {
        match kind {
            NamespaceKind::User => self.user,
            NamespaceKind::Cgroup => self.cgroup,
            NamespaceKind::Ipc => self.ipc,
            NamespaceKind::Uts => self.uts,
            NamespaceKind::Net => self.net,
            NamespaceKind::Pid => self.pid,
            NamespaceKind::Mount => self.mount,
            NamespaceKind::Time => self.time,
        }
    }

    /// Union of the flags of every requested kind.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        NamespaceKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .fold(CloneFlags::empty(), |flags, kind| flags | clone_flag(kind))
    }
}

/// A namespace to bind-mount onto a persistent path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTarget {
    /// Namespace kind being persisted.
    pub kind: NamespaceKind,
    /// Existing file the namespace is bind-mounted onto.
    pub path: PathBuf,
}

impl NamespaceTarget {
    /// `/proc/<pid>/ns/...` entry of `pid` for this target's kind.
    #[must_use]
    pub fn source_for(&self, pid: nix::unistd::Pid) -> PathBuf {
        Path::new("/proc")
            .join(pid.to_string())
            .join(self.kind.proc_entry())
    }
}

/// Caller-owned list of persistent namespace targets, at most one per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceTargets(Vec<NamespaceTarget>);

impl NamespaceTargets {
    /// Builds the list, ordered by kind. A later entry for the same kind
    /// replaces an earlier one.
    pub fn new(targets: impl IntoIterator<Item = (NamespaceKind, PathBuf)>) -> Self {
        let mut list: Vec<NamespaceTarget> = Vec::new();
        for (kind, path) in targets {
            list.retain(|t| t.kind != kind);
            list.push(NamespaceTarget { kind, path });
        }
        list.sort_by_key(|t| t.kind);
        Self(list)
    }

    /// Number of persistent targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no namespace is to be persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the targets in bind order.
    pub fn iter(&self) -> impl Iterator<Item = &NamespaceTarget> {
        self.0.iter()
    }

    /// Flags of every persisted kind; persisting a namespace implies creating it.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        self.iter()
            .fold(CloneFlags::empty(), |flags, t| flags | clone_flag(t.kind))
    }
}

#[cfg(test)]
mod tests {
    use nix::unistd::Pid;

    use super::*;

    #[test]
    fn each_kind_maps_to_a_distinct_flag() {
        let mut seen = CloneFlags::empty();
        for kind in NamespaceKind::ALL {
            let flag = clone_flag(kind);
            assert!(!flag.is_empty());
            assert!(!seen.intersects(flag), "{kind} shares a bit");
            seen |= flag;
        }
    }

    #[test]
    fn time_flag_matches_kernel_constant() {
        assert_eq!(clone_flag(NamespaceKind::Time).bits(), libc::CLONE_NEWTIME);
    }

    #[test]
    fn config_flags_only_contain_requested_kinds() {
        let cfg = NamespaceConfig {
            net: true,
            uts: true,
            ..NamespaceConfig::default()
        };
        assert_eq!(
            cfg.clone_flags(),
            CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWUTS
        );
    }

    #[test]
    fn targets_dedupe_by_kind_and_sort() {
        let targets = NamespaceTargets::new([
            (NamespaceKind::Net, PathBuf::from("/a")),
            (NamespaceKind::User, PathBuf::from("/b")),
            (NamespaceKind::Net, PathBuf::from("/c")),
        ]);
        assert_eq!(targets.len(), 2);
        let kinds: Vec<_> = targets.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![NamespaceKind::User, NamespaceKind::Net]);
        assert_eq!(
            targets.iter().last().map(|t| t.path.clone()),
            Some(PathBuf::from("/c"))
        );
    }

    #[test]
    fn target_source_points_at_proc_entry() {
        let target = NamespaceTarget {
            kind: NamespaceKind::Pid,
            path: PathBuf::from("/run/pidns"),
        };
        assert_eq!(
            target.source_for(Pid::from_raw(77)),
            PathBuf::from("/proc/77/ns/pid_for_children")
        );
    }
}
