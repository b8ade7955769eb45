//! Kernel pseudo-file paths and protocol constants.

/// UID map of the calling process's user namespace.
pub const PROC_UID_MAP: &str = "/proc/self/uid_map";

/// GID map of the calling process's user namespace.
pub const PROC_GID_MAP: &str = "/proc/self/gid_map";

/// `setgroups(2)` permission gate of the calling process's user namespace.
pub const PROC_SETGROUPS: &str = "/proc/self/setgroups";

/// Clock offsets of the time namespace the calling process's children will join.
pub const PROC_TIMENS_OFFSETS: &str = "/proc/self/timens_offsets";

/// Highest capability number supported by the running kernel.
pub const PROC_CAP_LAST_CAP: &str = "/proc/sys/kernel/cap_last_cap";

/// Byte written to the binder helper's pipe once namespaces are in place.
pub const PIPE_SYNC_BYTE: u8 = 0x06;

/// Signal delivered to the forked child when its parent dies, unless overridden.
pub const DEFAULT_KILL_SIGNAL: &str = "SIGKILL";

/// Application name used in CLI output.
pub const APP_NAME: &str = "runshare";

/// Fallback program executed when neither a command nor `$SHELL` is given.
pub const DEFAULT_SHELL: &str = "/bin/sh";
