//! Command-line interface definition.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use runshare_common::config::UnshareOptions;
use runshare_common::constants::{APP_NAME, DEFAULT_KILL_SIGNAL};
use runshare_common::types::NamespaceKind;

/// Run a program with some namespaces unshared from the parent.
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Unshare the user namespace.
    #[arg(short = 'U', long)]
    pub user: bool,

    /// Unshare the cgroup namespace.
    #[arg(short = 'C', long)]
    pub cgroup: bool,

    /// Unshare the IPC namespace.
    #[arg(short = 'i', long)]
    pub ipc: bool,

    /// Unshare the UTS namespace (hostname etc.).
    #[arg(short = 'u', long)]
    pub uts: bool,

    /// Unshare the network namespace.
    #[arg(short = 'n', long)]
    pub net: bool,

    /// Unshare the PID namespace.
    #[arg(short = 'p', long)]
    pub pid: bool,

    /// Unshare the mount namespace.
    #[arg(short = 'm', long)]
    pub mount: bool,

    /// Unshare the time namespace.
    #[arg(short = 'T', long)]
    pub time: bool,

    /// Fork before launching the program.
    #[arg(short = 'f', long)]
    pub fork: bool,

    /// Wait for the forked program and exit with its status.
    #[arg(long)]
    pub wait: bool,

    /// Mount the proc filesystem first (implies --mount).
    #[arg(
        long,
        value_name = "DIR",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "/proc"
    )]
    pub mount_proc: Option<PathBuf>,

    /// Run the program with its root directory set to DIR.
    #[arg(short = 'R', long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Change the working directory to DIR.
    #[arg(short = 'w', long = "wd", value_name = "DIR")]
    pub wd: Option<PathBuf>,

    /// Map the current user to root (implies --user).
    #[arg(short = 'r', long)]
    pub map_root_user: bool,

    /// Map the current user to itself (implies --user).
    #[arg(short = 'c', long)]
    pub map_current_user: bool,

    /// Map the current user to UID or user name (implies --user).
    #[arg(long, value_name = "UID|NAME")]
    pub map_user: Option<String>,

    /// Map the current group to GID or group name (implies --user).
    #[arg(long, value_name = "GID|NAME")]
    pub map_group: Option<String>,

    /// Retain capabilities granted in the user namespace.
    #[arg(long)]
    pub keep_caps: bool,

    /// Set the user ID in the entered namespace.
    #[arg(short = 'S', long = "setuid", value_name = "UID|NAME")]
    pub setuid: Option<String>,

    /// Set the group ID in the entered namespace.
    #[arg(short = 'G', long = "setgid", value_name = "GID|NAME")]
    pub setgid: Option<String>,

    /// Control the setgroups syscall in user namespaces.
    #[arg(long, value_name = "allow|deny")]
    pub setgroups: Option<String>,

    /// Mount propagation for the new mount namespace.
    #[arg(long, value_name = "slave|shared|private|unchanged")]
    pub propagation: Option<String>,

    /// Offset of the monotonic clock in the time namespace.
    #[arg(long, value_name = "SECONDS", allow_negative_numbers = true)]
    pub monotonic: Option<i64>,

    /// Offset of the boot-time clock in the time namespace.
    #[arg(long, value_name = "SECONDS", allow_negative_numbers = true)]
    pub boottime: Option<i64>,

    /// Send SIGNAL to the forked child when the parent dies (implies --fork).
    #[arg(
        long,
        value_name = "SIGNAL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = DEFAULT_KILL_SIGNAL
    )]
    pub kill_child: Option<String>,

    /// Bind the new KIND namespace onto PATH (repeatable).
    #[arg(long, value_name = "KIND=PATH", value_parser = parse_persist)]
    pub persist: Vec<(NamespaceKind, PathBuf)>,

    /// Read options from a JSON file; command-line flags take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit log events as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Program and arguments to run; defaults to `$SHELL`.
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Splits the parsed flags into the options record and the program argv.
    ///
    /// # Errors
    ///
    /// Returns an error if the `--config` file cannot be loaded.
    pub fn into_parts(self) -> anyhow::Result<(UnshareOptions, Vec<String>)> {
        let mut opts = match &self.config {
            Some(path) => UnshareOptions::from_json_file(path)
                .with_context(|| format!("failed to load options from {}", path.display()))?,
            None => UnshareOptions::default(),
        };

        opts.overlay(UnshareOptions {
            clone_newuser: self.user,
            clone_newcgroup: self.cgroup,
            clone_newipc: self.ipc,
            clone_newuts: self.uts,
            clone_newnet: self.net,
            clone_newpid: self.pid,
            clone_newns: self.mount,
            clone_newtime: self.time,
            fork: self.fork,
            wait: self.wait,
            mount_proc: self.mount_proc,
            root: self.root,
            new_dir: self.wd,
            map_root_user: self.map_root_user,
            map_current_user: self.map_current_user,
            map_user: self.map_user,
            map_group: self.map_group,
            keep_caps: self.keep_caps,
            set_uid: self.setuid,
            set_gid: self.setgid,
            set_groups: self.setgroups,
            propagation: self.propagation,
            force_boottime: self.boottime,
            force_monotonic: self.monotonic,
            kill_child: self.kill_child.is_some(),
            kill_signal: self.kill_child,
            persist: self.persist.into_iter().collect(),
        });
        Ok((opts, self.command))
    }
}

/// Parses `KIND=PATH`, e.g. `net=/run/netns/box`.
fn parse_persist(value: &str) -> Result<(NamespaceKind, PathBuf), String> {
    let (kind, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=PATH, got '{value}'"))?;
    if path.is_empty() {
        return Err(format!("empty path in '{value}'"));
    }
    let kind = kind.parse::<NamespaceKind>().map_err(|e| e.to_string())?;
    Ok((kind, PathBuf::from(path)))
}
