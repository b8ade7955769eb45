//! End-to-end tests for the setup pipeline on the real kernel.
//!
//! These tests stay within what an unprivileged process may do:
//! 1. Load an options file and validate it into a request
//! 2. Derive the setup plan (flag mask, mapping targets)
//! 3. Reject inconsistent requests before any system call
//! 4. Run a no-op setup against `LinuxKernel`

#![cfg(target_os = "linux")]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;

use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};
use runshare_common::config::UnshareOptions;
use runshare_core::kernel::{Kernel, LinuxKernel};
use runshare_core::orchestrator::{Outcome, SetupPlan, setup};
use runshare_core::request::IsolationRequest;

fn request_from_json(json: &str) -> IsolationRequest {
    let opts: UnshareOptions = serde_json::from_str(json).expect("valid options json");
    IsolationRequest::try_from(&opts).expect("valid request")
}

// ── Configuration ────────────────────────────────────────────────────

#[test]
fn pipeline_options_file_to_plan() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{
            "clone_newpid": true,
            "fork": true,
            "mount_proc": "/proc",
            "map_root_user": true,
            "persist": {{ "uts": "/run/runshare/uts" }}
        }}"#
    )
    .expect("write options");

    let opts = UnshareOptions::from_json_file(file.path()).expect("load options");
    let request = IsolationRequest::try_from(&opts).expect("valid request");
    let plan = SetupPlan::new(&request, Uid::from_raw(1000), Gid::from_raw(1000)).expect("plan");

    assert_eq!(
        plan.flags,
        CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWUSER
            | CloneFlags::CLONE_NEWUTS
    );
    assert_eq!(plan.mapping.user, Some(Uid::from_raw(0)));
    assert_eq!(plan.mapping.group, Some(Gid::from_raw(0)));
    assert!(request.forks());
}

#[test]
fn pipeline_unknown_option_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, r#"{{ "clone_newfoo": true }}"#).expect("write options");
    let err = UnshareOptions::from_json_file(file.path()).expect_err("unknown key");
    assert!(err.is_config(), "{err}");
}

#[test]
fn pipeline_unsupported_propagation_is_rejected() {
    let opts: UnshareOptions =
        serde_json::from_str(r#"{ "clone_newns": true, "propagation": "diagonal" }"#)
            .expect("parses as json");
    let err = IsolationRequest::try_from(&opts).expect_err("bad propagation");
    assert!(err.is_config());
}

// ── Validation ───────────────────────────────────────────────────────

#[test]
fn pipeline_clock_offset_requires_time_namespace() {
    let request = request_from_json(r#"{ "force_boottime": 60 }"#);
    let err = setup(&LinuxKernel::new(), &request).expect_err("no time namespace");
    assert!(err.is_config());

    let request = request_from_json(r#"{ "clone_newtime": true, "force_boottime": 60 }"#);
    assert!(SetupPlan::new(&request, Uid::from_raw(1), Gid::from_raw(1)).is_ok());
}

#[test]
fn pipeline_map_group_conflicts_with_setgroups_allow() {
    let request = request_from_json(r#"{ "map_group": "0", "set_groups": "allow" }"#);
    let err = setup(&LinuxKernel::new(), &request).expect_err("mutually exclusive");
    assert!(err.is_config());
}

#[test]
fn pipeline_map_current_user_targets_real_identity() {
    let request = request_from_json(r#"{ "map_current_user": true, "map_root_user": true }"#);
    let plan = SetupPlan::new(&request, Uid::from_raw(500), Gid::from_raw(600)).expect("plan");
    assert_eq!(plan.mapping.user, Some(Uid::from_raw(500)));
    assert_eq!(plan.mapping.group, Some(Gid::from_raw(600)));
}

// ── Kernel ───────────────────────────────────────────────────────────

#[test]
fn pipeline_empty_request_stays_in_place() {
    let kernel = LinuxKernel::new();
    let outcome = setup(&kernel, &IsolationRequest::default()).expect("no-op setup");
    let own_pid = i32::try_from(std::process::id()).expect("pid fits i32");
    assert_eq!(outcome, Outcome::Unforked {
        pid: nix::unistd::Pid::from_raw(own_pid)
    });
    assert!(outcome.is_occupant());
}

#[test]
fn pipeline_last_cap_is_stable() {
    let kernel = LinuxKernel::new();
    let first = kernel.last_cap();
    assert!(first >= 30);
    assert_eq!(kernel.last_cap(), first);
}
