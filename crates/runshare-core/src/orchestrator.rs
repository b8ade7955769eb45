//! Namespace setup orchestration.
//!
//! [`setup`] turns one [`IsolationRequest`] into the ordered sequence of
//! kernel calls that builds the isolated environment. The order is fixed:
//!
//! 1. compose the flag mask and resolve identity mapping targets,
//! 2. reject inconsistent requests before touching the kernel,
//! 3. fork the namespace binder helper if a mount namespace must be persisted,
//! 4. `unshare`,
//! 5. write time namespace clock offsets,
//! 6. fork the primary child,
//! 7. persist namespaces from the parent side,
//! 8. return or wait on the parent side,
//! 9. on the occupant side, map IDs, set propagation, change root, mount
//!    proc, switch credentials, and raise ambient capabilities.

use nix::sched::CloneFlags;
use nix::sys::wait::WaitStatus;
use nix::unistd::{ForkResult, Gid, Pid, Uid};
use runshare_common::error::{Result, RunshareError};
use runshare_common::types::{NamespaceKind, SetgroupsPolicy};

use crate::capability::propagate_ambient;
use crate::filesystem::mount::{mount_proc, set_propagation};
use crate::filesystem::root::change_root;
use crate::identity::switch_credentials;
use crate::kernel::{Kernel, wait_uninterrupted};
use crate::namespace::clone_flag;
use crate::namespace::target::{BindHelper, bind_targets};
use crate::namespace::time::{Clock, set_clock_offset};
use crate::namespace::user::{IdMapping, apply_mapping, setgroups_control};
use crate::request::IsolationRequest;

/// Which side of the setup a process ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No primary child was forked; the caller occupies the new namespaces.
    Unforked {
        /// The caller's own process ID.
        pid: Pid,
    },
    /// The caller after forking the primary child.
    Parent {
        /// Process ID of the primary child.
        child: Pid,
        /// The child's exit status, if it was waited for.
        exit_code: Option<i32>,
    },
    /// The forked primary child, occupying the new namespaces.
    Child {
        /// The child's own process ID.
        pid: Pid,
    },
}

impl Outcome {
    /// The child's PID on the parent side, the process's own PID otherwise.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        match *self {
            Self::Unforked { pid } | Self::Child { pid } => pid,
            Self::Parent { child, .. } => child,
        }
    }

    /// Whether this process lives in the new namespaces and should go on to
    /// run the workload.
    #[must_use]
    pub const fn is_occupant(&self) -> bool {
        !matches!(self, Self::Parent { .. })
    }
}

/// Flag mask and mapping targets derived from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPlan {
    /// Flags passed to `unshare`.
    pub flags: CloneFlags,
    /// In-namespace IDs the pre-unshare identity maps to.
    pub mapping: IdMapping,
}

impl SetupPlan {
    /// Derives the plan and validates it against the request.
    ///
    /// `real_euid`/`real_egid` are the caller's IDs before any namespace
    /// change; they become the mapping targets for `map_current_user`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a clock offset is forced without a
    /// time namespace, or if a GID map is combined with `setgroups=allow`.
    pub fn new(request: &IsolationRequest, real_euid: Uid, real_egid: Gid) -> Result<Self> {
        let flags = request.namespace_flags();

        let mut mapping = IdMapping {
            user: request.map_user,
            group: request.map_group,
        };
        if request.map_root_user {
            mapping = IdMapping {
                user: Some(Uid::from_raw(0)),
                group: Some(Gid::from_raw(0)),
            };
        }
        if request.map_current_user {
            mapping = IdMapping {
                user: Some(real_euid),
                group: Some(real_egid),
            };
        }

        let forces_clock = request.force_boottime.is_some() || request.force_monotonic.is_some();
        if forces_clock && !flags.contains(clone_flag(NamespaceKind::Time)) {
            return Err(RunshareError::config(
                "options --monotonic and --boottime require unsharing of a time namespace",
            ));
        }
        if mapping.group.is_some() && request.set_groups == Some(SetgroupsPolicy::Allow) {
            return Err(RunshareError::config(
                "options --setgroups=allow and --map-group are mutually exclusive",
            ));
        }

        Ok(Self { flags, mapping })
    }
}

/// Processes involved in one setup call.
struct ProcessLineage {
    real_euid: Uid,
    real_egid: Gid,
    helper: Option<BindHelper>,
    child: Option<Pid>,
}

/// Performs the full isolation setup described by `request`.
///
/// Returns on both sides of the primary fork. The parent returns at once
/// unless `wait` is set, in which case it returns after the child exits
/// normally.
///
/// # Errors
///
/// Configuration errors are returned before any kernel call. Any other
/// error means the process is partially isolated and should terminate.
pub fn setup<K: Kernel + ?Sized>(kernel: &K, request: &IsolationRequest) -> Result<Outcome> {
    let mut lineage = ProcessLineage {
        real_euid: kernel.geteuid(),
        real_egid: kernel.getegid(),
        helper: None,
        child: None,
    };
    let plan = SetupPlan::new(request, lineage.real_euid, lineage.real_egid)?;
    let mount_ns = plan.flags.contains(CloneFlags::CLONE_NEWNS);
    let last_cap = request.keep_caps.then(|| kernel.last_cap());

    if !request.targets.is_empty() && mount_ns {
        lineage.helper = Some(BindHelper::spawn(
            kernel,
            kernel.getpid(),
            &request.targets,
        )?);
    }

    kernel
        .unshare(plan.flags)
        .map_err(|e| RunshareError::syscall(format!("unshare({:#x})", plan.flags.bits()), e))?;
    tracing::info!(flags = ?plan.flags, "namespaces unshared");

    if let Some(seconds) = request.force_boottime {
        set_clock_offset(kernel, Clock::Boottime, seconds)?;
    }
    if let Some(seconds) = request.force_monotonic {
        set_clock_offset(kernel, Clock::Monotonic, seconds)?;
    }

    let mut in_child = false;
    if request.forks() {
        match kernel
            .fork()
            .map_err(|e| RunshareError::syscall("fork", e))?
        {
            ForkResult::Child => {
                // Only the parent may signal the helper.
                drop(lineage.helper.take());
                in_child = true;
            }
            ForkResult::Parent { child } => {
                tracing::info!(%child, "primary child forked");
                lineage.child = Some(child);
            }
        }
    }

    if !request.targets.is_empty() && !in_child {
        match lineage.helper.take() {
            Some(helper) => helper.release(kernel)?,
            None => bind_targets(kernel, kernel.getpid(), &request.targets)?,
        }
    }

    if let Some(child) = lineage.child {
        if !request.wait {
            return Ok(Outcome::Parent {
                child,
                exit_code: None,
            });
        }
        let code = wait_for_child(kernel, child)?;
        return Ok(Outcome::Parent {
            child,
            exit_code: Some(code),
        });
    }

    configure_occupant(kernel, request, &plan, &lineage, last_cap)?;

    let pid = kernel.getpid();
    Ok(if in_child {
        Outcome::Child { pid }
    } else {
        Outcome::Unforked { pid }
    })
}

/// Step 9: everything done from inside the new namespaces.
fn configure_occupant<K: Kernel + ?Sized>(
    kernel: &K,
    request: &IsolationRequest,
    plan: &SetupPlan,
    lineage: &ProcessLineage,
    last_cap: Option<u32>,
) -> Result<()> {
    if let Some(signal) = request.kill_child {
        kernel
            .set_parent_death_signal(signal)
            .map_err(|e| RunshareError::syscall("prctl(PR_SET_PDEATHSIG)", e))?;
    }

    let gid_mapped = apply_mapping(kernel, plan.mapping, lineage.real_euid, lineage.real_egid)?;

    match request.set_groups {
        // Already denied, and the kernel rejects the file once a GID map exists.
        Some(SetgroupsPolicy::Deny) if gid_mapped => {}
        Some(policy) => setgroups_control(kernel, policy)?,
        None => {}
    }

    if plan.flags.contains(CloneFlags::CLONE_NEWNS) {
        set_propagation(kernel, request.propagation)?;
    }

    let root_changed = change_root(kernel, request.root.as_deref(), request.new_dir.as_deref())?;

    if let Some(target) = &request.mount_proc {
        mount_proc(kernel, target, root_changed, request.propagation)?;
    }

    switch_credentials(kernel, request.set_uid, request.set_gid)?;

    if let Some(last_cap) = last_cap {
        if plan.flags.contains(CloneFlags::CLONE_NEWUSER) {
            propagate_ambient(kernel, last_cap)?;
        }
    }
    Ok(())
}

/// Waits for the primary child and mirrors a fatal signal onto the caller.
fn wait_for_child<K: Kernel + ?Sized>(kernel: &K, child: Pid) -> Result<i32> {
    let status = wait_uninterrupted(kernel, child)
        .map_err(|e| RunshareError::syscall(format!("waitpid({child})"), e))?;
    match status {
        WaitStatus::Exited(_, code) => {
            tracing::info!(%child, code, "primary child exited");
            Ok(code)
        }
        WaitStatus::Signaled(_, signal, _) => {
            tracing::info!(%child, signal = signal.as_str(), "primary child killed, re-raising");
            kernel
                .kill(kernel.getpid(), signal)
                .map_err(|e| RunshareError::syscall(format!("kill(self, {})", signal.as_str()), e))?;
            Err(RunshareError::ChildFailed {
                message: format!("child {child} killed by {}", signal.as_str()),
            })
        }
        other => Err(RunshareError::ChildFailed {
            message: format!("unexpected wait status {other:?}"),
        }),
    }
}
