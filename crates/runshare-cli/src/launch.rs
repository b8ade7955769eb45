//! Replacing the occupant process with the target program.

use std::convert::Infallible;
use std::ffi::CString;

use anyhow::Context;
use nix::sys::signal::{SigHandler, Signal, signal};
use runshare_common::constants::DEFAULT_SHELL;

/// Builds the argv to execute: `command` if given, otherwise the user's shell.
///
/// # Errors
///
/// Returns an error if an argument contains an interior NUL byte.
pub fn program_argv(command: &[String], shell: Option<String>) -> anyhow::Result<Vec<CString>> {
    if command.is_empty() {
        let shell = shell
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SHELL.to_owned());
        return Ok(vec![CString::new(shell).context("shell path contains a NUL byte")?]);
    }
    command
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<_, _>>()
        .context("argument contains a NUL byte")
}

/// Puts `SIGPIPE` back to its default disposition.
///
/// The Rust runtime ignores it at startup, and an ignored signal stays
/// ignored across `execve(2)`.
///
/// # Errors
///
/// Returns an error if the disposition cannot be changed.
#[allow(unsafe_code)]
pub fn restore_default_signals() -> anyhow::Result<()> {
    // SAFETY: SIG_DFL installs no handler code in this process.
    let _ = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) }
        .context("failed to reset SIGPIPE")?;
    Ok(())
}

/// Executes `argv` through `PATH`. Only returns on failure.
///
/// # Errors
///
/// Returns an error if `argv` is empty, signal dispositions cannot be
/// restored, or `execvp(3)` fails.
pub fn exec(argv: &[CString]) -> anyhow::Result<Infallible> {
    let program = argv.first().context("nothing to execute")?;
    restore_default_signals()?;
    tracing::debug!(program = %program.to_string_lossy(), args = argv.len(), "executing");
    let Err(errno) = nix::unistd::execvp(program, argv);
    Err(anyhow::anyhow!(
        "failed to execute {}: {errno}",
        program.to_string_lossy()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_command_is_used_verbatim() {
        let argv = program_argv(&["ls".into(), "-l".into()], Some("/bin/zsh".into()))
            .expect("argv");
        assert_eq!(argv, vec![CString::from(c"ls"), CString::from(c"-l")]);
    }

    #[test]
    fn empty_command_falls_back_to_shell() {
        let argv = program_argv(&[], Some("/bin/zsh".into())).expect("argv");
        assert_eq!(argv, vec![CString::from(c"/bin/zsh")]);
    }

    #[test]
    fn unset_or_empty_shell_falls_back_to_bin_sh() {
        for shell in [None, Some(String::new())] {
            let argv = program_argv(&[], shell).expect("argv");
            assert_eq!(argv, vec![CString::from(c"/bin/sh")]);
        }
    }

    #[test]
    fn nul_bytes_are_rejected() {
        assert!(program_argv(&["a\0b".into()], None).is_err());
    }

    #[test]
    #[allow(unsafe_code)]
    fn sigpipe_is_back_to_default_before_exec() {
        restore_default_signals().expect("reset");
        // SAFETY: reinstalls SIG_DFL only to read back the previous disposition.
        let previous = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) }.expect("query");
        assert_eq!(previous, SigHandler::SigDfl);
    }

    #[test]
    fn exec_of_missing_program_returns_error() {
        let argv = vec![CString::from(c"/nonexistent/runshare-test-binary")];
        assert!(exec(&argv).is_err());
    }
}
