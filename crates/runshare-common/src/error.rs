//! Unified error type for the runshare workspace.
//!
//! Errors fall into two classes. Configuration errors are raised before any
//! namespace or credential change is attempted, so the process is still
//! pristine when one is returned. Every other variant means the kernel
//! refused a step after mutation may already have begun, and the caller is
//! expected to terminate rather than continue in a half-isolated state.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RunshareError {
    /// A configuration value is invalid or two options conflict.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Reading or writing a file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A system call failed.
    #[error("{call} failed: {source}")]
    Syscall {
        /// Description of the failed call, including its arguments.
        call: String,
        /// Errno reported by the kernel.
        source: Errno,
    },

    /// Persistent namespace binding through the helper process failed.
    #[error("namespace binding failed: {message}")]
    NamespaceBind {
        /// Description of the failure.
        message: String,
    },

    /// The waited-for child did not exit normally.
    #[error("child exit failed: {message}")]
    ChildFailed {
        /// Description of how the child terminated.
        message: String,
    },

    /// A JSON configuration file could not be parsed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl RunshareError {
    /// Builds a [`RunshareError::Config`] from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Builds a [`RunshareError::Syscall`] for the named call.
    pub fn syscall(call: impl Into<String>, source: Errno) -> Self {
        Self::Syscall {
            call: call.into(),
            source,
        }
    }

    /// Returns `true` for errors detected before any kernel mutation.
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Serialization { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RunshareError>;
