//! Filesystem view of the new mount namespace.
//!
//! Provides recursive propagation control, `/proc` remounting, and the
//! `chroot`/`chdir` root change.

pub mod mount;
pub mod root;
