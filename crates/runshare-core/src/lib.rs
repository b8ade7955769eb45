//! # runshare-core
//!
//! Linux namespace setup for the `runshare` launcher.
//!
//! The entry point is [`orchestrator::setup`], which takes a validated
//! [`request::IsolationRequest`] and drives the kernel through the
//! `unshare(2)`, fork, identity mapping, mount and capability steps in a
//! fixed order. Every system call goes through the [`kernel::Kernel`]
//! trait so the sequence itself can be tested without privileges.
//!
//! All unsafe system calls live in [`kernel::LinuxKernel`] with
//! `// SAFETY:` documentation.
//!
//! The crate is empty on anything but Linux.

#![cfg(target_os = "linux")]

pub mod capability;
pub mod filesystem;
pub mod identity;
pub mod kernel;
pub mod namespace;
pub mod orchestrator;
pub mod request;
