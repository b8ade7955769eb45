//! # runshare-common
//!
//! Shared types, error definitions, the raw configuration record, and
//! kernel path constants used across the runshare workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and never issues a kernel call that mutates process state.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
