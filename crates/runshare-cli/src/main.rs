//! # runshare
//!
//! Runs a program in new Linux namespaces, in the manner of `unshare(1)`.
//! Without a command, the user's shell is started.

mod args;
#[cfg(target_os = "linux")]
mod launch;

use std::process::ExitCode;

use clap::Parser;

use crate::args::Cli;

#[cfg(target_os = "linux")]
fn main() -> anyhow::Result<ExitCode> {
    use runshare_core::kernel::LinuxKernel;
    use runshare_core::orchestrator::{Outcome, setup};
    use runshare_core::request::IsolationRequest;

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let (opts, command) = cli.into_parts()?;
    let request = IsolationRequest::try_from(&opts)?;
    // Prepared before setup so a bad argument fails in the caller, not the child.
    let argv = launch::program_argv(&command, std::env::var("SHELL").ok())?;

    match setup(&LinuxKernel::new(), &request)? {
        Outcome::Parent {
            exit_code: Some(code),
            ..
        } => Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))),
        Outcome::Parent { child, .. } => {
            tracing::info!(%child, "child left running");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Unforked { .. } | Outcome::Child { .. } => match launch::exec(&argv)? {},
    }
}

/// Stub for non-Linux platforms.
#[cfg(not(target_os = "linux"))]
fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    anyhow::bail!("Linux required for namespace operations")
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
