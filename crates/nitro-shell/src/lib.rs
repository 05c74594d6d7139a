//! The `nitro` shell
//!
//! A thin command-line front end for `nitro-jsc-core`: run scripts given
//! with `-e`/`-f` or as a positional argument, then optionally drop into a
//! prompt sharing the same context.

pub mod cli;
pub mod repl;
pub mod shell;

#[cfg(test)]
mod testing;

use anyhow::Result;
use std::io;
use std::process::ExitCode;

pub use cli::{Invocation, Source};
pub use shell::{Outcome, Shell};

/// Run an invocation against the process's standard streams
pub fn run(invocation: &Invocation) -> Result<ExitCode> {
    let shell = Shell::new(&invocation.arguments)?;
    let outcome = shell.run_queue(&invocation.queue)?;

    if invocation.interactive {
        repl::run(&shell, io::stdin().lock(), io::stdout())?;
        return Ok(ExitCode::SUCCESS);
    }

    Ok(match outcome {
        Outcome::Completed => ExitCode::SUCCESS,
        Outcome::Threw => ExitCode::FAILURE,
    })
}
