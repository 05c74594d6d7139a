//! `nitro` - run JavaScript on the system JavaScriptCore

use nitro_shell::Invocation;
use std::process::ExitCode;
use tracing_subscriber::filter::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let invocation = match Invocation::from_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => err.exit(),
    };

    match nitro_shell::run(&invocation) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("nitro: {err:#}");
            ExitCode::FAILURE
        }
    }
}
