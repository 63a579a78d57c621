//! `renderd` binary: runs the render daemon in the foreground.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match renderd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed when bootstrap fails.
            writeln!(io::stderr().lock(), "renderd: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
