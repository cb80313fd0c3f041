//! tiletag - command-line exporter for indexed PNG tile maps

use std::process::ExitCode;

use tiletag::cli;

fn main() -> ExitCode {
    cli::run()
}
