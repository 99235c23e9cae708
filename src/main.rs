//! binarydist - build and publish binary distributions
//!
//! Drives the packaging pipeline for one or more platforms of the build
//! matrix on this host.
//!
//! ## Commands
//!
//! - `binarydist platforms` - List the configured platforms
//! - `binarydist plan` - Show which steps a run would execute
//! - `binarydist run` - Build, package and publish
//! - `binarydist completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # What would a release branch build on Windows do?
//! binarydist plan package_win64 --branch release-0.6
//!
//! # Build two platforms concurrently
//! binarydist run package_linux64 package_linux32 --config binarydist.yaml
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            if std::env::var("BINARYDIST_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
