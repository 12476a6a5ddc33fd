//! CLI interface to fix file-name case of opened Perforce files
//!
//! # Example:
//! ```bash
//! clear; p4-case-fix list --only-changed
//! clear; p4-case-fix -c my_ws apply -l 1234 --set '3=//depot/Game/Hero.uasset' --submit
//! ```

use clap::Parser;
use p4_case_fix::{Args, app, error::Result, logging};

fn main() -> Result<()> {
        logging::tracing_subscribe_boilerplate("warn");
        let args = Args::parse();

        match app(&args) {
                Ok(()) => Ok(()), // keeps a future app success value from being silently dropped
                Err(e) => {
                        eprintln!("Error: {}", e); // bubbling the error would not pretty-print it
                        std::process::exit(1);
                }
        }
}
