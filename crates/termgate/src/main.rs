//! CLI entrypoint for termgate.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use anyhow::Result;
use termgate::Program;

fn main() -> Result<()> {
    let program = Program::new();
    let exit_code = program.run()?;
    std::process::exit(exit_code);
}
