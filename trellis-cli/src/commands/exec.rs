//! Kernel command-line invocation

use crate::error::CliResult;
use std::io::Write;
use trellis_core::Application;

/// Run `args` through the kernel and print the resulting body.
pub fn execute(app: &Application, args: &[String], out: &mut dyn Write) -> CliResult<()> {
    let response = app.run_command(args.to_vec())?;
    out.write_all(response.body.as_bytes())?;
    if !response.body.ends_with('\n') && !response.body.is_empty() {
        writeln!(out)?;
    }
    Ok(())
}
