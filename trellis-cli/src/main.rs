//! `trellis` - run and administer a Trellis application from its root.

use std::process::ExitCode;

fn main() -> ExitCode {
    trellis_cli::main_with(|builder| builder)
}
