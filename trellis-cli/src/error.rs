//! Error types for the Trellis CLI.

use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug, Error)]
pub enum CliError {
    /// IO error (terminal output, sockets, ...)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The application kernel failed
    #[error(transparent)]
    Kernel(#[from] trellis_core::Error),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Command execution error
    #[error("Command error: {0}")]
    Command(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidArgument(_) => 2,
            CliError::Kernel(trellis_core::Error::Configuration(_)) => 78,
            _ => 1,
        }
    }
}
