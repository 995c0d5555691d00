// Error types for the Trellis framework

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Required bootstrap paths or settings are missing. Raised before any
    /// request processing begins.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Dependency injection error: {0}")]
    DependencyInjection(String),

    /// Malformed `Class:method` string, unknown class or unknown method.
    #[error("Handler resolution error: {0}")]
    HandlerResolution(String),

    /// The route engine rejected a declaration.
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status reported when the error escapes the kernel.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Database(_) => 503,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
