// Configuration management for the Trellis framework

pub mod env;
pub mod error;
pub mod loader;
pub mod merge;
pub mod store;

pub use env::{DEFAULT_ENVIRONMENT, ENV_VAR, EnvLoader, FALLBACK_ENVIRONMENTS};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use merge::{as_keyed, merge_replace_recursive};
pub use store::{ALL, APP_NAMESPACE, CORE_MODULE, ConfigPaths, ConfigStore};
