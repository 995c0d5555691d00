// Environment detection

use std::env;
use std::path::Path;

/// Process variable naming the active environment.
pub const ENV_VAR: &str = "TRELLIS_ENV";

/// Environment used when nothing else is configured.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Directories tried after the active environment, in order.
pub const FALLBACK_ENVIRONMENTS: [&str; 3] = ["production", "development", "default"];

/// Loads `.env` from an application root and resolves the active environment.
pub struct EnvLoader<'a> {
    root: &'a Path,
}

impl<'a> EnvLoader<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    /// Load `<root>/.env` into the process environment if it exists.
    ///
    /// Variables already set in the process take precedence.
    pub fn load_dotenv(&self) -> bool {
        let path = self.root.join(".env");
        path.is_file() && dotenvy::from_path(&path).is_ok()
    }

    /// Resolve the environment name from `TRELLIS_ENV`.
    pub fn environment(&self) -> String {
        self.load_dotenv();
        env::var(ENV_VAR)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }
}

/// Environment directories to search, active first, without duplicates.
pub fn search_order(active: &str) -> Vec<&str> {
    let mut order = vec![active];
    for fallback in FALLBACK_ENVIRONMENTS {
        if !order.contains(&fallback) {
            order.push(fallback);
        }
    }
    order
}
