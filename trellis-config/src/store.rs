//! Module-scoped configuration store.
//!
//! A [`ConfigStore`] reads named config files ("app", "middleware", "error",
//! ...) from per-environment directories. The *namespace* selects whose files
//! are read: the application's own `config/` directory, or a module's
//! `<modules_root>/<module>/config/` directory.
//!
//! Lookups never fail. A missing or malformed file, or a missing key, yields
//! the caller's default.

use crate::env::search_order;
use crate::loader::ConfigLoader;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_log::{debug, trace, warn};

/// Key sentinel returning a file's whole contents.
pub const ALL: &str = "ALL";

/// Namespace of the application's own config.
pub const APP_NAMESPACE: &str = "";

/// Pseudo-module name of the framework's built-in handlers. Shares the
/// application's config namespace.
pub const CORE_MODULE: &str = "core";

/// Where config directories live on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// `<app_root>/config`
    pub app_config: PathBuf,
    /// Directory holding one sub-directory per module
    pub modules_root: PathBuf,
}

impl ConfigPaths {
    pub fn new(app_config: impl Into<PathBuf>, modules_root: impl Into<PathBuf>) -> Self {
        Self {
            app_config: app_config.into(),
            modules_root: modules_root.into(),
        }
    }

    /// Config directory of a namespace.
    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        if is_app_namespace(namespace) {
            self.app_config.clone()
        } else {
            self.modules_root.join(namespace).join("config")
        }
    }
}

fn is_app_namespace(namespace: &str) -> bool {
    namespace == APP_NAMESPACE || namespace == CORE_MODULE
}

struct StoreState {
    namespace: String,
    cache: HashMap<(String, String), Value>,
}

/// Per-request configuration store
pub struct ConfigStore {
    paths: ConfigPaths,
    environment: String,
    state: RwLock<StoreState>,
    loads: AtomicUsize,
}

impl ConfigStore {
    pub fn new(paths: ConfigPaths, environment: impl Into<String>) -> Self {
        let environment = environment.into();
        debug!(environment = %environment, config = %paths.app_config.display(), "Creating config store");
        Self {
            paths,
            environment,
            state: RwLock::new(StoreState {
                namespace: APP_NAMESPACE.to_string(),
                cache: HashMap::new(),
            }),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Switch the active namespace. `""` (or `"core"`) selects the application.
    pub fn set_module(&self, name: &str) {
        let namespace = if is_app_namespace(name) {
            APP_NAMESPACE
        } else {
            name
        };
        trace!(namespace = namespace, "Switching config namespace");
        self.state.write().namespace = namespace.to_string();
    }

    /// The active namespace.
    pub fn module(&self) -> String {
        self.state.read().namespace.clone()
    }

    /// Number of config files actually read from disk.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Load `file` for the active namespace into the cache.
    ///
    /// Returns `false` if no environment directory holds a readable file.
    pub fn load(&self, file: &str) -> bool {
        let namespace = self.module();
        let cache_key = (namespace.clone(), file.to_string());
        if self.state.read().cache.contains_key(&cache_key) {
            return true;
        }

        match self.read(&namespace, file) {
            Some(value) => {
                self.state.write().cache.entry(cache_key).or_insert(value);
                true
            }
            None => false,
        }
    }

    /// Read `key` from `file`, loading and caching the file on first use.
    pub fn get(&self, key: &str, file: &str, default: Value) -> Value {
        if !self.load(file) {
            return default;
        }
        let state = self.state.read();
        state
            .cache
            .get(&(state.namespace.clone(), file.to_string()))
            .map(|contents| extract(contents, key, default.clone()))
            .unwrap_or(default)
    }

    /// Typed variant of [`get`](Self::get). A value that does not deserialize
    /// into `T` yields `default`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, file: &str, default: T) -> T {
        match self.get(key, file, Value::Null) {
            Value::Null => default,
            value => serde_json::from_value(value).unwrap_or(default),
        }
    }

    /// Read `key` from `file` straight from disk, bypassing and not touching
    /// the cache.
    pub fn get_without_cache(&self, key: &str, file: &str, default: Value) -> Value {
        let namespace = self.module();
        match self.read(&namespace, file) {
            Some(contents) => extract(&contents, key, default),
            None => default,
        }
    }

    /// Set `key` in the cached copy of `file` for the active namespace.
    ///
    /// Nothing is written to disk.
    pub fn set(&self, file: &str, key: &str, value: Value) {
        self.load(file);
        let mut state = self.state.write();
        let cache_key = (state.namespace.clone(), file.to_string());
        let contents = state
            .cache
            .entry(cache_key)
            .or_insert_with(|| Value::Object(Map::new()));

        if key == ALL {
            *contents = value;
            return;
        }
        if !contents.is_object() {
            *contents = Value::Object(Map::new());
        }
        if let Value::Object(map) = contents {
            map.insert(key.to_string(), value);
        }
    }

    /// Resolve the path of `file` for a namespace, trying the active
    /// environment first and then the fallbacks.
    pub fn locate(&self, namespace: &str, file: &str) -> Option<PathBuf> {
        let base = self.paths.namespace_dir(namespace);
        search_order(&self.environment)
            .into_iter()
            .find_map(|env| ConfigLoader::locate(&base.join(env), file))
    }

    fn read(&self, namespace: &str, file: &str) -> Option<Value> {
        let path = self.locate(namespace, file)?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        read_file(&path)
    }
}

fn read_file(path: &Path) -> Option<Value> {
    let loaded = ConfigLoader::auto(path).and_then(|loader| loader.load_file(path));
    match loaded {
        Ok(value) => {
            trace!(path = %path.display(), "Loaded config file");
            Some(value)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
            None
        }
    }
}

fn extract(contents: &Value, key: &str, default: Value) -> Value {
    if key == ALL {
        return contents.clone();
    }
    contents.get(key).cloned().unwrap_or(default)
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ConfigStore")
            .field("environment", &self.environment)
            .field("namespace", &state.namespace)
            .field("cached_files", &state.cache.len())
            .finish()
    }
}
