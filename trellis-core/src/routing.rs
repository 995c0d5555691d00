//! Route aggregation, matching and the optional route cache.
//!
//! Routes come from the application's `routes` config file, from every
//! enabled module's `routes` file, and from code (application builder and
//! module plugins). They are compiled into a [`RouteTable`] backed by
//! `matchit`, with one router per HTTP method.
//!
//! ```toml
//! # config/production/routes.toml
//! [[routes]]
//! methods = ["GET", "HEAD"]
//! path = "/posts/{id}"
//! handler = "Blog\\Post:show"
//! ```

use crate::container::{CONFIG, MODULES};
use crate::handler::RouteArgs;
use crate::module::{NamespaceGuard, merge_module_config};
use crate::{Container, Error, ModuleRegistry, Request};
use matchit::Router;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use trellis_config::{ALL, APP_NAMESPACE, ConfigStore, as_keyed};
use trellis_log::{debug, info, trace, warn};

/// Handler used when nothing is configured for `error["404"]`.
pub const DEFAULT_NOT_FOUND_HANDLER: &str = "Core\\E404:index";
/// Handler used when nothing is configured for `error["405"]`.
pub const DEFAULT_METHOD_NOT_ALLOWED_HANDLER: &str = "Core\\E405:index";

const CACHE_VERSION: u32 = 1;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// One declared route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub methods: Vec<String>,
    pub path: String,
    pub handler: String,
}

impl RouteEntry {
    pub fn new<M, S>(methods: M, path: impl Into<String>, handler: impl Into<String>) -> Self
    where
        M: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().to_ascii_uppercase())
                .collect(),
            path: path.into(),
            handler: handler.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MethodList {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct DeclaredRoute {
    #[serde(alias = "method")]
    methods: MethodList,
    #[serde(alias = "pattern")]
    path: String,
    handler: String,
}

/// Accumulates route declarations
#[derive(Debug, Clone, Default)]
pub struct RouteCollector {
    routes: Vec<RouteEntry>,
}

impl RouteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, methods: &[&str], path: &str, handler: &str) -> &mut Self {
        self.routes.push(RouteEntry::new(methods.iter(), path, handler));
        self
    }

    pub fn get(&mut self, path: &str, handler: &str) -> &mut Self {
        self.add(&["GET"], path, handler)
    }

    pub fn post(&mut self, path: &str, handler: &str) -> &mut Self {
        self.add(&["POST"], path, handler)
    }

    pub fn put(&mut self, path: &str, handler: &str) -> &mut Self {
        self.add(&["PUT"], path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: &str) -> &mut Self {
        self.add(&["DELETE"], path, handler)
    }

    pub fn extend(&mut self, routes: impl IntoIterator<Item = RouteEntry>) {
        self.routes.extend(routes);
    }

    /// Add the routes of a `routes` config value, a list or keyed map of
    /// `{ methods, path, handler }` tables. Malformed entries are skipped.
    pub fn add_from_config(&mut self, declared: &Value) -> usize {
        let Some(entries) = as_keyed(declared) else {
            if !declared.is_null() {
                warn!("Ignoring routes declaration that is not a list");
            }
            return 0;
        };

        let mut added = 0;
        for (key, entry) in entries {
            match serde_json::from_value::<DeclaredRoute>(entry) {
                Ok(route) => {
                    let methods = match route.methods {
                        MethodList::One(method) => vec![method],
                        MethodList::Many(methods) => methods,
                    };
                    self.routes
                        .push(RouteEntry::new(methods, route.path, route.handler));
                    added += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping malformed route"),
            }
        }
        added
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn into_routes(self) -> Vec<RouteEntry> {
        self.routes
    }
}

/// Result of matching a request against the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Found { handler: String, args: RouteArgs },
    NotFound,
    MethodNotAllowed { allowed: Vec<String> },
}

/// Compiled routes, one matcher per HTTP method
pub struct RouteTable {
    routers: BTreeMap<String, Router<String>>,
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn build(routes: Vec<RouteEntry>) -> Result<Self, Error> {
        let mut routers: BTreeMap<String, Router<String>> = BTreeMap::new();
        for route in &routes {
            for method in &route.methods {
                routers
                    .entry(method.clone())
                    .or_insert_with(Router::new)
                    .insert(route.path.clone(), route.handler.clone())
                    .map_err(|e| {
                        Error::Routing(format!("Cannot register {} {}: {}", method, route.path, e))
                    })?;
            }
        }
        debug!(routes = routes.len(), methods = routers.len(), "Route table built");
        Ok(Self { routers, routes })
    }

    /// Match `method` and `path`. `HEAD` falls back to `GET`.
    pub fn dispatch(&self, method: &str, path: &str) -> RequestOutcome {
        let method = method.to_ascii_uppercase();
        if let Some(outcome) = self.find(&method, path) {
            return outcome;
        }
        if method == "HEAD" {
            if let Some(outcome) = self.find("GET", path) {
                return outcome;
            }
        }

        let allowed: Vec<String> = self
            .routers
            .iter()
            .filter(|(other, router)| **other != method && router.at(path).is_ok())
            .map(|(other, _)| other.clone())
            .collect();
        if allowed.is_empty() {
            RequestOutcome::NotFound
        } else {
            RequestOutcome::MethodNotAllowed { allowed }
        }
    }

    fn find(&self, method: &str, path: &str) -> Option<RequestOutcome> {
        let matched = self.routers.get(method)?.at(path).ok()?;
        let mut args = RouteArgs::new();
        for (name, value) in matched.params.iter() {
            args.push(name, value);
        }
        Some(RequestOutcome::Found {
            handler: matched.value.clone(),
            args,
        })
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .finish()
    }
}

/// `app.routeCache` settings
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCacheSettings {
    pub enabled: bool,
    pub file: PathBuf,
    pub expiry_days: f64,
}

impl RouteCacheSettings {
    pub fn from_config(config: &ConfigStore, app_root: &Path) -> Self {
        let section = config.get("routeCache", "app", Value::Null);
        let file = section
            .get("file")
            .and_then(Value::as_str)
            .unwrap_or("cache/routes.json");
        Self {
            enabled: section.get("enabled").and_then(Value::as_bool).unwrap_or(false),
            file: app_root.join(file),
            expiry_days: section
                .get("expiryDays")
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
        }
    }

    pub fn cache(&self) -> Option<RouteCache> {
        self.enabled
            .then(|| RouteCache::new(self.file.clone(), self.expiry_days))
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    routes: Vec<RouteEntry>,
}

/// File-backed copy of the aggregated route declarations
#[derive(Debug, Clone)]
pub struct RouteCache {
    path: PathBuf,
    expiry_days: f64,
}

impl RouteCache {
    pub fn new(path: impl Into<PathBuf>, expiry_days: f64) -> Self {
        Self {
            path: path.into(),
            expiry_days,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Age of the cache file in days, if it exists.
    pub fn age_days(&self) -> Option<f64> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Some(age / SECONDS_PER_DAY)
    }

    /// Delete the cache file if it is older than the expiry.
    pub fn expire(&self) -> Result<bool, Error> {
        match self.age_days() {
            Some(age) if age > self.expiry_days => {
                fs::remove_file(&self.path)?;
                info!(path = %self.path.display(), age_days = age, "Expired route cache removed");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn load(&self) -> Option<Vec<RouteEntry>> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) if file.version == CACHE_VERSION => Some(file.routes),
            Ok(file) => {
                warn!(path = %self.path.display(), version = file.version, "Ignoring route cache of another version");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt route cache");
                None
            }
        }
    }

    pub fn store(&self, routes: &[RouteEntry]) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = CacheFile {
            version: CACHE_VERSION,
            routes: routes.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::Internal(format!("Cannot serialize route cache: {}", e)))?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), routes = routes.len(), "Route cache written");
        Ok(())
    }
}

/// Build the route table, invoking `define` only when no usable cache exists.
pub fn cached_table<F>(cache: Option<&RouteCache>, define: F) -> Result<RouteTable, Error>
where
    F: FnOnce() -> Result<Vec<RouteEntry>, Error>,
{
    let Some(cache) = cache else {
        return RouteTable::build(define()?);
    };
    if let Some(routes) = cache.load() {
        trace!(path = %cache.path().display(), "Routes loaded from cache");
        return RouteTable::build(routes);
    }
    let routes = define()?;
    cache.store(&routes)?;
    RouteTable::build(routes)
}

/// A route outcome with its effective handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub handler: String,
    pub args: RouteArgs,
    pub status: u16,
}

/// Resolves requests against the routes of the application and its modules
pub struct RouteResolver {
    container: Container,
    base_routes: Arc<Vec<RouteEntry>>,
    cache: Option<RouteCache>,
    table: OnceCell<RouteTable>,
}

impl RouteResolver {
    pub fn new(container: Container, base_routes: Arc<Vec<RouteEntry>>, cache: Option<RouteCache>) -> Self {
        Self {
            container,
            base_routes,
            cache,
            table: OnceCell::new(),
        }
    }

    /// Match a request.
    pub fn dispatch(&self, request: &Request) -> Result<RequestOutcome, Error> {
        let outcome = self.table()?.dispatch(&request.method, &request.path);
        trace!(method = %request.method, path = %request.path, outcome = ?outcome, "Route dispatched");
        Ok(outcome)
    }

    /// Match a request and substitute the configured error handler for any
    /// outcome other than found.
    pub fn process_route(&self, request: &Request) -> Result<ResolvedRoute, Error> {
        let resolved = match self.dispatch(request)? {
            RequestOutcome::Found { handler, args } => ResolvedRoute {
                handler,
                args,
                status: 200,
            },
            RequestOutcome::NotFound => ResolvedRoute {
                handler: self.error_handler(404)?,
                args: RouteArgs::new(),
                status: 404,
            },
            RequestOutcome::MethodNotAllowed { allowed } => ResolvedRoute {
                handler: self.error_handler(405)?,
                args: RouteArgs::from_positional(allowed),
                status: 405,
            },
        };
        Ok(resolved)
    }

    /// Every aggregated route.
    pub fn routes(&self) -> Result<&[RouteEntry], Error> {
        Ok(self.table()?.routes())
    }

    /// Configured handler for an error status, with module overrides applied.
    pub fn error_handler(&self, status: u16) -> Result<String, Error> {
        let config = self.container.get_as::<ConfigStore>(CONFIG)?;
        let modules = self.container.get_as::<ModuleRegistry>(MODULES)?;
        Ok(error_handler(&config, &modules, status))
    }

    fn table(&self) -> Result<&RouteTable, Error> {
        self.table.get_or_try_init(|| {
            if let Some(cache) = &self.cache {
                cache.expire()?;
            }
            cached_table(self.cache.as_ref(), || self.collect())
        })
    }

    fn collect(&self) -> Result<Vec<RouteEntry>, Error> {
        let config = self.container.get_as::<ConfigStore>(CONFIG)?;
        let modules = self.container.get_as::<ModuleRegistry>(MODULES)?;
        let mut collector = RouteCollector::new();

        let _guard = NamespaceGuard::new(&config);
        config.set_module(APP_NAMESPACE);
        collector.add_from_config(&config.get("routes", "routes", Value::Null));
        collector.extend(self.base_routes.iter().cloned());

        for module in modules.get_modules(true) {
            config.set_module(&module);
            let added = collector.add_from_config(&config.get("routes", "routes", Value::Null));
            if let Some(plugin) = modules.plugin(&module) {
                plugin.routes(&mut collector);
            }
            trace!(module = %module, from_config = added, "Module routes collected");
        }
        Ok(collector.into_routes())
    }
}

/// Effective handler for `status` from the merged `error` config.
pub fn error_handler(config: &ConfigStore, modules: &ModuleRegistry, status: u16) -> String {
    let merged = merge_module_config(config, modules, "error", ALL);
    let fallback = match status {
        405 => DEFAULT_METHOD_NOT_ALLOWED_HANDLER,
        _ => DEFAULT_NOT_FOUND_HANDLER,
    };
    merged
        .get(status.to_string())
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}
