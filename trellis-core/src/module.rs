//! Module discovery and enablement.
//!
//! A module is a directory under the modules root. It may carry its own
//! `config/` tree (routes, middleware, error handlers, ...) and may be backed
//! by a compiled-in [`ModulePlugin`] that registers controllers and
//! middleware. A `.disabled` marker file in the directory disables it.
//!
//! ```text
//! modules/
//!   Blog/
//!     config/production/routes.toml
//!     config/production/middleware.toml
//!   Shop/
//!     .disabled
//!     config/...
//! ```
//!
//! Modules are always processed in ascending name order, so "last module
//! wins" during config merging is deterministic.

use crate::{Container, Error, HandlerRegistry, RouteCollector};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trellis_config::{APP_NAMESPACE, CORE_MODULE, ConfigStore, merge_replace_recursive};
use trellis_log::{debug, info, trace, warn};

/// Marker file that disables a module.
pub const DISABLED_MARKER: &str = ".disabled";

/// Path segment that introduces a module name in a class identifier.
pub const MODULES_SEGMENT: &str = "modules";

/// Leading segments identifying the framework's own classes.
const CORE_SEGMENTS: [&str; 2] = ["trellis_core", "Core"];

/// A module compiled into the application.
pub trait ModulePlugin: Send + Sync + 'static {
    /// System name; matches the module's directory name.
    fn name(&self) -> &str;

    /// Register the module's controllers and middleware.
    fn register(&self, handlers: &mut HandlerRegistry);

    /// Declare routes in code, in addition to the module's routes file.
    fn routes(&self, _routes: &mut RouteCollector) {}

    /// Install/uninstall hooks run by administrative tooling.
    fn installer(&self) -> Option<Box<dyn Installer>> {
        None
    }
}

/// Lifecycle hooks of a module, invoked from the command line only.
pub trait Installer: Send {
    fn install(&self, container: &Container) -> Result<(), Error>;
    fn uninstall(&self, container: &Container) -> Result<(), Error>;
    fn update(&self, container: &Container) -> Result<(), Error>;
}

/// What discovery learned about one module directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub path: PathBuf,
    pub enabled: bool,
}

/// Registry of the modules found under the modules root
pub struct ModuleRegistry {
    root: PathBuf,
    plugins: BTreeMap<String, Arc<dyn ModulePlugin>>,
    discovered: RwLock<Option<BTreeMap<String, ModuleInfo>>>,
    current: RwLock<String>,
}

impl ModuleRegistry {
    pub fn new<I>(root: impl Into<PathBuf>, plugins: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ModulePlugin>>,
    {
        let plugins = plugins
            .into_iter()
            .map(|plugin| (plugin.name().to_string(), plugin))
            .collect();
        Self {
            root: root.into(),
            plugins,
            discovered: RwLock::new(None),
            current: RwLock::new(APP_NAMESPACE.to_string()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the enabled set and wire each enabled module's plugin into
    /// `handlers`. Returns the enabled module names.
    pub fn register_autoload(&self, handlers: &mut HandlerRegistry) -> Vec<String> {
        let modules = self.discover();
        let enabled: Vec<String> = modules
            .values()
            .filter(|m| m.enabled)
            .map(|m| m.name.clone())
            .collect();

        for name in &enabled {
            if let Some(plugin) = self.plugins.get(name) {
                handlers.scoped(name, |h| plugin.register(h));
                trace!(module = %name, "Module handlers registered");
            }
        }

        *self.discovered.write() = Some(modules);
        debug!(count = enabled.len(), modules = ?enabled, "Modules autoloaded");
        enabled
    }

    /// Module names in processing order.
    pub fn get_modules(&self, enabled_only: bool) -> Vec<String> {
        self.with_discovered(|modules| {
            modules
                .values()
                .filter(|m| m.enabled || !enabled_only)
                .map(|m| m.name.clone())
                .collect()
        })
    }

    pub fn exists(&self, name: &str, enabled_only: bool) -> bool {
        self.with_discovered(|modules| {
            modules
                .get(name)
                .is_some_and(|m| m.enabled || !enabled_only)
        })
    }

    pub fn info(&self, name: &str) -> Option<ModuleInfo> {
        self.with_discovered(|modules| modules.get(name).cloned())
    }

    /// Record which module the controller identified by `class` belongs to.
    pub fn set_current_module(&self, class: &str) {
        let module = module_for_class(class);
        trace!(class = class, module = %module, "Current module set");
        *self.current.write() = module;
    }

    /// Module of the most recently constructed controller; `""` for the
    /// application, `"core"` for framework built-ins.
    pub fn get_current_module(&self) -> String {
        self.current.read().clone()
    }

    /// Name of the module containing `path`, if it lies under the modules root.
    pub fn get_module_system_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .map(str::to_string)
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<dyn ModulePlugin>> {
        self.plugins.get(name).cloned()
    }

    /// Names of the compiled-in plugins.
    pub fn installed_plugins(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Remove the disable marker of `name`.
    pub fn enable(&self, name: &str) -> Result<(), Error> {
        let marker = self.module_dir(name)?.join(DISABLED_MARKER);
        if marker.exists() {
            fs::remove_file(&marker)?;
        }
        *self.discovered.write() = None;
        info!(module = name, "Module enabled");
        Ok(())
    }

    /// Create the disable marker of `name`.
    pub fn disable(&self, name: &str) -> Result<(), Error> {
        let marker = self.module_dir(name)?.join(DISABLED_MARKER);
        fs::write(&marker, b"")?;
        *self.discovered.write() = None;
        info!(module = name, "Module disabled");
        Ok(())
    }

    fn module_dir(&self, name: &str) -> Result<PathBuf, Error> {
        let dir = self.root.join(name);
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) || !dir.is_dir() {
            return Err(Error::Configuration(format!("Unknown module: {}", name)));
        }
        Ok(dir)
    }

    fn with_discovered<R>(&self, f: impl FnOnce(&BTreeMap<String, ModuleInfo>) -> R) -> R {
        if let Some(modules) = self.discovered.read().as_ref() {
            return f(modules);
        }
        let modules = self.discover();
        let result = f(&modules);
        *self.discovered.write() = Some(modules);
        result
    }

    fn discover(&self) -> BTreeMap<String, ModuleInfo> {
        let mut modules = BTreeMap::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "No modules directory");
                return modules;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %path.display(), "Skipping module with non UTF-8 name");
                continue;
            };
            if name.starts_with('.') || !path.is_dir() {
                continue;
            }
            // `core` config resolves to the application's own directory.
            if name == CORE_MODULE {
                warn!(path = %path.display(), "Ignoring module with reserved name");
                continue;
            }

            let recognised = path.join("config").is_dir() || self.plugins.contains_key(&name);
            let enabled = recognised && !path.join(DISABLED_MARKER).exists();
            modules.insert(
                name.clone(),
                ModuleInfo {
                    name,
                    path,
                    enabled,
                },
            );
        }
        modules
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("root", &self.root)
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("current", &*self.current.read())
            .finish()
    }
}

/// Derive the owning module from a class identifier such as
/// `my_app::modules::blog::PostController` or `App\Modules\Blog\Post`.
pub fn module_for_class(class: &str) -> String {
    let normalized = class.replace("::", "/").replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(pos) = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case(MODULES_SEGMENT))
    {
        if let Some(module) = segments.get(pos + 1) {
            return module.to_string();
        }
    }
    match segments.first() {
        Some(first) if CORE_SEGMENTS.contains(first) => CORE_MODULE.to_string(),
        _ => APP_NAMESPACE.to_string(),
    }
}

/// Restores the application namespace of a [`ConfigStore`] when dropped.
pub(crate) struct NamespaceGuard<'a> {
    config: &'a ConfigStore,
}

impl<'a> NamespaceGuard<'a> {
    pub(crate) fn new(config: &'a ConfigStore) -> Self {
        Self { config }
    }
}

impl Drop for NamespaceGuard<'_> {
    fn drop(&mut self) {
        self.config.set_module(APP_NAMESPACE);
    }
}

/// Read `key` of `file` from the application, then merge each enabled
/// module's fresh copy over it in registry order.
pub fn merge_module_config(
    config: &ConfigStore,
    modules: &ModuleRegistry,
    file: &str,
    key: &str,
) -> Value {
    config.set_module(APP_NAMESPACE);
    let mut merged = config.get(key, file, Value::Null);

    let _guard = NamespaceGuard::new(config);
    for module in modules.get_modules(true) {
        config.set_module(&module);
        let declared = config.get_without_cache(key, file, Value::Null);
        if declared.is_null() {
            continue;
        }
        trace!(module = %module, file = file, key = key, "Merging module config");
        merged = merge_replace_recursive(&merged, &declared);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_config::ConfigPaths;

    struct Audit;

    impl crate::Middleware for Audit {
        fn construct(_container: &Container) -> Result<Self, Error> {
            Ok(Audit)
        }
    }

    struct Blog;

    impl ModulePlugin for Blog {
        fn name(&self) -> &str {
            "Blog"
        }

        fn register(&self, handlers: &mut HandlerRegistry) {
            handlers
                .middleware::<Audit>("BlogAudit")
                .method("init", |_, response| Ok(response));
        }
    }

    fn layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let modules = dir.path().join("modules");
        fs::create_dir_all(modules.join("Alpha/config")).unwrap();
        fs::create_dir_all(modules.join("Blog")).unwrap();
        fs::create_dir_all(modules.join("Shop/config")).unwrap();
        fs::write(modules.join("Shop").join(DISABLED_MARKER), b"").unwrap();
        fs::create_dir_all(modules.join("Empty")).unwrap();
        fs::create_dir_all(modules.join(".git")).unwrap();
        dir
    }

    fn registry(root: &Path) -> ModuleRegistry {
        let plugins: Vec<Arc<dyn ModulePlugin>> = vec![Arc::new(Blog)];
        ModuleRegistry::new(root.join("modules"), plugins)
    }

    #[test]
    fn test_enablement() {
        let dir = layout();
        let modules = registry(dir.path());

        assert_eq!(modules.get_modules(true), vec!["Alpha", "Blog"]);
        assert_eq!(modules.get_modules(false), vec!["Alpha", "Blog", "Empty", "Shop"]);
        assert!(modules.exists("Shop", false));
        assert!(!modules.exists("Shop", true));
        assert!(!modules.exists("Empty", true));
    }

    #[test]
    fn test_autoload_registers_enabled_plugins() {
        let dir = layout();
        let modules = registry(dir.path());
        let mut handlers = HandlerRegistry::new();

        let enabled = modules.register_autoload(&mut handlers);
        assert_eq!(enabled, vec!["Alpha", "Blog"]);
        assert!(handlers.has_middleware("BlogAudit"));

        fs::write(dir.path().join("modules/Blog").join(DISABLED_MARKER), b"").unwrap();
        let mut handlers = HandlerRegistry::new();
        registry(dir.path()).register_autoload(&mut handlers);
        assert!(!handlers.has_middleware("BlogAudit"));
    }

    #[test]
    fn test_enable_disable_toggle_marker() {
        let dir = layout();
        let modules = registry(dir.path());

        modules.enable("Shop").unwrap();
        assert!(modules.exists("Shop", true));
        modules.disable("Alpha").unwrap();
        assert!(!modules.exists("Alpha", true));
        assert!(dir.path().join("modules/Alpha").join(DISABLED_MARKER).exists());
        assert!(modules.disable("Missing").is_err());
        assert!(modules.enable("../etc").is_err());
    }

    #[test]
    fn test_core_directory_is_not_a_module() {
        let dir = layout();
        let modules_dir = dir.path().join("modules");
        fs::create_dir_all(modules_dir.join(CORE_MODULE).join("config")).unwrap();
        let modules = registry(dir.path());

        assert_eq!(modules.get_modules(false), vec!["Alpha", "Blog", "Empty", "Shop"]);
        assert!(!modules.exists(CORE_MODULE, false));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let modules = ModuleRegistry::new("/definitely/not/here", Vec::new());
        assert!(modules.get_modules(false).is_empty());
    }

    #[test]
    fn test_module_for_class() {
        assert_eq!(module_for_class("my_app::modules::Blog::PostController"), "Blog");
        assert_eq!(module_for_class("App\\Modules\\Shop\\Controller\\Cart"), "Shop");
        assert_eq!(module_for_class("trellis_core::builtins::E404Controller"), CORE_MODULE);
        assert_eq!(module_for_class("Core\\E404Controller"), CORE_MODULE);
        assert_eq!(module_for_class("my_app::controllers::Home"), APP_NAMESPACE);
        assert_eq!(module_for_class("my_app::modules"), APP_NAMESPACE);
    }

    #[test]
    fn test_current_module() {
        let modules = ModuleRegistry::new("/srv/app/modules", Vec::new());
        assert_eq!(modules.get_current_module(), APP_NAMESPACE);
        modules.set_current_module("site::modules::Blog::PostController");
        assert_eq!(modules.get_current_module(), "Blog");
    }

    #[test]
    fn test_module_system_name() {
        let modules = ModuleRegistry::new("/srv/app/modules", Vec::new());
        assert_eq!(
            modules.get_module_system_name(Path::new("/srv/app/modules/Blog/config/x.toml")),
            Some("Blog".to_string())
        );
        assert_eq!(modules.get_module_system_name(Path::new("/srv/app/config")), None);
    }

    #[test]
    fn test_merge_module_config_last_module_wins() {
        let dir = layout();
        let root = dir.path();
        let write = |rel: &str, body: &str| {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        };
        write(
            "config/production/middleware.toml",
            "[afterMiddleware]\n0 = \"App:first\"\n1000 = \"App:last\"\n",
        );
        write(
            "modules/Alpha/config/production/middleware.toml",
            "[afterMiddleware]\n1000 = \"Alpha:last\"\n",
        );
        write(
            "modules/Blog/config/production/middleware.toml",
            "[afterMiddleware]\n1000 = \"Blog:last\"\n",
        );

        let config = ConfigStore::new(
            ConfigPaths::new(root.join("config"), root.join("modules")),
            "production",
        );
        let modules = registry(root);
        let merged = merge_module_config(&config, &modules, "middleware", "afterMiddleware");

        assert_eq!(merged, json!({ "0": "App:first", "1000": "Blog:last" }));
        assert_eq!(config.module(), APP_NAMESPACE);
    }
}
