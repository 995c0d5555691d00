// Application bootstrapper

use crate::builtins::register_core;
use crate::routing::{RouteCollector, RouteEntry};
use crate::{
    Container, DbDriver, Error, HandlerRegistry, Invocation, Kernel, ModulePlugin, ModuleRegistry,
    Request, Response, ViewRenderer,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trellis_config::{ConfigPaths, EnvLoader};
use trellis_log::{debug, info};

/// Directory name of the application config under the root.
pub const CONFIG_DIR: &str = "config";
/// Default directory name of the modules root under the root.
pub const MODULES_DIR: &str = "modules";

/// Validated filesystem layout of an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
    config: PathBuf,
    modules: PathBuf,
}

impl AppPaths {
    /// Fails with [`Error::Configuration`] if the root or its `config/`
    /// directory is missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Configuration(format!(
                "Application root not found: {}",
                root.display()
            )));
        }
        let config = root.join(CONFIG_DIR);
        if !config.is_dir() {
            return Err(Error::Configuration(format!(
                "Config directory not found: {}",
                config.display()
            )));
        }
        let modules = root.join(MODULES_DIR);
        Ok(Self {
            root,
            config,
            modules,
        })
    }

    pub fn with_modules_root(mut self, modules: impl Into<PathBuf>) -> Self {
        let modules = modules.into();
        self.modules = if modules.is_absolute() {
            modules
        } else {
            self.root.join(modules)
        };
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config
    }

    pub fn modules_root(&self) -> &Path {
        &self.modules
    }

    pub fn config_paths(&self) -> ConfigPaths {
        ConfigPaths::new(&self.config, &self.modules)
    }
}

/// Handles command-line invocations of the kernel
pub trait CommandHandler: Send + Sync {
    fn execute(&self, container: &Container, args: &[String]) -> Result<String, Error>;
}

impl<F> CommandHandler for F
where
    F: Fn(&Container, &[String]) -> Result<String, Error> + Send + Sync,
{
    fn execute(&self, container: &Container, args: &[String]) -> Result<String, Error> {
        self(container, args)
    }
}

/// Everything fixed for the lifetime of the process.
///
/// An `Application` is immutable once built; each request runs on a fresh
/// [`Kernel`] created from it.
pub struct Application {
    paths: AppPaths,
    environment: String,
    handlers: HandlerRegistry,
    plugins: Vec<Arc<dyn ModulePlugin>>,
    routes: Arc<Vec<RouteEntry>>,
    commands: Option<Arc<dyn CommandHandler>>,
    db_driver: Option<Arc<dyn DbDriver>>,
    views: Option<Arc<dyn ViewRenderer>>,
}

impl Application {
    pub fn builder(root: impl Into<PathBuf>) -> ApplicationBuilder {
        ApplicationBuilder::new(root)
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Core and application handlers; module handlers are added per kernel.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn plugins(&self) -> &[Arc<dyn ModulePlugin>] {
        &self.plugins
    }

    /// Routes declared in code by the application.
    pub fn routes(&self) -> Arc<Vec<RouteEntry>> {
        self.routes.clone()
    }

    pub fn commands(&self) -> Option<Arc<dyn CommandHandler>> {
        self.commands.clone()
    }

    pub fn db_driver(&self) -> Option<Arc<dyn DbDriver>> {
        self.db_driver.clone()
    }

    pub fn views(&self) -> Option<Arc<dyn ViewRenderer>> {
        self.views.clone()
    }

    /// A module registry over the modules root, for administrative use.
    pub fn module_registry(&self) -> ModuleRegistry {
        ModuleRegistry::new(self.paths.modules_root(), self.plugins.iter().cloned())
    }

    pub fn kernel(&self) -> Result<Kernel, Error> {
        Kernel::new(self)
    }

    /// Run one HTTP request on a fresh kernel.
    pub fn handle(&self, request: Request) -> Result<Response, Error> {
        self.kernel()?.run(Invocation::Http(request))
    }

    /// Run one command line on a fresh kernel.
    pub fn run_command(&self, args: Vec<String>) -> Result<Response, Error> {
        self.kernel()?.run(Invocation::Cli(args))
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("paths", &self.paths)
            .field("environment", &self.environment)
            .field("handlers", &self.handlers)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    root: PathBuf,
    environment: Option<String>,
    modules_root: Option<PathBuf>,
    handlers: HandlerRegistry,
    plugins: Vec<Arc<dyn ModulePlugin>>,
    routes: RouteCollector,
    commands: Option<Arc<dyn CommandHandler>>,
    db_driver: Option<Arc<dyn DbDriver>>,
    views: Option<Arc<dyn ViewRenderer>>,
}

impl ApplicationBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            environment: None,
            modules_root: None,
            handlers: HandlerRegistry::new(),
            plugins: Vec::new(),
            routes: RouteCollector::new(),
            commands: None,
            db_driver: None,
            views: None,
        }
    }

    /// Use `environment` instead of detecting it from `TRELLIS_ENV`.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Modules root, absolute or relative to the application root.
    pub fn modules_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules_root = Some(path.into());
        self
    }

    /// Register application controllers and middleware.
    pub fn handlers(mut self, register: impl FnOnce(&mut HandlerRegistry)) -> Self {
        register(&mut self.handlers);
        self
    }

    /// Declare application routes in code.
    pub fn routes(mut self, declare: impl FnOnce(&mut RouteCollector)) -> Self {
        declare(&mut self.routes);
        self
    }

    /// Compile in a module.
    pub fn plugin(mut self, plugin: impl ModulePlugin) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn commands(mut self, commands: impl CommandHandler + 'static) -> Self {
        self.commands = Some(Arc::new(commands));
        self
    }

    pub fn db_driver(mut self, driver: impl DbDriver + 'static) -> Self {
        self.db_driver = Some(Arc::new(driver));
        self
    }

    pub fn views(mut self, renderer: impl ViewRenderer + 'static) -> Self {
        self.views = Some(Arc::new(renderer));
        self
    }

    pub fn build(self) -> Result<Application, Error> {
        let mut paths = AppPaths::new(self.root)?;
        if let Some(modules) = self.modules_root {
            paths = paths.with_modules_root(modules);
        }
        let environment = self
            .environment
            .unwrap_or_else(|| EnvLoader::new(paths.root()).environment());

        let mut handlers = HandlerRegistry::new();
        register_core(&mut handlers);
        handlers.merge(&self.handlers);
        debug!(
            controllers = handlers.controllers().len(),
            middleware = handlers.middleware_classes().len(),
            "Handlers registered"
        );

        info!(
            root = %paths.root().display(),
            environment = %environment,
            plugins = self.plugins.len(),
            "Application bootstrap complete"
        );
        Ok(Application {
            paths,
            environment,
            handlers,
            plugins: self.plugins,
            routes: Arc::new(self.routes.into_routes()),
            commands: self.commands,
            db_driver: self.db_driver,
            views: self.views,
        })
    }
}
