//! Request lifecycle.
//!
//! One [`Kernel`] handles exactly one invocation:
//!
//! 1. Init: a new container with `Config` bound
//! 2. Bootstrap: module autoload, then `Db`, `Modules`, `Logger`, `Profiler`
//!    and `Handlers`
//! 3. Before middleware, starting from an empty body
//! 4. Route resolution with 404/405 fallback (skipped for command lines)
//! 5. Controller dispatch, or the command handler for command lines
//! 6. After middleware over the accumulated body
//! 7. `Content-Length` from the final body when `app.sendContentLength` is set

use crate::container::{CONFIG, DB, HANDLERS, LOGGER, MODULES, PROFILER, REQUEST, VIEWS};
use crate::middleware::{MiddlewarePart, MiddlewarePipeline};
use crate::routing::{RouteCache, RouteCacheSettings, RouteEntry, RouteResolver};
use crate::{
    Application, CommandHandler, Container, ControllerDispatcher, Db, Error, Invocation, Logger,
    ModuleRegistry, Profiler, Request, Response, Views,
};
use std::sync::Arc;
use trellis_config::ConfigStore;
use trellis_log::{debug, info, info_span};
use uuid::Uuid;

/// Method recorded on the bound [`Request`] of a command-line invocation.
pub const CLI_METHOD: &str = "CLI";

/// Single-pass request processor
pub struct Kernel {
    container: Container,
    routes: Arc<Vec<RouteEntry>>,
    route_cache: Option<RouteCache>,
    commands: Option<Arc<dyn CommandHandler>>,
}

impl Kernel {
    pub fn new(app: &Application) -> Result<Self, Error> {
        let container = Container::new();

        let config = ConfigStore::new(app.paths().config_paths(), app.environment());
        let route_cache = RouteCacheSettings::from_config(&config, app.paths().root()).cache();
        container.instance(CONFIG, config);

        let modules = app.module_registry();
        let mut handlers = app.handlers().clone();
        let enabled = modules.register_autoload(&mut handlers);

        let driver = app.db_driver();
        container.set(DB, move |c| {
            Ok(Db::from_config(&*c.get_as::<ConfigStore>(CONFIG)?, driver.clone()))
        });
        container.instance(MODULES, modules);
        container.set(LOGGER, |c| Logger::from_config(&*c.get_as::<ConfigStore>(CONFIG)?));
        container.set(PROFILER, |c| {
            Ok(Profiler::from_config(&*c.get_as::<ConfigStore>(CONFIG)?))
        });
        container.instance(HANDLERS, handlers);
        if let Some(renderer) = app.views() {
            container.instance(VIEWS, Views::new(renderer));
        }
        container.get(LOGGER)?;

        debug!(modules = ?enabled, "Kernel bootstrapped");
        Ok(Self {
            container,
            routes: app.routes(),
            route_cache,
            commands: app.commands(),
        })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn config(&self) -> Result<Arc<ConfigStore>, Error> {
        self.container.get_as(CONFIG)
    }

    pub fn modules(&self) -> Result<Arc<ModuleRegistry>, Error> {
        self.container.get_as(MODULES)
    }

    pub fn resolver(&self) -> RouteResolver {
        RouteResolver::new(
            self.container.clone(),
            self.routes.clone(),
            self.route_cache.clone(),
        )
    }

    /// Every route of the application and its enabled modules.
    pub fn routes(&self) -> Result<Vec<RouteEntry>, Error> {
        Ok(self.resolver().routes()?.to_vec())
    }

    /// Run the invocation to completion.
    pub fn run(&self, invocation: Invocation) -> Result<Response, Error> {
        let request = match &invocation {
            Invocation::Http(request) => request.clone(),
            Invocation::Cli(args) => Request::new(CLI_METHOD, format!("/{}", args.join("/"))),
        };
        let span = info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path
        );
        let _enter = span.enter();

        self.container.instance(REQUEST, request.clone());
        let pipeline = MiddlewarePipeline::new(self.container.clone());
        let before = pipeline.run(MiddlewarePart::Before, String::new())?;

        let mut response = match invocation {
            Invocation::Http(_) => {
                let route = self.resolver().process_route(&request)?;
                debug!(handler = %route.handler, status = route.status, "Route resolved");
                ControllerDispatcher::new(self.container.clone()).process_route(&route)?
            }
            Invocation::Cli(args) => {
                let commands = self
                    .commands
                    .as_ref()
                    .ok_or_else(|| Error::Command("No command handler configured".to_string()))?;
                Response::ok().with_body(commands.execute(&self.container, &args)?)
            }
        };

        let body = before + &response.body;
        response.body = pipeline.run(MiddlewarePart::After, body)?;

        if self.config()?.get_as("sendContentLength", "app", true) {
            response.set_content_length();
        }
        info!(status = response.status, length = response.body.len(), "Request complete");
        Ok(response)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("container", &self.container)
            .field("route_cache", &self.route_cache)
            .finish()
    }
}
