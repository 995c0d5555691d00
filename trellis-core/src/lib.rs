// Core library for the Trellis framework
// Request lifecycle kernel: container, modules, routing, middleware and dispatch

pub mod application;
pub mod builtins;
pub mod container;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod http;
pub mod kernel;
pub mod middleware;
pub mod module;
pub mod routing;
pub mod server;
pub mod services;

// Re-export commonly used types
pub use application::{AppPaths, Application, ApplicationBuilder, CommandHandler};
pub use container::{Container, Instance};
pub use dispatcher::{ControllerDispatcher, execute};
pub use error::{Error, Result};
pub use handler::{
    ActionFn, BaseController, Controller, HandlerRef, HandlerRegistry, Middleware, MiddlewareFn,
    RouteArgs,
};
pub use http::{Invocation, Request, Response};
pub use kernel::Kernel;
pub use middleware::{MiddlewareEntry, MiddlewarePart, MiddlewarePipeline, Position};
pub use module::{Installer, ModuleInfo, ModulePlugin, ModuleRegistry, merge_module_config};
pub use routing::{
    RequestOutcome, ResolvedRoute, RouteCache, RouteCollector, RouteEntry, RouteResolver,
    RouteTable,
};
pub use services::{Db, DbConnection, DbDriver, DbSettings, Logger, Profiler, ViewRenderer, Views};
