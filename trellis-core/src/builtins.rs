//! Built-in handlers of the `core` pseudo-module.
//!
//! - `Core\E404Controller::indexAction` renders "not found"
//! - `Core\E405Controller::indexAction` renders "method not allowed" and sets
//!   `Allow` from its route arguments
//! - `Profiler:init` / `Profiler:report` record and log request timings

use crate::container::PROFILER;
use crate::handler::{BaseController, Controller, HandlerRegistry, Middleware, RouteArgs};
use crate::{Container, Error, Profiler, Request, Response};
use serde_json::json;
use std::sync::Arc;

pub const E404_CONTROLLER: &str = "Core\\E404Controller";
pub const E405_CONTROLLER: &str = "Core\\E405Controller";
pub const PROFILER_MIDDLEWARE: &str = "Profiler";

/// Register every built-in handler.
pub fn register_core(handlers: &mut HandlerRegistry) {
    handlers
        .controller::<E404Controller>(E404_CONTROLLER)
        .action("indexAction", E404Controller::index);
    handlers
        .controller::<E405Controller>(E405_CONTROLLER)
        .action("indexAction", E405Controller::index);
    handlers
        .middleware::<ProfilerMiddleware>(PROFILER_MIDDLEWARE)
        .method("init", ProfilerMiddleware::init)
        .method("report", ProfilerMiddleware::report);
}

/// Render an error page in the format the client asked for.
fn render_error(request: Option<&Request>, response: &mut Response, status: u16, message: &str) -> Result<String, Error> {
    response.set_status(status);
    let wants = |mime: &str| request.is_some_and(|r| r.accepts(mime));

    if wants("application/json") {
        response.set_header("Content-Type", "application/json");
        let body = json!({ "error": message, "status": status });
        return serde_json::to_string(&body)
            .map_err(|e| Error::Internal(format!("JSON serialization failed: {}", e)));
    }
    if wants("text/html") {
        response.set_header("Content-Type", "text/html; charset=utf-8");
        return Ok(format!(
            "<!DOCTYPE html>\n<html><head><title>{status} {message}</title></head>\
             <body><h1>{status} {message}</h1></body></html>\n"
        ));
    }
    response.set_header("Content-Type", "text/plain; charset=utf-8");
    Ok(format!("{} {}\n", status, message))
}

pub struct E404Controller {
    base: BaseController,
}

impl Controller for E404Controller {
    fn construct(base: BaseController) -> Result<Self, Error> {
        Ok(Self { base })
    }

    fn base(&self) -> &BaseController {
        &self.base
    }
}

impl E404Controller {
    pub fn index(&mut self, response: &mut Response, _args: &RouteArgs) -> Result<String, Error> {
        let request = self.base.request().ok();
        render_error(request.as_deref(), response, 404, "Not Found")
    }
}

pub struct E405Controller {
    base: BaseController,
}

impl Controller for E405Controller {
    fn construct(base: BaseController) -> Result<Self, Error> {
        Ok(Self { base })
    }

    fn base(&self) -> &BaseController {
        &self.base
    }
}

impl E405Controller {
    pub fn index(&mut self, response: &mut Response, args: &RouteArgs) -> Result<String, Error> {
        if !args.is_empty() {
            response.set_header("Allow", args.values().join(", "));
        }
        let request = self.base.request().ok();
        render_error(request.as_deref(), response, 405, "Method Not Allowed")
    }
}

/// Marks request start and end on the [`Profiler`] service
pub struct ProfilerMiddleware {
    profiler: Option<Arc<Profiler>>,
}

impl Middleware for ProfilerMiddleware {
    fn construct(container: &Container) -> Result<Self, Error> {
        Ok(Self {
            profiler: container.get_as::<Profiler>(PROFILER).ok(),
        })
    }
}

impl ProfilerMiddleware {
    pub fn init(&mut self, response: String) -> Result<String, Error> {
        if let Some(profiler) = &self.profiler {
            profiler.mark("request.start");
        }
        Ok(response)
    }

    pub fn report(&mut self, response: String) -> Result<String, Error> {
        if let Some(profiler) = &self.profiler {
            profiler.mark("request.end");
            profiler.report();
        }
        Ok(response)
    }
}
