// Shared fixtures for kernel tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use trellis_core::{
    BaseController, Container, Controller, Error, HandlerRegistry, Middleware, ModulePlugin,
    Response, RouteArgs, RouteCollector,
};

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Temp application root with an empty `config/production` directory.
pub fn app_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("config/production")).unwrap();
    dir
}

pub struct HomeController {
    base: BaseController,
}

impl Controller for HomeController {
    fn construct(base: BaseController) -> Result<Self, Error> {
        Ok(Self { base })
    }

    fn base(&self) -> &BaseController {
        &self.base
    }
}

impl HomeController {
    pub fn index(&mut self, _response: &mut Response, _args: &RouteArgs) -> Result<String, Error> {
        Ok("home".to_string())
    }

    pub fn stream(&mut self, response: &mut Response, _args: &RouteArgs) -> Result<String, Error> {
        response.write("early;");
        response.set_header("X-Stream", "yes");
        Ok("late".to_string())
    }

    pub fn show(&mut self, _response: &mut Response, args: &RouteArgs) -> Result<String, Error> {
        Ok(format!("post {}", args.named("id").unwrap_or("?")))
    }

    pub fn module(&mut self, _response: &mut Response, _args: &RouteArgs) -> Result<String, Error> {
        Ok(format!("module={}", self.base.modules()?.get_current_module()))
    }
}

/// Appends `[<method>]` to the threaded body.
pub struct Trace;

impl Middleware for Trace {
    fn construct(_container: &Container) -> Result<Self, Error> {
        Ok(Trace)
    }
}

impl Trace {
    pub fn first(&mut self, response: String) -> Result<String, Error> {
        Ok(response + "[first]")
    }

    pub fn second(&mut self, response: String) -> Result<String, Error> {
        Ok(response + "[second]")
    }

    pub fn wrap(&mut self, response: String) -> Result<String, Error> {
        Ok(format!("<{}>", response))
    }
}

pub fn app_handlers(handlers: &mut HandlerRegistry) {
    handlers
        .controller::<HomeController>("HomeController")
        .action("indexAction", HomeController::index)
        .action("streamAction", HomeController::stream)
        .action("showAction", HomeController::show);
    handlers
        .middleware::<Trace>("Trace")
        .method("first", Trace::first)
        .method("second", Trace::second)
        .method("wrap", Trace::wrap);
}

/// A module compiled into the test application as `Blog`.
pub struct Blog;

impl ModulePlugin for Blog {
    fn name(&self) -> &str {
        "Blog"
    }

    fn register(&self, handlers: &mut HandlerRegistry) {
        handlers
            .controller::<HomeController>("Blog\\PostController")
            .action("moduleAction", HomeController::module);
        handlers
            .middleware::<Trace>("Audit")
            .method("init", Trace::second);
    }

    fn routes(&self, routes: &mut RouteCollector) {
        routes.get("/blog/whoami", "Blog\\Post:module");
    }
}
