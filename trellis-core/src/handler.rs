//! Handler strings and the registration table behind them.
//!
//! Routes, error handlers and middleware name their targets with
//! `"Class:method"` strings. Instead of resolving those names to symbols at
//! runtime, every controller and middleware class is registered up front in a
//! [`HandlerRegistry`] together with a typed callable per action.
//!
//! ```ignore
//! let mut handlers = HandlerRegistry::new();
//! handlers
//!     .controller::<PostController>("Blog\\PostController")
//!     .action("showAction", PostController::show);
//! handlers
//!     .middleware::<Audit>("Audit")
//!     .method("init", Audit::init);
//! ```
//!
//! A route handler `"Blog\Post:show"` then expands to class
//! `Blog\PostController` and action `showAction`.

use crate::container::{CONFIG, DB, MODULES, REQUEST, VIEWS};
use crate::module::module_for_class;
use crate::{Container, Db, Error, ModuleRegistry, Request, Response, Views};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use trellis_config::ConfigStore;
use trellis_log::trace;

/// Suffix appended to the class part of a route handler.
pub const CONTROLLER_SUFFIX: &str = "Controller";
/// Suffix appended to the method part of a route handler.
pub const ACTION_SUFFIX: &str = "Action";

/// A parsed `"Class:method"` string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerRef {
    pub class: String,
    pub method: String,
}

impl HandlerRef {
    pub fn parse(handler: &str) -> Result<Self, Error> {
        match handler.split_once(':') {
            Some((class, method)) if !class.is_empty() && !method.is_empty() => Ok(Self {
                class: class.to_string(),
                method: method.to_string(),
            }),
            _ => Err(Error::HandlerResolution(format!(
                "Invalid handler string: {:?}",
                handler
            ))),
        }
    }

    /// `Name` -> `NameController`
    pub fn controller_class(&self) -> String {
        format!("{}{}", self.class, CONTROLLER_SUFFIX)
    }

    /// `index` -> `indexAction`
    pub fn action_method(&self) -> String {
        format!("{}{}", self.method, ACTION_SUFFIX)
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.method)
    }
}

/// Arguments passed to a controller action, in match order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteArgs(Vec<(String, String)>);

impl RouteArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments without names; each is keyed by its index.
    pub fn from_positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.into()))
                .collect(),
        )
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Positional access.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(|(_, v)| v.as_str())
    }

    /// Access by route parameter name.
    pub fn named(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> Vec<&str> {
        self.0.iter().map(|(_, v)| v.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Capability contract of a controller.
///
/// Only types implementing this trait can be registered as controllers, so a
/// registered class is always a genuine controller.
pub trait Controller: Sized + Send + 'static {
    /// Build the controller around its base collaborators.
    fn construct(base: BaseController) -> Result<Self, Error>;

    fn base(&self) -> &BaseController;
}

/// Contract of a middleware class: constructible from the container alone.
pub trait Middleware: Sized + Send + 'static {
    fn construct(container: &Container) -> Result<Self, Error>;
}

/// A registered controller action, constructing its controller per call.
pub type ActionFn =
    Arc<dyn Fn(&Container, &mut Response, &RouteArgs) -> Result<String, Error> + Send + Sync>;

/// A registered middleware method, threading the response body.
pub type MiddlewareFn = Arc<dyn Fn(&Container, String) -> Result<String, Error> + Send + Sync>;

#[derive(Clone)]
struct ControllerClass {
    identifier: String,
    type_name: &'static str,
    actions: HashMap<String, ActionFn>,
}

#[derive(Clone)]
struct MiddlewareClass {
    type_name: &'static str,
    methods: HashMap<String, MiddlewareFn>,
}

/// Registration table of controllers and middleware
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    controllers: HashMap<String, ControllerClass>,
    middleware: HashMap<String, MiddlewareClass>,
    owner: Option<String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register controller `C` under `class`.
    pub fn controller<C: Controller>(&mut self, class: &str) -> ControllerBuilder<'_, C> {
        let identifier = match &self.owner {
            Some(module) if module_for_class(class) != *module => {
                format!("modules\\{}\\{}", module, class)
            }
            _ => class.to_string(),
        };
        self.controllers
            .entry(class.to_string())
            .or_insert_with(|| ControllerClass {
                identifier,
                type_name: std::any::type_name::<C>(),
                actions: HashMap::new(),
            });
        trace!(class = class, "Controller registered");
        ControllerBuilder {
            registry: self,
            class: class.to_string(),
            _controller: PhantomData,
        }
    }

    /// Register middleware `M` under `class`.
    pub fn middleware<M: Middleware>(&mut self, class: &str) -> MiddlewareBuilder<'_, M> {
        self.middleware
            .entry(class.to_string())
            .or_insert_with(|| MiddlewareClass {
                type_name: std::any::type_name::<M>(),
                methods: HashMap::new(),
            });
        trace!(class = class, "Middleware registered");
        MiddlewareBuilder {
            registry: self,
            class: class.to_string(),
            _middleware: PhantomData,
        }
    }

    /// Run `register` with every controller it adds attributed to `module`.
    pub fn scoped(&mut self, module: &str, register: impl FnOnce(&mut Self)) {
        let previous = self.owner.replace(module.to_string());
        register(self);
        self.owner = previous;
    }

    /// Look up `method` of controller `class`.
    pub fn action(&self, class: &str, method: &str) -> Result<ActionFn, Error> {
        let controller = self.controllers.get(class).ok_or_else(|| {
            Error::HandlerResolution(format!("Controller class not found: {}", class))
        })?;
        controller.actions.get(method).cloned().ok_or_else(|| {
            Error::HandlerResolution(format!(
                "Action {} not found on {} ({})",
                method, class, controller.type_name
            ))
        })
    }

    /// Look up `method` of middleware `class`.
    pub fn middleware_method(&self, class: &str, method: &str) -> Result<MiddlewareFn, Error> {
        let middleware = self.middleware.get(class).ok_or_else(|| {
            Error::HandlerResolution(format!("Middleware class not found: {}", class))
        })?;
        middleware.methods.get(method).cloned().ok_or_else(|| {
            Error::HandlerResolution(format!(
                "Method {} not found on middleware {} ({})",
                method, class, middleware.type_name
            ))
        })
    }

    pub fn has_controller(&self, class: &str) -> bool {
        self.controllers.contains_key(class)
    }

    pub fn has_middleware(&self, class: &str) -> bool {
        self.middleware.contains_key(class)
    }

    /// Fully qualified identifier of a registered controller class.
    pub fn identifier(&self, class: &str) -> Option<&str> {
        self.controllers.get(class).map(|c| c.identifier.as_str())
    }

    /// Registered controller class names, sorted.
    pub fn controllers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.controllers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered middleware class names, sorted.
    pub fn middleware_classes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.middleware.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Copy every registration of `other` into `self`; `other` wins on clashes.
    pub fn merge(&mut self, other: &HandlerRegistry) {
        for (class, controller) in &other.controllers {
            let entry = self
                .controllers
                .entry(class.clone())
                .or_insert_with(|| controller.clone());
            entry
                .actions
                .extend(controller.actions.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        for (class, middleware) in &other.middleware {
            let entry = self
                .middleware
                .entry(class.clone())
                .or_insert_with(|| middleware.clone());
            entry
                .methods
                .extend(middleware.methods.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("controllers", &self.controllers())
            .field("middleware", &self.middleware_classes())
            .finish()
    }
}

/// Adds actions to a registered controller
pub struct ControllerBuilder<'r, C> {
    registry: &'r mut HandlerRegistry,
    class: String,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Controller> ControllerBuilder<'_, C> {
    pub fn action<F>(self, name: &str, action: F) -> Self
    where
        F: Fn(&mut C, &mut Response, &RouteArgs) -> Result<String, Error> + Send + Sync + 'static,
    {
        if let Some(controller) = self.registry.controllers.get_mut(&self.class) {
            let identifier = controller.identifier.clone();
            let call: ActionFn = Arc::new(move |container, response, args| {
                let mut instance = C::construct(BaseController::new(container, &identifier))?;
                action(&mut instance, response, args)
            });
            controller.actions.insert(name.to_string(), call);
        }
        self
    }
}

/// Adds methods to a registered middleware class
pub struct MiddlewareBuilder<'r, M> {
    registry: &'r mut HandlerRegistry,
    class: String,
    _middleware: PhantomData<fn() -> M>,
}

impl<M: Middleware> MiddlewareBuilder<'_, M> {
    pub fn method<F>(self, name: &str, method: F) -> Self
    where
        F: Fn(&mut M, String) -> Result<String, Error> + Send + Sync + 'static,
    {
        if let Some(middleware) = self.registry.middleware.get_mut(&self.class) {
            let call: MiddlewareFn = Arc::new(move |container, response| {
                let mut instance = M::construct(container)?;
                method(&mut instance, response)
            });
            middleware.methods.insert(name.to_string(), call);
        }
        self
    }
}

/// Collaborators every controller is built around.
///
/// Construction records the controller's module as the current module.
#[derive(Clone)]
pub struct BaseController {
    container: Container,
    class: String,
    module: String,
}

impl BaseController {
    pub fn new(container: &Container, class: &str) -> Self {
        let module = match container.get_as::<ModuleRegistry>(MODULES) {
            Ok(modules) => {
                modules.set_current_module(class);
                modules.get_current_module()
            }
            Err(_) => module_for_class(class),
        };
        Self {
            container: container.clone(),
            class: class.to_string(),
            module,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Fully qualified class identifier.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Module the controller belongs to.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn config(&self) -> Result<Arc<ConfigStore>, Error> {
        self.container.get_as(CONFIG)
    }

    pub fn db(&self) -> Result<Arc<Db>, Error> {
        self.container.get_as(DB)
    }

    pub fn modules(&self) -> Result<Arc<ModuleRegistry>, Error> {
        self.container.get_as(MODULES)
    }

    pub fn views(&self) -> Result<Arc<Views>, Error> {
        self.container.get_as(VIEWS)
    }

    pub fn request(&self) -> Result<Arc<Request>, Error> {
        self.container.get_as(REQUEST)
    }

    /// Run another controller action within this request.
    pub fn execute(&self, handler: &str, args: &RouteArgs) -> Result<String, Error> {
        crate::dispatcher::execute(&self.container, handler, args)
    }
}

impl fmt::Debug for BaseController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseController")
            .field("class", &self.class)
            .field("module", &self.module)
            .finish()
    }
}
