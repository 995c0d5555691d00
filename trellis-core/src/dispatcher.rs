// Controller dispatch

use crate::container::{CONFIG, HANDLERS, MODULES};
use crate::handler::{ActionFn, HandlerRef, RouteArgs};
use crate::routing::{ResolvedRoute, error_handler};
use crate::{Container, Error, HandlerRegistry, ModuleRegistry, Response};
use trellis_config::ConfigStore;
use trellis_log::{debug, warn};

/// Resolve `handler` to a registered action, applying the
/// `Name:action` -> `NameController::actionAction` transform.
pub fn resolve(handlers: &HandlerRegistry, handler: &str) -> Result<ActionFn, Error> {
    let target = HandlerRef::parse(handler)?;
    handlers.action(&target.controller_class(), &target.action_method())
}

/// Invoke `action`, returning its direct output followed by its return value.
fn invoke(
    container: &Container,
    action: &ActionFn,
    args: &RouteArgs,
    response: &mut Response,
) -> Result<(), Error> {
    let returned = action(container, response, args)?;
    response.write(&returned);
    Ok(())
}

/// Run another controller action in the current request.
///
/// Unlike route dispatch there is no 404 fallback; resolution errors
/// propagate to the caller.
pub fn execute(container: &Container, handler: &str, args: &RouteArgs) -> Result<String, Error> {
    let handlers = container.get_as::<HandlerRegistry>(HANDLERS)?;
    let action = resolve(&handlers, handler)?;
    let mut response = Response::ok();
    invoke(container, &action, args, &mut response)?;
    debug!(handler = handler, "Executed nested controller action");
    Ok(response.body)
}

/// Turns a resolved handler into controller output
pub struct ControllerDispatcher {
    container: Container,
}

impl ControllerDispatcher {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    /// Dispatch a resolved route, keeping its status unless the controller
    /// sets another.
    pub fn process_route(&self, route: &ResolvedRoute) -> Result<Response, Error> {
        self.dispatch(&route.handler, &route.args, Response::new(route.status))
    }

    /// Dispatch `handler` with `args`.
    ///
    /// A handler that does not resolve to a registered controller action is
    /// replaced by the configured 404 handler. That handler is resolved
    /// strictly.
    pub fn process_controller(&self, handler: &str, args: &RouteArgs) -> Result<Response, Error> {
        self.dispatch(handler, args, Response::ok())
    }

    fn dispatch(&self, handler: &str, args: &RouteArgs, mut response: Response) -> Result<Response, Error> {
        let handlers = self.container.get_as::<HandlerRegistry>(HANDLERS)?;
        let action = match resolve(&handlers, handler) {
            Ok(action) => action,
            Err(Error::HandlerResolution(reason)) => {
                warn!(handler = handler, reason = %reason, "Handler not resolvable, using 404 handler");
                response.set_status(404);
                let fallback = self.not_found_handler()?;
                resolve(&handlers, &fallback)?
            }
            Err(e) => return Err(e),
        };

        invoke(&self.container, &action, args, &mut response)?;
        debug!(handler = handler, status = response.status, length = response.body.len(), "Controller dispatched");
        Ok(response)
    }

    fn not_found_handler(&self) -> Result<String, Error> {
        let config = self.container.get_as::<ConfigStore>(CONFIG)?;
        let modules = self.container.get_as::<ModuleRegistry>(MODULES)?;
        Ok(error_handler(&config, &modules, 404))
    }
}
