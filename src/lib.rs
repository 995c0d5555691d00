// Trellis - a modular request-lifecycle framework for Rust
//
// This library bundles the kernel with its configuration store and logging
// setup so applications depend on a single crate.

// Re-export core functionality
pub use trellis_core::*;

pub use trellis_config;
pub use trellis_log;

#[cfg(feature = "testing")]
pub use trellis_testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use trellis_config::{ConfigStore, EnvLoader};
    pub use trellis_core::{
        Application, ApplicationBuilder, BaseController, Container, Controller, Error,
        HandlerRegistry, Installer, Middleware, ModulePlugin, Request, Response, RouteArgs,
        RouteCollector,
    };
}
