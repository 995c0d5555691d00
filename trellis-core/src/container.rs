// Dependency injection container

use crate::Error;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use trellis_log::{debug, trace};

/// Name of the [`ConfigStore`](trellis_config::ConfigStore) service.
pub const CONFIG: &str = "Config";
/// Name of the [`Db`](crate::Db) service.
pub const DB: &str = "Db";
/// Name of the [`ModuleRegistry`](crate::ModuleRegistry) service.
pub const MODULES: &str = "Modules";
/// Name of the [`Logger`](crate::Logger) service.
pub const LOGGER: &str = "Logger";
/// Name of the [`Profiler`](crate::Profiler) service.
pub const PROFILER: &str = "Profiler";
/// Name of the inbound [`Request`](crate::Request).
pub const REQUEST: &str = "Request";
/// Name of the [`HandlerRegistry`](crate::HandlerRegistry) built for the pass.
pub const HANDLERS: &str = "Handlers";
/// Name of the optional [`Views`](crate::Views) service.
pub const VIEWS: &str = "Views";

/// A resolved service instance
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Container) -> Result<Instance, Error> + Send + Sync>;

#[derive(Default)]
struct Registry {
    factories: HashMap<String, Factory>,
    instances: HashMap<String, Instance>,
}

/// Named, lazily resolved service registry.
///
/// The first [`get`](Container::get) of a name runs its factory and memoizes
/// the result; later calls return the same instance. Factories receive the
/// container, so a service can resolve the services bound before it.
#[derive(Clone)]
pub struct Container {
    registry: Arc<RwLock<Registry>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
        }
    }

    /// Bind a factory under `name`, replacing any previous binding.
    pub fn set<T, F>(&self, name: &str, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |c: &Container| Ok(Arc::new(factory(c)?) as Instance));
        let mut registry = self.registry.write();
        registry.instances.remove(name);
        registry.factories.insert(name.to_string(), factory);
        debug!(service = name, "Factory bound in container");
    }

    /// Bind an already built instance under `name`.
    pub fn instance<T: Any + Send + Sync>(&self, name: &str, value: T) {
        self.insert(name, Arc::new(value));
    }

    /// Bind a shared instance under `name`.
    pub fn insert(&self, name: &str, value: Instance) {
        let mut registry = self.registry.write();
        registry.factories.remove(name);
        registry.instances.insert(name.to_string(), value);
        debug!(service = name, "Instance bound in container");
    }

    /// Resolve `name`, running its factory on first use.
    pub fn get(&self, name: &str) -> Result<Instance, Error> {
        let factory = {
            let registry = self.registry.read();
            if let Some(instance) = registry.instances.get(name) {
                trace!(service = name, "Resolved memoized instance");
                return Ok(instance.clone());
            }
            registry.factories.get(name).cloned()
        };

        let factory = factory
            .ok_or_else(|| Error::ProviderNotFound(format!("Provider not found: {}", name)))?;

        // The lock is released while the factory runs so it can resolve
        // other services.
        let built = factory(self)?;
        let mut registry = self.registry.write();
        let instance = registry
            .instances
            .entry(name.to_string())
            .or_insert(built)
            .clone();
        debug!(service = name, "Provider resolved successfully");
        Ok(instance)
    }

    /// Resolve `name` and downcast it to `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        self.get(name)?.downcast::<T>().map_err(|_| {
            Error::DependencyInjection(format!(
                "Service {} is not a {}",
                name,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Check if `name` is bound, resolved or not.
    pub fn has(&self, name: &str) -> bool {
        let registry = self.registry.read();
        registry.instances.contains_key(name) || registry.factories.contains_key(name)
    }

    /// Names of every bound service, sorted.
    pub fn names(&self) -> Vec<String> {
        let registry = self.registry.read();
        let mut names: Vec<String> = registry
            .factories
            .keys()
            .chain(registry.instances.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_factory_runs_once() {
        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        container.set("Counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        });

        let first = container.get_as::<u32>("Counter").unwrap();
        let second = container.get_as::<u32>("Counter").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_name() {
        let container = Container::new();
        assert!(matches!(container.get("Nope"), Err(Error::ProviderNotFound(_))));
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container.instance("Name", "app".to_string());
        assert!(matches!(
            container.get_as::<u32>("Name"),
            Err(Error::DependencyInjection(_))
        ));
    }

    #[test]
    fn test_factory_resolves_earlier_service() {
        let container = Container::new();
        container.instance("Base", 20u32);
        container.set("Derived", |c| Ok(*c.get_as::<u32>("Base")? + 1));

        assert_eq!(*container.get_as::<u32>("Derived").unwrap(), 21);
    }

    #[test]
    fn test_factory_error_propagates_and_is_not_memoized() {
        let container = Container::new();
        container.set("Broken", |c| c.get_as::<u32>("Missing").map(|v| *v));

        assert!(matches!(container.get("Broken"), Err(Error::ProviderNotFound(_))));
        container.instance("Missing", 1u32);
        assert_eq!(*container.get_as::<u32>("Broken").unwrap(), 1);
    }

    #[test]
    fn test_has_and_names() {
        let container = Container::new();
        assert!(!container.has(CONFIG));
        container.set(CONFIG, |_| Ok(()));
        container.instance(MODULES, ());
        assert!(container.has(CONFIG));
        assert_eq!(container.names(), vec![CONFIG.to_string(), MODULES.to_string()]);
    }
}
