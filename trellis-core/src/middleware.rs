//! Before/after middleware pipeline.
//!
//! Entries are declared in the `middleware` config file of the application
//! and of each enabled module, keyed by a numeric position:
//!
//! ```toml
//! [beforeMiddleware]
//! 0 = "Profiler:init"
//!
//! [afterMiddleware]
//! 1000 = "Profiler:report"
//! ```
//!
//! Module declarations are merged over the application's, so a module can
//! replace the entry at a given position. A value of `false` or `""` clears
//! the slot.

use crate::container::{CONFIG, HANDLERS, MODULES};
use crate::handler::HandlerRef;
use crate::module::merge_module_config;
use crate::{Container, Error, HandlerRegistry, ModuleRegistry};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use trellis_config::{ConfigStore, as_keyed};
use trellis_log::{debug, trace};

/// Hook point of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiddlewarePart {
    Before,
    After,
}

impl MiddlewarePart {
    /// Config key holding the entries of this part.
    pub fn as_str(&self) -> &'static str {
        match self {
            MiddlewarePart::Before => "beforeMiddleware",
            MiddlewarePart::After => "afterMiddleware",
        }
    }
}

impl fmt::Display for MiddlewarePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort key of a middleware slot.
///
/// Integer keys compare exactly; `f64` only comes in once a fractional or
/// out-of-range key is involved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Int(i64),
    Float(f64),
}

impl Position {
    pub fn total_cmp(&self, other: &Position) -> Ordering {
        match (*self, *other) {
            (Position::Int(a), Position::Int(b)) => a.cmp(&b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Position::Int(n) => n as f64,
            Position::Float(n) => n,
        }
    }
}

/// One `position = "Class:method"` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareEntry {
    pub position: Position,
    pub key: String,
    pub target: String,
}

/// Numeric sort position of a key; non-numeric keys sort as `0`.
pub fn position_of(key: &str) -> Position {
    let key = key.trim();
    if let Ok(n) = key.parse::<i64>() {
        return Position::Int(n);
    }
    key.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(Position::Float)
        .unwrap_or(Position::Int(0))
}

/// Turn a merged `beforeMiddleware`/`afterMiddleware` value into entries in
/// execution order. Sorting is stable, so equal positions keep their order.
pub fn ordered_entries(declared: &Value) -> Vec<MiddlewareEntry> {
    let Some(map) = as_keyed(declared) else {
        return Vec::new();
    };
    let mut entries: Vec<MiddlewareEntry> = map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Bool(false) | Value::Null => None,
            Value::String(target) if target.is_empty() => None,
            Value::String(target) => Some(MiddlewareEntry {
                position: position_of(&key),
                key,
                target,
            }),
            other => Some(MiddlewareEntry {
                position: position_of(&key),
                key,
                target: other.to_string(),
            }),
        })
        .collect();
    entries.sort_by(|a, b| a.position.total_cmp(&b.position));
    entries
}

/// Runs the middleware declared for a request
pub struct MiddlewarePipeline {
    container: Container,
}

impl MiddlewarePipeline {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    /// Merged, ordered entries of `part` across the application and every
    /// enabled module.
    pub fn collect(&self, part: MiddlewarePart) -> Result<Vec<MiddlewareEntry>, Error> {
        let config = self.container.get_as::<ConfigStore>(CONFIG)?;
        let modules = self.container.get_as::<ModuleRegistry>(MODULES)?;
        let merged = merge_module_config(&config, &modules, "middleware", part.as_str());
        Ok(ordered_entries(&merged))
    }

    /// Run every entry of `part`, threading `response` through them.
    pub fn run(&self, part: MiddlewarePart, response: String) -> Result<String, Error> {
        let entries = self.collect(part)?;
        debug!(part = %part, count = entries.len(), "Running middleware");
        self.run_entries(&entries, response)
    }

    pub fn run_entries(&self, entries: &[MiddlewareEntry], mut response: String) -> Result<String, Error> {
        if entries.is_empty() {
            return Ok(response);
        }
        let handlers = self.container.get_as::<HandlerRegistry>(HANDLERS)?;
        for entry in entries {
            let target = HandlerRef::parse(&entry.target)?;
            let method = handlers.middleware_method(&target.class, &target.method)?;
            debug!(position = %entry.key, middleware = %target, "Middleware invoked");
            response = method(&self.container, response)?;
            trace!(middleware = %target, length = response.len(), "Middleware returned");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Middleware;
    use serde_json::json;
    use std::sync::Arc;

    struct Tag;

    impl Middleware for Tag {
        fn construct(_container: &Container) -> Result<Self, Error> {
            Ok(Tag)
        }
    }

    fn container() -> Container {
        let mut handlers = HandlerRegistry::new();
        handlers
            .middleware::<Tag>("Tag")
            .method("a", |_, r| Ok(r + "a"))
            .method("b", |_, r| Ok(r + "b"))
            .method("c", |_, r| Ok(r + "c"));
        let container = Container::new();
        container.insert(HANDLERS, Arc::new(handlers));
        container
    }

    fn targets(entries: &[MiddlewareEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.target.as_str()).collect()
    }

    #[test]
    fn test_numeric_ordering_ignores_insertion_order() {
        let entries = ordered_entries(&json!({
            "100": "Tag:c",
            "5": "Tag:b",
            "-1": "Tag:a",
            "20": "Tag:b"
        }));
        assert_eq!(targets(&entries), vec!["Tag:a", "Tag:b", "Tag:b", "Tag:c"]);
        assert_eq!(entries[0].position, Position::Int(-1));
    }

    #[test]
    fn test_array_and_disabled_slots() {
        let entries = ordered_entries(&json!(["Tag:a", false, "", "Tag:c"]));
        assert_eq!(targets(&entries), vec!["Tag:a", "Tag:c"]);
        assert!(ordered_entries(&json!("Tag:a")).is_empty());
    }

    #[test]
    fn test_position_of() {
        assert_eq!(position_of("1000"), Position::Int(1000));
        assert_eq!(position_of(" 2.5 "), Position::Float(2.5));
        assert_eq!(position_of("name"), Position::Int(0));
        assert_eq!(position_of("inf"), Position::Int(0));
    }

    #[test]
    fn test_large_adjacent_keys_keep_their_order() {
        let entries = ordered_entries(&json!({
            "10000000000000001": "Tag:c",
            "9999999999999999": "Tag:a",
            "10000000000000000": "Tag:b"
        }));
        assert_eq!(targets(&entries), vec!["Tag:a", "Tag:b", "Tag:c"]);

        let entries = ordered_entries(&json!({ "9007199254740993": "Tag:b", "9007199254740992": "Tag:a" }));
        assert_eq!(targets(&entries), vec!["Tag:a", "Tag:b"]);
    }

    #[test]
    fn test_fractional_keys_sort_between_integers() {
        let entries = ordered_entries(&json!({ "2": "Tag:c", "1.5": "Tag:b", "1": "Tag:a" }));
        assert_eq!(targets(&entries), vec!["Tag:a", "Tag:b", "Tag:c"]);
    }

    #[test]
    fn test_run_entries_threads_response() {
        let pipeline = MiddlewarePipeline::new(container());
        let entries = ordered_entries(&json!({ "2": "Tag:c", "1": "Tag:b", "0": "Tag:a" }));
        assert_eq!(pipeline.run_entries(&entries, ">".to_string()).unwrap(), ">abc");
    }

    #[test]
    fn test_unknown_middleware_is_fatal() {
        let pipeline = MiddlewarePipeline::new(container());
        for target in ["Tag:missing", "Ghost:a", "NoColon"] {
            let entries = ordered_entries(&json!({ "0": target }));
            assert!(matches!(
                pipeline.run_entries(&entries, String::new()),
                Err(Error::HandlerResolution(_))
            ));
        }
    }
}
