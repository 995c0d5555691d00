mod common;

use common::{Blog, app_handlers, app_root, write};
use std::path::Path;
use trellis_core::container::{CONFIG, MODULES};
use trellis_core::{
    Application, Error, MiddlewarePart, MiddlewarePipeline, ModuleRegistry, Request,
    merge_module_config,
};
use trellis_config::ConfigStore;

fn app(root: &Path) -> Application {
    Application::builder(root)
        .environment("production")
        .handlers(app_handlers)
        .plugin(Blog)
        .build()
        .unwrap()
}

fn get(app: &Application, path: &str) -> trellis_core::Response {
    app.handle(Request::new("GET", path)).unwrap()
}

#[test]
fn test_found_route_dispatches_controller() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = \"GET\"\npath = \"/\"\nhandler = \"Home:index\"\n\n\
         [[routes]]\nmethods = [\"GET\"]\npath = \"/posts/{id}\"\nhandler = \"Home:show\"\n",
    );
    let app = app(dir.path());

    let response = get(&app, "/");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "home");
    assert_eq!(get(&app, "/posts/9").body, "post 9");
}

#[test]
fn test_unknown_path_renders_404_controller() {
    let dir = app_root();
    write(dir.path(), "config/production/error.toml", "\"404\" = \"Core\\\\E404:index\"\n");
    let app = app(dir.path());

    let response = app
        .handle(Request::new("GET", "/unknown-path").with_header("Accept", "application/json"))
        .unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, r#"{"error":"Not Found","status":404}"#);
}

#[test]
fn test_wrong_method_renders_405_with_allow() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = [\"GET\", \"POST\"]\npath = \"/form\"\nhandler = \"Home:index\"\n",
    );
    let app = app(dir.path());

    let response = app.handle(Request::new("DELETE", "/form")).unwrap();
    assert_eq!(response.status, 405);
    assert_eq!(response.header("Allow"), Some("GET, POST"));
    assert_eq!(response.body, "405 Method Not Allowed\n");
}

#[test]
fn test_module_overrides_error_handler() {
    let dir = app_root();
    write(dir.path(), "config/production/error.toml", "\"404\" = \"Core\\\\E404:index\"\n");
    write(dir.path(), "modules/Blog/config/production/error.toml", "\"404\" = \"Home:index\"\n");
    let app = app(dir.path());

    let response = get(&app, "/nowhere");
    assert_eq!(response.body, "home");
    assert_eq!(response.status, 404);
}

#[test]
fn test_module_overrides_405_handler() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = [\"GET\", \"POST\"]\npath = \"/form\"\nhandler = \"Home:index\"\n",
    );
    write(dir.path(), "modules/Blog/config/production/error.toml", "\"405\" = \"Home:index\"\n");
    let app = app(dir.path());

    let response = app.handle(Request::new("DELETE", "/form")).unwrap();
    assert_eq!(response.status, 405);
    assert_eq!(response.body, "home");
    assert_eq!(response.header("Allow"), None);

    let response = get(&app, "/nowhere");
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "404 Not Found\n");
}

#[test]
fn test_core_directory_under_modules_leaves_app_routes_alone() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = \"GET\"\npath = \"/\"\nhandler = \"Home:index\"\n",
    );
    std::fs::create_dir_all(dir.path().join("modules/core/config/production")).unwrap();
    let app = app(dir.path());

    let response = get(&app, "/");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "home");
}

#[test]
fn test_unresolvable_route_handler_falls_back_to_404() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = \"GET\"\npath = \"/ghost\"\nhandler = \"Ghost:index\"\n",
    );
    let app = app(dir.path());

    let response = get(&app, "/ghost");
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "404 Not Found\n");
}

#[test]
fn test_before_and_after_middleware_wrap_output() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = \"GET\"\npath = \"/\"\nhandler = \"Home:stream\"\n",
    );
    write(
        dir.path(),
        "config/production/middleware.toml",
        "[beforeMiddleware]\n10 = \"Trace:second\"\n2 = \"Trace:first\"\n\n[afterMiddleware]\n0 = \"Trace:wrap\"\n",
    );
    let app = app(dir.path());

    let response = get(&app, "/");
    assert_eq!(response.body, "<[first][second]early;late>");
    assert_eq!(response.header("X-Stream"), Some("yes"));
}

#[test]
fn test_scenario_a_module_middleware_runs_after_app_entry() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/middleware.toml",
        "[beforeMiddleware]\n0 = \"Profiler:init\"\n",
    );
    write(
        dir.path(),
        "modules/Blog/config/production/middleware.toml",
        "[beforeMiddleware]\n5 = \"Audit:init\"\n",
    );
    let app = app(dir.path());
    let kernel = app.kernel().unwrap();

    let pipeline = MiddlewarePipeline::new(kernel.container().clone());
    let targets: Vec<String> = pipeline
        .collect(MiddlewarePart::Before)
        .unwrap()
        .into_iter()
        .map(|e| e.target)
        .collect();
    assert_eq!(targets, vec!["Profiler:init", "Audit:init"]);

    let response = get(&app, "/nothing-here");
    assert!(response.body.starts_with("[second]"));
}

#[test]
fn test_scenario_d_last_module_wins() {
    let dir = app_root();
    write(dir.path(), "config/production/middleware.toml", "[afterMiddleware]\n1000 = \"App:x\"\n");
    write(dir.path(), "modules/A/config/production/middleware.toml", "[afterMiddleware]\n1000 = \"A:x\"\n");
    write(dir.path(), "modules/B/config/production/middleware.toml", "[afterMiddleware]\n1000 = \"B:x\"\n");
    let app = app(dir.path());
    let kernel = app.kernel().unwrap();

    let config = kernel.container().get_as::<ConfigStore>(CONFIG).unwrap();
    let modules = kernel.container().get_as::<ModuleRegistry>(MODULES).unwrap();
    let merged = merge_module_config(&config, &modules, "middleware", "afterMiddleware");
    assert_eq!(merged["1000"], "B:x");

    // The application's cached copy is left untouched.
    assert_eq!(config.get("afterMiddleware", "middleware", serde_json::Value::Null)["1000"], "App:x");
}

#[test]
fn test_disabled_module_contributes_nothing() {
    let dir = app_root();
    write(dir.path(), "modules/Blog/config/production/middleware.toml", "[beforeMiddleware]\n0 = \"Trace:first\"\n");
    write(dir.path(), "modules/Blog/.disabled", "");
    let app = app(dir.path());

    let response = get(&app, "/blog/whoami");
    assert_eq!(response.status, 404);
    assert!(!response.body.contains("[first]"));
}

#[test]
fn test_module_route_sets_current_module() {
    let dir = app_root();
    std::fs::create_dir_all(dir.path().join("modules/Blog")).unwrap();
    let app = app(dir.path());

    assert_eq!(get(&app, "/blog/whoami").body, "module=Blog");
}

#[test]
fn test_broken_middleware_aborts_request() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/middleware.toml",
        "[beforeMiddleware]\n0 = \"Missing:init\"\n",
    );
    let app = app(dir.path());

    assert!(matches!(
        app.handle(Request::new("GET", "/")),
        Err(Error::HandlerResolution(_))
    ));
}

#[test]
fn test_content_length_matches_utf8_bytes() {
    let dir = app_root();
    write(dir.path(), "config/production/error.toml", "\"404\" = \"Home:index\"\n");
    write(
        dir.path(),
        "config/production/middleware.toml",
        "[afterMiddleware]\n0 = \"Trace:wrap\"\n",
    );
    let app = Application::builder(dir.path())
        .environment("production")
        .handlers(app_handlers)
        .handlers(|h| {
            h.controller::<common::HomeController>("UnicodeController")
                .action("indexAction", |_, _, _| Ok("héllo ✓".to_string()));
        })
        .routes(|r| {
            r.get("/u", "Unicode:index");
        })
        .build()
        .unwrap();

    let response = get(&app, "/u");
    assert_eq!(response.body, "<héllo ✓>");
    assert_eq!(response.header("Content-Length"), Some(response.body.len().to_string().as_str()));
    assert_eq!(response.body.len(), 12);
}

#[test]
fn test_content_length_can_be_disabled() {
    let dir = app_root();
    write(dir.path(), "config/production/app.toml", "sendContentLength = false\n");
    let app = app(dir.path());

    assert_eq!(get(&app, "/").header("Content-Length"), None);
}

#[test]
fn test_cli_invocation_uses_command_handler() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/middleware.toml",
        "[afterMiddleware]\n0 = \"Trace:wrap\"\n",
    );
    let app = Application::builder(dir.path())
        .environment("production")
        .handlers(app_handlers)
        .commands(|_: &trellis_core::Container, args: &[String]| Ok::<_, Error>(args.join(" ")))
        .build()
        .unwrap();

    let response = app.run_command(vec!["cache".into(), "clear".into()]).unwrap();
    assert_eq!(response.body, "<cache clear>");

    let bare = Application::builder(dir.path()).environment("production").build().unwrap();
    assert!(matches!(bare.run_command(vec![]), Err(Error::Command(_))));
}

#[test]
fn test_missing_config_dir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Application::builder(dir.path()).build(),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_route_cache_written_and_reused() {
    let dir = app_root();
    write(
        dir.path(),
        "config/production/app.toml",
        "[routeCache]\nenabled = true\nfile = \"var/routes.json\"\nexpiryDays = 1\n",
    );
    write(
        dir.path(),
        "config/production/routes.toml",
        "[[routes]]\nmethods = \"GET\"\npath = \"/\"\nhandler = \"Home:index\"\n",
    );
    let app = app(dir.path());

    assert_eq!(get(&app, "/").body, "home");
    assert!(dir.path().join("var/routes.json").exists());

    // The cached table is used even after the routes file changes.
    write(dir.path(), "config/production/routes.toml", "");
    assert_eq!(get(&app, "/").body, "home");
}
