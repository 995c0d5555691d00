//! Testing utilities for Trellis applications.
//!
//! - **TestProject** - on-disk application layout in a temp directory
//! - **TestClient** - runs requests through a fresh kernel each time
//! - **Assertions** - response checks with readable failure messages
//!
//! ## Quick Start
//!
//! ```no_run
//! use trellis_testing::*;
//!
//! let project = TestProject::new();
//! project.app_config(
//!     "routes",
//!     "[[routes]]\nmethods = \"GET\"\npath = \"/\"\nhandler = \"Home:index\"\n",
//! );
//! project.module_config("Blog", "middleware", "[beforeMiddleware]\n0 = \"Profiler:init\"\n");
//! project.disable("Blog");
//!
//! let client = project.client(project.builder()).unwrap();
//! let response = client.get("/");
//! assert_status(&response, 404);
//! ```

mod assertions;
mod project;
mod test_client;

pub use assertions::*;
pub use project::TestProject;
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
