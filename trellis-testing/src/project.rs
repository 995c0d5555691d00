// On-disk application fixtures

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trellis_core::application::{CONFIG_DIR, MODULES_DIR};
use trellis_core::module::DISABLED_MARKER;
use trellis_core::{Application, ApplicationBuilder, Error};

use crate::TestClient;

/// Environment used by fixtures unless another one is given.
pub const TEST_ENVIRONMENT: &str = "production";

/// Application root in a temporary directory, removed on drop.
///
/// Config files are written as TOML under `config/<env>/` for the
/// application and `modules/<Module>/config/<env>/` for modules.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Create an empty project with a `config/` directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp project dir");
        fs::create_dir_all(dir.path().join(CONFIG_DIR).join(TEST_ENVIRONMENT))
            .expect("create config dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn modules_root(&self) -> PathBuf {
        self.root().join(MODULES_DIR)
    }

    /// Write `config/<env>/<file>.toml`.
    pub fn env_config(&self, env: &str, file: &str, toml: &str) -> &Self {
        self.write(&Path::new(CONFIG_DIR).join(env).join(format!("{}.toml", file)), toml)
    }

    /// Write `config/production/<file>.toml`.
    pub fn app_config(&self, file: &str, toml: &str) -> &Self {
        self.env_config(TEST_ENVIRONMENT, file, toml)
    }

    /// Write `modules/<module>/config/production/<file>.toml`.
    pub fn module_config(&self, module: &str, file: &str, toml: &str) -> &Self {
        let rel = Path::new(MODULES_DIR)
            .join(module)
            .join(CONFIG_DIR)
            .join(TEST_ENVIRONMENT)
            .join(format!("{}.toml", file));
        self.write(&rel, toml)
    }

    /// Create an empty module directory.
    pub fn module(&self, module: &str) -> &Self {
        fs::create_dir_all(self.modules_root().join(module)).expect("create module dir");
        self
    }

    /// Drop a `.disabled` marker into a module.
    pub fn disable(&self, module: &str) -> &Self {
        self.module(module);
        self.write(&Path::new(MODULES_DIR).join(module).join(DISABLED_MARKER), "")
    }

    /// Write any file relative to the project root.
    pub fn write(&self, rel: &Path, content: &str) -> &Self {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, content).expect("write fixture file");
        self
    }

    /// Application builder rooted at this project.
    pub fn builder(&self) -> ApplicationBuilder {
        Application::builder(self.root()).environment(TEST_ENVIRONMENT)
    }

    /// Build the application and wrap it in a [`TestClient`].
    pub fn client(&self, builder: ApplicationBuilder) -> Result<TestClient, Error> {
        Ok(TestClient::new(builder.build()?))
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
