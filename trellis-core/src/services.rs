// Services bound into the container at bootstrap

use crate::Error;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use trellis_config::{ALL, ConfigStore};
use trellis_log::{LogConfig, LogLevel, debug, error, info, trace, warn};

/// Contents of the `db` config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DbSettings {
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub options: Value,
}

impl DbSettings {
    pub fn from_config(config: &ConfigStore) -> Self {
        config.get_as(ALL, "db", DbSettings::default())
    }
}

/// An open database connection
pub trait DbConnection: Send + Sync {
    /// Run a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, Error>;

    /// Run a query, returning one JSON object per row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, Error>;
}

/// Opens connections from [`DbSettings`]
pub trait DbDriver: Send + Sync {
    fn connect(&self, settings: &DbSettings) -> Result<Box<dyn DbConnection>, Error>;
}

/// Database access for one request.
///
/// The connection is opened on first use and reused for the rest of the
/// request.
pub struct Db {
    settings: DbSettings,
    driver: Option<Arc<dyn DbDriver>>,
    connection: OnceCell<Box<dyn DbConnection>>,
}

impl Db {
    pub fn new(settings: DbSettings, driver: Option<Arc<dyn DbDriver>>) -> Self {
        Self {
            settings,
            driver,
            connection: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ConfigStore, driver: Option<Arc<dyn DbDriver>>) -> Self {
        Self::new(DbSettings::from_config(config), driver)
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connection.get().is_some()
    }

    pub fn connection(&self) -> Result<&dyn DbConnection, Error> {
        let connection = self.connection.get_or_try_init(|| {
            let driver = self
                .driver
                .as_ref()
                .ok_or_else(|| Error::Database("No database driver configured".to_string()))?;
            if self.settings.dsn.is_empty() {
                return Err(Error::Database("No dsn in db config".to_string()));
            }
            debug!(dsn = %self.settings.dsn, "Opening database connection");
            driver.connect(&self.settings)
        })?;
        Ok(connection.as_ref())
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        self.connection()?.execute(sql, params)
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, Error> {
        self.connection()?.query(sql, params)
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dsn", &self.settings.dsn)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Application logger driven by the `log` config file
#[derive(Debug, Clone)]
pub struct Logger {
    config: LogConfig,
    installed: bool,
}

impl Logger {
    /// Install the global subscriber from the `log` config file.
    ///
    /// Without a `log` file the host process keeps whatever subscriber it
    /// set up itself.
    pub fn from_config(config: &ConfigStore) -> Result<Self, Error> {
        if !config.load("log") {
            return Ok(Self {
                config: LogConfig::default(),
                installed: false,
            });
        }
        let log_config = LogConfig::from_value(&config.get(ALL, "log", Value::Null));
        let installed = log_config.init()?;
        if installed {
            debug!(level = log_config.level.as_str(), "Logging initialized from config");
        }
        Ok(Self {
            config: log_config,
            installed,
        })
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Whether this logger installed the global subscriber.
    pub fn installed(&self) -> bool {
        self.installed
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => trace!(target: "trellis::app", "{}", message),
            LogLevel::Debug => debug!(target: "trellis::app", "{}", message),
            LogLevel::Info => info!(target: "trellis::app", "{}", message),
            LogLevel::Warn => warn!(target: "trellis::app", "{}", message),
            LogLevel::Error => error!(target: "trellis::app", "{}", message),
        }
    }
}

/// Request timing marks, active when `profiler.enabled` is set
pub struct Profiler {
    enabled: bool,
    started: Instant,
    marks: Mutex<Vec<(String, Duration)>>,
}

impl Profiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            started: Instant::now(),
            marks: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &ConfigStore) -> Self {
        Self::new(config.get_as("enabled", "profiler", false))
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn mark(&self, label: &str) {
        if self.enabled {
            self.marks
                .lock()
                .push((label.to_string(), self.started.elapsed()));
        }
    }

    pub fn marks(&self) -> Vec<(String, Duration)> {
        self.marks.lock().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log every mark and the total time.
    pub fn report(&self) {
        if !self.enabled {
            return;
        }
        for (label, at) in self.marks.lock().iter() {
            info!(mark = %label, elapsed_us = at.as_micros() as u64, "Profiler mark");
        }
        info!(total_us = self.elapsed().as_micros() as u64, "Profiler report");
    }
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("enabled", &self.enabled)
            .field("marks", &self.marks.lock().len())
            .finish()
    }
}

/// Template rendering supplied by the application
pub trait ViewRenderer: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> Result<String, Error>;
}

/// Handle on the application's [`ViewRenderer`]
#[derive(Clone)]
pub struct Views {
    renderer: Arc<dyn ViewRenderer>,
}

impl Views {
    pub fn new(renderer: Arc<dyn ViewRenderer>) -> Self {
        Self { renderer }
    }

    pub fn render(&self, template: &str, data: &Value) -> Result<String, Error> {
        self.renderer.render(template, data)
    }
}

impl fmt::Debug for Views {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Views").finish_non_exhaustive()
    }
}
