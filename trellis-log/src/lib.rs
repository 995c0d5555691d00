//! Logging for Trellis applications.
//!
//! Wraps `tracing-subscriber` so the `log` config file of an application can
//! drive level, format and destination. Defaults to JSON on STDOUT at INFO.
//!
//! ```no_run
//! use trellis_log::{LogConfig, LogFormat, LogLevel, info};
//!
//! LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init()
//!     .ok();
//!
//! info!("Application started");
//! ```
//!
//! The global subscriber is installed at most once per process. Later calls
//! to [`LogConfig::init`] report `false` and leave the first setup in place.

use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::{Level, Span, debug, debug_span, error, info, info_span, trace, warn};

/// Environment variable holding an `EnvFilter` directive that overrides the
/// configured level.
pub const LOG_ENV: &str = "TRELLIS_LOG";

static INSTALLED: AtomicBool = AtomicBool::new(false);

// Set by the first `init` call whatever its outcome, so a process whose host
// owns the dispatcher does not rebuild writers on every later call.
static ATTEMPTED: AtomicBool = AtomicBool::new(false);

// Dropping the guard stops the background writer, so it lives for the process.
static GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, machine-readable (default)
    Json,
    Plain,
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "plain" | "text" => Some(LogFormat::Plain),
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "minutely" => Some(Rotation::Minutely),
            "hourly" => Some(Rotation::Hourly),
            "daily" => Some(Rotation::Daily),
            "never" => Some(Rotation::Never),
            _ => None,
        }
    }

    fn to_appender_rotation(self) -> tracing_appender::rolling::Rotation {
        match self {
            Rotation::Minutely => tracing_appender::rolling::Rotation::MINUTELY,
            Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
            Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
        }
    }
}

/// Where log lines are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(String),
    RollingFile {
        directory: String,
        prefix: String,
        rotation: Rotation,
    },
}

impl LogOutput {
    /// Parse the `output` value of a log config file.
    ///
    /// Accepts `stdout`, `stderr`, `file:<path>` and `rolling:<dir>`.
    pub fn parse(s: &str, prefix: &str, rotation: Rotation) -> Option<Self> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "stdout" => return Some(LogOutput::Stdout),
            "stderr" => return Some(LogOutput::Stderr),
            _ => {}
        }
        if let Some(path) = s.strip_prefix("file:") {
            return Some(LogOutput::File(path.to_string()));
        }
        s.strip_prefix("rolling:").map(|dir| LogOutput::RollingFile {
            directory: dir.to_string(),
            prefix: prefix.to_string(),
            rotation,
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub timestamps: bool,
    pub targets: bool,
    pub colors: bool,
    /// Custom filter directive; overrides `level` when set
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the contents of a `log` config file.
    ///
    /// Unknown or malformed values keep their defaults.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let mut config = Self::default();
        let str_at = |key: &str| value.get(key).and_then(|v| v.as_str());

        if let Some(level) = str_at("level").and_then(LogLevel::parse) {
            config.level = level;
        }
        if let Some(format) = str_at("format").and_then(LogFormat::parse) {
            config.format = format;
        }
        let rotation = str_at("rotation")
            .and_then(Rotation::parse)
            .unwrap_or(Rotation::Daily);
        let prefix = str_at("prefix").unwrap_or("trellis");
        if let Some(output) = str_at("output").and_then(|s| LogOutput::parse(s, prefix, rotation)) {
            config.output = output;
        }
        if let Some(targets) = value.get("targets").and_then(|v| v.as_bool()) {
            config.targets = targets;
        }
        if let Some(colors) = value.get("colors").and_then(|v| v.as_bool()) {
            config.colors = colors;
        }
        if let Some(filter) = str_at("filter") {
            config.env_filter = Some(filter.to_string());
        }
        config
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.timestamps = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    /// Set a filter directive such as `"trellis_core=debug,hyper=info"`.
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(directive) = std::env::var(LOG_ENV) {
            if let Ok(filter) = EnvFilter::try_new(directive) {
                return filter;
            }
        }
        self.env_filter
            .as_deref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(self.level.as_str()))
    }

    /// Install the global subscriber.
    ///
    /// Returns `Ok(false)` when a subscriber was already installed, either by
    /// an earlier call or by the host process. Only the first call in a process
    /// builds a writer; later calls return `Ok(false)` straight away.
    pub fn init(&self) -> io::Result<bool> {
        if ATTEMPTED.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let (writer, guard) = match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
            LogOutput::RollingFile {
                directory,
                prefix,
                rotation,
            } => tracing_appender::non_blocking(tracing_appender::rolling::RollingFileAppender::new(
                rotation.to_appender_rotation(),
                directory,
                prefix,
            )),
        };

        if self.subscriber(writer).try_init().is_err() {
            return Ok(false);
        }
        INSTALLED.store(true, Ordering::Release);
        if let Ok(mut slot) = GUARD.lock() {
            *slot = Some(guard);
        }
        Ok(true)
    }

    fn subscriber<W>(&self, writer: W) -> Box<dyn tracing::Subscriber + Send + Sync>
    where
        W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
    {
        let registry = tracing_subscriber::registry().with(self.filter());
        let layer = fmt::layer().with_writer(writer).with_target(self.targets);

        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => Box::new(registry.with(layer.json())),
            (LogFormat::Json, false) => Box::new(registry.with(layer.json().without_time())),
            (LogFormat::Pretty, true) => Box::new(registry.with(layer.pretty().with_ansi(self.colors))),
            (LogFormat::Pretty, false) => Box::new(
                registry.with(layer.pretty().without_time().with_ansi(self.colors)),
            ),
            (LogFormat::Compact, true) => {
                Box::new(registry.with(layer.compact().with_ansi(self.colors)))
            }
            (LogFormat::Compact, false) => Box::new(
                registry.with(layer.compact().without_time().with_ansi(self.colors)),
            ),
            (LogFormat::Plain, true) => Box::new(registry.with(layer.with_ansi(self.colors))),
            (LogFormat::Plain, false) => {
                Box::new(registry.with(layer.without_time().with_ansi(self.colors)))
            }
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            timestamps: true,
            targets: true,
            colors: false,
            env_filter: None,
        }
    }
}

/// Whether a global subscriber has been installed through this crate.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
    }

    #[test]
    fn test_from_value() {
        let config = LogConfig::from_value(&json!({
            "level": "debug",
            "format": "compact",
            "output": "rolling:/var/log/app",
            "prefix": "site",
            "rotation": "hourly",
            "targets": false
        }));

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(
            config.output,
            LogOutput::RollingFile {
                directory: "/var/log/app".to_string(),
                prefix: "site".to_string(),
                rotation: Rotation::Hourly,
            }
        );
        assert!(!config.targets);
    }

    #[test]
    fn test_from_value_keeps_defaults_on_garbage() {
        let config = LogConfig::from_value(&json!({ "level": 7, "output": "nowhere" }));
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.output, LogOutput::Stdout);
    }

    #[test]
    fn test_output_parse_file() {
        assert_eq!(
            LogOutput::parse("file:app.log", "x", Rotation::Never),
            Some(LogOutput::File("app.log".to_string()))
        );
        assert_eq!(LogOutput::parse("STDERR", "x", Rotation::Never), Some(LogOutput::Stderr));
    }

    #[derive(Clone, Default)]
    struct Buffer(std::sync::Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(config: &LogConfig) -> String {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = config.subscriber(move || writer.clone());
        tracing::subscriber::with_default(subscriber, || info!("captured"));
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_json_timestamps_toggle() {
        let stamped = capture(&LogConfig::new());
        assert!(stamped.contains("\"timestamp\""));

        let bare = capture(&LogConfig::new().with_timestamps(false));
        assert!(bare.contains("captured"));
        assert!(!bare.contains("\"timestamp\""));
    }

    #[test]
    fn test_compact_without_timestamps_starts_with_level() {
        let config = LogConfig::new()
            .format(LogFormat::Compact)
            .with_timestamps(false);
        let line = capture(&config);
        assert!(line.trim_start().starts_with("INFO"), "{line}");
    }

    #[test]
    fn test_pretty_without_timestamps_starts_with_level() {
        let config = LogConfig::new()
            .format(LogFormat::Pretty)
            .with_timestamps(false);
        let line = capture(&config);
        assert!(line.trim_start().starts_with("INFO"), "{line}");
    }

    #[test]
    fn test_second_init_is_noop() {
        let config = LogConfig::new().output(LogOutput::Stderr);
        let _ = config.init();
        assert!(!config.init().unwrap());
    }
}
