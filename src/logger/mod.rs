//! Leveled, structured logging with a min-level gate and an optional
//! console mirror. This is the SDK's own product-facing logger — distinct
//! from the ambient `tracing` diagnostics the rest of this crate emits
//! about its own internals (worker pool, transport reconnects, etc.).
//!
//! The actual network shipping of a rendered record is an external
//! collaborator behind [`LogSink`]; this module owns the message schema,
//! the level gate, and the JSON rendering.

mod level;
mod message;

pub use level::Level;
pub use message::MessageBuilder;

use std::sync::Arc;

use serde_json::Value;

/// Receives a fully-rendered JSON log line. Implementations decide where it
/// goes (graylog/GELF UDP, a file, stdout, nowhere). The wire protocol to an
/// actual remote log shipper is out of scope for this crate.
pub trait LogSink: Send + Sync + 'static {
    fn write(&self, rendered: &str);
}

/// Drops every record. Used when logging is effectively disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;
impl LogSink for NullSink {
    fn write(&self, _rendered: &str) {}
}

/// Writes every record to stdout, one JSON object per line. Handy for local
/// development and as the `stdout_only` sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;
impl LogSink for StdoutSink {
    fn write(&self, rendered: &str) {
        println!("{rendered}");
    }
}

/// Configuration read once at process start via [`LoggerConfig::from_env`].
/// Tests build this directly, bypassing the environment entirely — there is
/// no global logger state to reach for.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub host: String,
    pub port: u16,
    pub min_level: Level,
    pub verbose: bool,
    pub stdout_only: bool,
    /// The `host` field stamped on every record; defaults to the OS
    /// hostname, overridable via `HOST`.
    pub record_host: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12201,
            min_level: Level::Info,
            verbose: false,
            stdout_only: false,
            record_host: default_hostname(),
        }
    }
}

impl LoggerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("ORION_LOGGER_HOST") {
            config.host = v;
        }
        if let Ok(v) = std::env::var("ORION_LOGGER_PORT") {
            if let Ok(p) = v.parse() {
                config.port = p;
            }
        }
        if let Ok(v) = std::env::var("ORION_LOGGER_LEVEL") {
            if let Some(level) = Level::parse(&v) {
                config.min_level = level;
            }
        }
        if let Ok(v) = std::env::var("VERBOSE") {
            config.verbose = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("LOGGER_STDOUT_ONLY") {
            config.stdout_only = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("HOST") {
            config.record_host = v;
        }
        config
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

/// The logger itself: holds the gate configuration and the sink the
/// rendered record is handed to.
#[derive(Clone)]
pub struct Logger {
    config: Arc<LoggerConfig>,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(config: LoggerConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            config: Arc::new(config),
            sink,
        }
    }

    /// Build a logger from the environment; ships records nowhere unless a
    /// sink is later substituted (use [`Logger::with_sink`] from a caller
    /// that owns a real shipper).
    pub fn from_env() -> Self {
        let config = LoggerConfig::from_env();
        let sink: Arc<dyn LogSink> = if config.stdout_only || config.verbose {
            Arc::new(StdoutSink)
        } else {
            Arc::new(NullSink)
        };
        Self::new(config, sink)
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Start building a message. The level defaults to `Info`.
    pub fn create_message(&self, text: impl Into<String>) -> MessageBuilder {
        MessageBuilder::new(self.clone(), text.into())
    }

    pub(crate) fn should_skip(&self, level: Level) -> bool {
        level.as_i8() > self.config.min_level.as_i8()
    }

    pub(crate) fn dispatch(&self, level: Level, rendered: &str) {
        self.sink.write(rendered);
        if self.config.verbose {
            eprintln!("[{level}] {rendered}");
        }
    }
}

pub(crate) type Fields = serde_json::Map<String, Value>;
