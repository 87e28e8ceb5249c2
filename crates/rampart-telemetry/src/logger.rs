//! Structured JSON logger.
//!
//! Every call writes exactly one JSON object followed by `\n` to the current
//! sink:
//!
//! ```json
//! {"timestamp":"2025-03-01T12:00:00.123456789Z","level":"ERROR","message":"Request error","error":"boom","path":"/checkout","fields":{"method":"POST"}}
//! ```
//!
//! The reserved field keys `user_id`, `path` and `trace_id` are hoisted to
//! top-level keys; everything else stays in `fields`. Absent optional keys
//! are omitted.
//!
//! If an entry cannot be serialized or written, the failure is reported on
//! the diagnostic sink (the `tracing` facade) and the caller is unaffected.
//!
//! # Example
//!
//! ```
//! use rampart_telemetry::{log_fields, Logger};
//!
//! let (logger, captured) = Logger::in_memory();
//! logger.info("Checkout started", log_fields! { "path" => "/checkout", "cart_items" => 3 });
//!
//! let entries = captured.entries();
//! assert_eq!(entries[0].path.as_deref(), Some("/checkout"));
//! assert_eq!(entries[0].fields["cart_items"], 3);
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Free-form field bag attached to a log entry.
pub type LogFields = serde_json::Map<String, Value>;

/// Reserved field keys hoisted to top-level entry fields.
pub mod fields {
    /// User ID field name.
    pub const USER_ID: &str = "user_id";

    /// Request path field name.
    pub const PATH: &str = "path";

    /// Trace ID field name.
    pub const TRACE_ID: &str = "trace_id";
}

/// Builds a [`LogFields`] bag from `key => value` pairs.
///
/// Values are converted with `serde_json::to_value`; a value that cannot be
/// converted is stored as `null`.
#[macro_export]
macro_rules! log_fields {
    () => {
        $crate::logger::LogFields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::logger::LogFields::new();
        $(
            fields.insert(
                ::std::string::ToString::to_string(&$key),
                $crate::__serde_json::to_value(&$value)
                    .unwrap_or($crate::__serde_json::Value::Null),
            );
        )+
        fields
    }};
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debugging detail.
    Debug,
    /// Routine events.
    Info,
    /// Something unexpected that did not fail the request.
    Warn,
    /// A failure.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// One structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was created (UTC).
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Error text, if an error was attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hoisted `user_id` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    /// Hoisted `path` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Hoisted `trace_id` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Remaining free-form fields.
    #[serde(default, skip_serializing_if = "LogFields::is_empty")]
    pub fields: LogFields,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            error: None,
            user_id: None,
            path: None,
            trace_id: None,
            fields: LogFields::new(),
        }
    }

    /// Attaches error text.
    #[must_use]
    pub fn with_error(mut self, error: Option<&dyn fmt::Display>) -> Self {
        self.error = error.map(ToString::to_string);
        self
    }

    /// Merges a field bag, hoisting the reserved keys.
    ///
    /// A reserved key whose value has the wrong JSON type is kept in the bag
    /// as-is.
    #[must_use]
    pub fn with_fields(mut self, bag: LogFields) -> Self {
        for (key, value) in bag {
            match (key.as_str(), &value) {
                (fields::USER_ID, Value::Number(n)) if n.as_u64().is_some() => {
                    self.user_id = n.as_u64();
                }
                (fields::PATH, Value::String(s)) => self.path = Some(s.clone()),
                (fields::TRACE_ID, Value::String(s)) => self.trace_id = Some(s.clone()),
                _ => {
                    self.fields.insert(key, value);
                }
            }
        }
        self
    }

    /// Serializes the entry as one newline-terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Where log lines go.
pub enum LogSink {
    /// Standard output (the default).
    Stdout,
    /// An append-only file.
    File(File),
    /// Any writer, typically an in-memory buffer in tests.
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "LogSink::Stdout"),
            Self::File(file) => f.debug_tuple("LogSink::File").field(file).finish(),
            Self::Writer(_) => write!(f, "LogSink::Writer(<dyn Write>)"),
        }
    }
}

impl LogSink {
    /// Opens `path` for appending, creating it if needed (mode 0666 on Unix).
    pub fn append_file(path: impl AsRef<Path>) -> TelemetryResult<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }

        let file = options.open(path).map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::File(file))
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(line)?;
                out.flush()
            }
            Self::File(file) => file.write_all(line),
            Self::Writer(writer) => {
                writer.write_all(line)?;
                writer.flush()
            }
        }
    }
}

/// Structured logger writing JSON lines to a swappable sink.
///
/// The sink sits behind a mutex so lines from concurrent requests never
/// interleave. Reconfiguring the sink while other threads log is allowed but
/// callers normally do it once during startup or shutdown.
#[derive(Debug)]
pub struct Logger {
    sink: Mutex<LogSink>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Logger {
    /// Creates a logger writing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::with_sink(LogSink::Stdout)
    }

    /// Creates a logger writing to the given sink.
    #[must_use]
    pub fn with_sink(sink: LogSink) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Creates a logger writing to the given writer.
    #[must_use]
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self::with_sink(LogSink::Writer(Box::new(writer)))
    }

    /// Creates a logger backed by an in-memory buffer, returning both.
    #[must_use]
    pub fn in_memory() -> (Self, MemoryWriter) {
        let writer = MemoryWriter::default();
        (Self::with_writer(writer.clone()), writer)
    }

    /// Replaces the sink.
    pub fn set_sink(&self, sink: LogSink) {
        *self.sink.lock() = sink;
    }

    /// Switches output to an append-only file.
    pub fn setup_file_logging(&self, path: impl AsRef<Path>) -> TelemetryResult<()> {
        let sink = LogSink::append_file(path)?;
        self.set_sink(sink);
        Ok(())
    }

    /// Switches output back to standard output, closing any open file.
    pub fn reset(&self) {
        self.set_sink(LogSink::Stdout);
    }

    /// Writes one entry.
    pub fn log(&self, entry: &LogEntry) {
        let line = match entry.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, level = %entry.level, "Error marshaling log entry");
                return;
            }
        };

        if let Err(e) = self.sink.lock().write_line(&line) {
            tracing::error!(error = %e, "Error writing log entry");
        }
    }

    /// Logs at DEBUG.
    pub fn debug(&self, message: &str, fields: LogFields) {
        self.log(&LogEntry::new(LogLevel::Debug, message).with_fields(fields));
    }

    /// Logs at INFO.
    pub fn info(&self, message: &str, fields: LogFields) {
        self.log(&LogEntry::new(LogLevel::Info, message).with_fields(fields));
    }

    /// Logs at WARN.
    pub fn warn(&self, message: &str, fields: LogFields) {
        self.log(&LogEntry::new(LogLevel::Warn, message).with_fields(fields));
    }

    /// Logs at ERROR with an optional attached error.
    pub fn error(&self, message: &str, error: Option<&dyn fmt::Display>, fields: LogFields) {
        self.log(
            &LogEntry::new(LogLevel::Error, message)
                .with_error(error)
                .with_fields(fields),
        );
    }
}

/// Cloneable in-memory writer for capturing log output.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    /// Returns every captured line.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .map(ToString::to_string)
            .collect()
    }

    /// Parses every captured line as a [`LogEntry`], skipping lines that do not parse.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Discards captured output.
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

static GLOBAL_LOGGER: OnceLock<Arc<Logger>> = OnceLock::new();

/// Returns the process-wide logger (standard output until reconfigured).
pub fn global() -> Arc<Logger> {
    Arc::clone(GLOBAL_LOGGER.get_or_init(|| Arc::new(Logger::stdout())))
}

/// Logs at DEBUG on the global logger.
pub fn debug(message: &str, fields: LogFields) {
    global().debug(message, fields);
}

/// Logs at INFO on the global logger.
pub fn info(message: &str, fields: LogFields) {
    global().info(message, fields);
}

/// Logs at WARN on the global logger.
pub fn warn(message: &str, fields: LogFields) {
    global().warn(message, fields);
}

/// Logs at ERROR on the global logger.
pub fn error(message: &str, error: Option<&dyn fmt::Display>, fields: LogFields) {
    global().error(message, error, fields);
}

/// Points the global logger at an append-only file.
pub fn setup_file_logging(path: impl AsRef<Path>) -> TelemetryResult<()> {
    global().setup_file_logging(path)
}

/// Points the global logger back at standard output.
pub fn reset_logging() {
    global().reset();
}
