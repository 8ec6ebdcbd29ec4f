// crates/kontrol-core/src/logging.rs
// ============================================================================
// Module: Registry Logging
// Description: Leveled logger interface and JSON-lines sinks.
// Purpose: Report sweeper outcomes and bootstrap warnings without globals.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The registry consumes a narrow [`Logger`] interface with five levels.
//! Level filtering is driven by an explicit [`LogLevelState`] shared by `Arc`
//! between the sink and whoever controls verbosity; there is no process-wide
//! mutable flag. [`StderrLogger`] emits one JSON object per line so events
//! can be routed to any log pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de;

// ============================================================================
// SECTION: Levels
// ============================================================================

/// Environment variable holding the default log level.
pub const LOG_LEVEL_ENV_VAR: &str = "KITE_LOG_LEVEL";

/// Log severity, ordered from most to least severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Unrecoverable failure.
    Fatal,
    /// Operation failed.
    Error,
    /// Degraded but continuing.
    Warning,
    /// Routine operational event.
    #[default]
    Info,
    /// Diagnostic detail.
    Debug,
}

impl LogLevel {
    /// Returns the upper-case level label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Parses a level label case-insensitively, rejecting unknown labels.
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "FATAL" => Some(Self::Fatal),
            "ERROR" => Some(Self::Error),
            "WARNING" => Some(Self::Warning),
            "INFO" => Some(Self::Info),
            "DEBUG" => Some(Self::Debug),
            _ => None,
        }
    }

    /// Parses a level label case-insensitively. Unknown labels mean `Info`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        Self::parse_label(label).unwrap_or(Self::Info)
    }

    /// Reads the level from [`LOG_LEVEL_ENV_VAR`], defaulting to `Info`.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(LOG_LEVEL_ENV_VAR).map_or(Self::Info, |value| Self::from_label(&value))
    }

    /// Inverse of `self as u8`.
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Fatal,
            1 => Self::Error,
            2 => Self::Warning,
            3 => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// Level labels accepted in configuration, in any letter case.
const LEVEL_LABELS: &[&str] = &["fatal", "error", "warning", "info", "debug"];

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::parse_label(&label).ok_or_else(|| de::Error::unknown_variant(&label, LEVEL_LABELS))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Level State
// ============================================================================

/// Explicit, shareable log verbosity control.
///
/// Debug mode overrides the base level until disabled, after which the base
/// level applies again.
#[derive(Debug)]
pub struct LogLevelState {
    /// Level used when debug mode is off.
    base: AtomicU8,
    /// Whether debug mode is on.
    debug: AtomicBool,
}

impl Default for LogLevelState {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl LogLevelState {
    /// Creates a level state with the given base level and debug mode off.
    #[must_use]
    pub const fn new(base: LogLevel) -> Self {
        Self {
            base: AtomicU8::new(base as u8),
            debug: AtomicBool::new(false),
        }
    }

    /// Returns the level currently in effect.
    #[must_use]
    pub fn current_level(&self) -> LogLevel {
        if self.debug.load(Ordering::Acquire) {
            LogLevel::Debug
        } else {
            LogLevel::from_u8(self.base.load(Ordering::Acquire))
        }
    }

    /// Returns true when events at `level` should be emitted.
    #[must_use]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level <= self.current_level()
    }

    /// Replaces the base level.
    pub fn set_base_level(&self, level: LogLevel) {
        self.base.store(level as u8, Ordering::Release);
    }

    /// Turns debug mode on.
    pub fn enable_debug(&self) {
        self.debug.store(true, Ordering::Release);
    }

    /// Turns debug mode off, restoring the base level.
    pub fn disable_debug(&self) {
        self.debug.store(false, Ordering::Release);
    }

    /// Flips debug mode and returns whether it is now on.
    pub fn toggle_debug(&self) -> bool {
        !self.debug.fetch_xor(true, Ordering::AcqRel)
    }

    /// Returns whether debug mode is on.
    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Acquire)
    }
}

// ============================================================================
// SECTION: Logger Trait
// ============================================================================

/// Leveled logger consumed by the registry.
///
/// `fatal` only records the event; aborting is left to the caller.
pub trait Logger: Send + Sync {
    /// Records a formatted message at `level`.
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>);

    /// Records a fatal message.
    fn fatal(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Fatal, args);
    }

    /// Records an error message.
    fn error(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }

    /// Records a warning message.
    fn warning(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Warning, args);
    }

    /// Records an informational message.
    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    /// Records a debug message.
    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// JSON log line payload.
#[derive(Debug, Serialize)]
struct LogEvent<'a> {
    /// Event identifier.
    event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    timestamp_ms: u128,
    /// Logger name.
    logger: &'a str,
    /// Severity.
    level: LogLevel,
    /// Rendered message.
    message: String,
}

/// Logger that writes JSON lines to stderr or another byte sink.
pub struct StderrLogger {
    /// Logger name included in every event.
    name: String,
    /// Shared verbosity control.
    level: Arc<LogLevelState>,
    /// Destination of the rendered lines.
    sink: Mutex<Box<dyn Write + Send>>,
}

impl StderrLogger {
    /// Creates a stderr logger filtered by the shared level state.
    #[must_use]
    pub fn new(name: impl Into<String>, level: Arc<LogLevelState>) -> Self {
        Self::with_writer(name, level, std::io::stderr())
    }

    /// Creates a logger that writes its JSON lines to `writer`.
    #[must_use]
    pub fn with_writer(
        name: impl Into<String>,
        level: Arc<LogLevelState>,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            sink: Mutex::new(Box::new(writer)),
        }
    }

    /// Returns the shared level state.
    #[must_use]
    pub const fn level_state(&self) -> &Arc<LogLevelState> {
        &self.level
    }
}

impl Logger for StderrLogger {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if !self.level.is_enabled(level) {
            return;
        }
        let event = LogEvent {
            event: "log",
            timestamp_ms: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis(),
            logger: &self.name,
            level,
            message: args.to_string(),
        };
        if let Ok(payload) = serde_json::to_string(&event)
            && let Ok(mut sink) = self.sink.lock()
        {
            let _ = writeln!(sink, "{payload}");
            let _ = sink.flush();
        }
    }
}

/// Logger that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _args: fmt::Arguments<'_>) {}
}

/// Logger that keeps events in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    /// Recorded events in arrival order.
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    /// Creates an empty memory logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, args.to_string()));
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Unit tests use unwrap for setup clarity.")]
mod tests {
    use std::io;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::LogLevel;
    use super::LogLevelState;
    use super::Logger;
    use super::MemoryLogger;
    use super::StderrLogger;

    /// Byte buffer shared between a logger and the test reading it.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        /// Parses every written line as JSON.
        fn lines(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(LogLevel::from_label("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_label("Warning"), LogLevel::Warning);
        assert_eq!(LogLevel::from_label("bogus"), LogLevel::Info);
        assert_eq!(LogLevel::from_label(""), LogLevel::Info);
    }

    #[test]
    fn debug_toggle_restores_base_level() {
        let state = LogLevelState::new(LogLevel::Warning);
        assert!(!state.is_enabled(LogLevel::Info));
        assert!(state.toggle_debug());
        assert_eq!(state.current_level(), LogLevel::Debug);
        assert!(state.is_enabled(LogLevel::Debug));
        assert!(!state.toggle_debug());
        assert_eq!(state.current_level(), LogLevel::Warning);
        state.enable_debug();
        state.disable_debug();
        assert!(!state.debug_enabled());
    }

    #[test]
    fn memory_logger_records_formatted_messages() {
        let logger = MemoryLogger::new();
        logger.info(format_args!("cleaned up {} rows", 3));
        logger.warning(format_args!("index: {}", "exists"));
        assert_eq!(
            logger.entries(),
            [
                (LogLevel::Info, "cleaned up 3 rows".to_string()),
                (LogLevel::Warning, "index: exists".to_string())
            ]
        );
    }

    #[test]
    fn json_logger_filters_by_shared_level() {
        let buffer = SharedBuffer::default();
        let state = Arc::new(LogLevelState::new(LogLevel::Warning));
        let logger = StderrLogger::with_writer("kontrol", Arc::clone(&state), buffer.clone());
        logger.info(format_args!("suppressed"));
        logger.warning(format_args!("index missing"));
        state.enable_debug();
        logger.debug(format_args!("now visible"));
        state.disable_debug();
        logger.info(format_args!("suppressed again"));

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "log");
        assert_eq!(lines[0]["logger"], "kontrol");
        assert_eq!(lines[0]["level"], "warning");
        assert_eq!(lines[0]["message"], "index missing");
        assert!(lines[0]["timestamp_ms"].is_u64());
        assert_eq!(lines[1]["level"], "debug");
        assert_eq!(lines[1]["message"], "now visible");
    }

    #[test]
    fn levels_deserialize_in_any_case() {
        let parsed: Vec<LogLevel> =
            serde_json::from_str(r#"["WARNING", "Debug", "info", "fAtAl", "error"]"#).unwrap();
        assert_eq!(
            parsed,
            [LogLevel::Warning, LogLevel::Debug, LogLevel::Info, LogLevel::Fatal, LogLevel::Error]
        );
        assert!(serde_json::from_str::<LogLevel>(r#""verbose""#).is_err());
        assert_eq!(serde_json::to_string(&LogLevel::Warning).unwrap(), r#""warning""#);
    }
}
