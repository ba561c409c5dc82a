//! Structured console logging with visual formatting.
//!
//! The controller prints a single continuous "pipe" of output: a version header,
//! blocks of related lines, and semantic `[LEVEL]` lines for faults. All macros
//! go through [`write_output`] so output can be redirected to a file with `--log`.
//!
//! ## Logging Conventions
//!
//! - **`log_block_start!`**: opens a new conceptual block (startup phases, a new
//!   measurement cycle). Prints an empty pipe `┃` then `┣ message`.
//! - **`log_decorated!`**: a line inside the current block, `┣ message`.
//! - **`log_indented!`**: nested detail, `┃   message`.
//! - **`log_pipe!`**: an empty `┃` spacer, used before a semantic message that
//!   starts its own block.
//! - **`log_version!`** / **`log_end!`**: header and terminator, once per run.
//! - **`log_debug!`, `log_info!`, `log_warning!`, `log_error!`, `log_critical!`**:
//!   semantic messages with a `[LEVEL]` prefix. These honour the minimum level
//!   set with [`Log::set_level`]; the box-drawing macros are always printed.

use std::fmt::Display;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{Sender, channel};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

static TIMESTAMPS_ENABLED: AtomicBool = AtomicBool::new(false);

static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

// Channel for routing output to file when --log is active
static LOG_CHANNEL: OnceLock<Option<Sender<LogMessage>>> = OnceLock::new();

enum LogMessage {
    Formatted(String),
    Shutdown,
}

/// Severity of a semantic log line, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            _ => LogLevel::Critical,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    /// Case-insensitive, so `--verbose debug` and `--verbose DEBUG` both work.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => anyhow::bail!(
                "unknown log level '{other}' (expected DEBUG, INFO, WARNING, ERROR or CRITICAL)"
            ),
        }
    }
}

/// Process-wide switches for the console logger.
pub struct Log;

impl Log {
    /// Enable or disable all output, e.g. to keep test output quiet.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Set the minimum level for the semantic `[LEVEL]` macros.
    pub fn set_level(level: LogLevel) {
        MIN_LEVEL.store(level as u8, Ordering::SeqCst);
    }

    pub fn level() -> LogLevel {
        LogLevel::from_u8(MIN_LEVEL.load(Ordering::SeqCst))
    }

    /// Whether a semantic message of `level` should be printed.
    pub fn allows(level: LogLevel) -> bool {
        Self::is_enabled() && level >= Self::level()
    }

    /// Prefix every line with the local wall-clock time.
    pub fn set_timestamps(enabled: bool) {
        TIMESTAMPS_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Start file logging to the specified path.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        LOG_CHANNEL
            .set(Some(tx.clone()))
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        let handle = std::thread::spawn(move || {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_path)?;

            loop {
                match rx.recv() {
                    Ok(LogMessage::Formatted(text)) => {
                        file.write_all(text.as_bytes())?;
                    }
                    Ok(LogMessage::Shutdown) | Err(_) => {
                        file.flush()?;
                        break;
                    }
                }
            }

            Ok::<(), anyhow::Error>(())
        });

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// `[HH:MM:SS] ` when timestamps are enabled, empty otherwise.
    pub fn get_timestamp_prefix() -> String {
        if TIMESTAMPS_ENABLED.load(Ordering::SeqCst) {
            format!("[{}] ", chrono::Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Guard for file logging that flushes and joins the writer thread on drop.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// Strip ESC [ ... m sequences so log files stay readable
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for ch in chars.by_ref() {
                    if ch == 'm' {
                        break;
                    }
                }
            } else {
                result.push(ch);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Shape of one line in the output pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// `┣ message`
    Line,
    /// `┃   message`
    Indented,
    /// `┃` then `┣ message`
    Block,
    /// `┃`
    Pipe,
    /// `┏ message ━━╸`
    Header,
    /// `╹`
    End,
    /// `┃` then `┗[ERROR] message`
    Exit,
}

fn frame_line(frame: Frame, prefix: &str, message: &dyn Display) -> String {
    match frame {
        Frame::Line => format!("{prefix}┣ {message}\n"),
        Frame::Indented => format!("{prefix}┃   {message}\n"),
        Frame::Block => format!("{prefix}┃\n{prefix}┣ {message}\n"),
        Frame::Pipe => format!("{prefix}┃\n"),
        Frame::Header => format!("{prefix}┏ {message} ━━╸\n"),
        Frame::End => format!("{prefix}╹\n"),
        Frame::Exit => format!("{prefix}┃\n{prefix}┗[\x1b[31mERROR\x1b[0m] {message}\n"),
    }
}

fn level_line(level: LogLevel, prefix: &str, message: &dyn Display) -> String {
    let color = match level {
        LogLevel::Debug => "36",
        LogLevel::Info => "32",
        LogLevel::Warning => "33",
        LogLevel::Error => "31",
        LogLevel::Critical => "1;31",
    };
    format!("{prefix}┣[\x1b[{color}m{}\x1b[0m] {message}\n", level.as_str())
}

/// Print a box-drawing line. Used by the layout macros.
pub fn emit(frame: Frame, message: &dyn Display) {
    if Log::is_enabled() {
        write_output(&frame_line(frame, &Log::get_timestamp_prefix(), message));
    }
}

/// Print a `[LEVEL]` line if the level passes the filter. Used by the semantic macros.
pub fn emit_level(level: LogLevel, message: &dyn Display) {
    if Log::allows(level) {
        write_output(&level_line(level, &Log::get_timestamp_prefix(), message));
    }
}

/// Route text to the log file when `--log` is active, stdout otherwise.
pub fn write_output(text: &str) {
    if let Some(Some(tx)) = LOG_CHANNEL.get() {
        let _ = tx.send(LogMessage::Formatted(strip_ansi_codes(text)));
    } else {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

// # Logging Macros

/// Log a decorated message, typically as part of an existing block.
#[macro_export]
macro_rules! log_decorated {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Frame::Line, &format_args!($fmt $($arg)*))
    };
    ($expr:expr) => {
        $crate::logger::emit($crate::logger::Frame::Line, &$expr)
    };
}

/// Log an indented message for sub-items or details within a block.
#[macro_export]
macro_rules! log_indented {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Frame::Indented, &format_args!($fmt $($arg)*))
    };
    ($expr:expr) => {
        $crate::logger::emit($crate::logger::Frame::Indented, &$expr)
    };
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {
        $crate::logger::emit($crate::logger::Frame::Pipe, &"")
    };
}

/// Open a new conceptual block of information.
#[macro_export]
macro_rules! log_block_start {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Frame::Block, &format_args!($fmt $($arg)*))
    };
    ($expr:expr) => {
        $crate::logger::emit($crate::logger::Frame::Block, &$expr)
    };
}

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    () => {
        $crate::logger::emit(
            $crate::logger::Frame::Header,
            &concat!("greenhouse v", env!("CARGO_PKG_VERSION")),
        )
    };
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {
        $crate::logger::emit($crate::logger::Frame::End, &"")
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_level {
    ($level:ident, $fmt:literal $($arg:tt)*) => {
        $crate::logger::emit_level($crate::logger::LogLevel::$level, &format_args!($fmt $($arg)*))
    };
    ($level:ident, $expr:expr) => {
        $crate::logger::emit_level($crate::logger::LogLevel::$level, &$expr)
    };
}

/// Log a debug/operational message in cyan.
#[macro_export]
macro_rules! log_debug {
    ($($t:tt)*) => { $crate::__log_level!(Debug, $($t)*) };
}

/// Log an informational message in green.
#[macro_export]
macro_rules! log_info {
    ($($t:tt)*) => { $crate::__log_level!(Info, $($t)*) };
}

/// Log a warning message in yellow.
#[macro_export]
macro_rules! log_warning {
    ($($t:tt)*) => { $crate::__log_level!(Warning, $($t)*) };
}

/// Log an error message in red.
#[macro_export]
macro_rules! log_error {
    ($($t:tt)*) => { $crate::__log_level!(Error, $($t)*) };
}

/// Log a critical message in bold red.
#[macro_export]
macro_rules! log_critical {
    ($($t:tt)*) => { $crate::__log_level!(Critical, $($t)*) };
}

/// Log an error with a terminal corner, ending the output flow.
#[macro_export]
macro_rules! log_error_exit {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Frame::Exit, &format_args!($fmt $($arg)*))
    };
    ($expr:expr) => {
        $crate::logger::emit($crate::logger::Frame::Exit, &$expr)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(
            strip_ansi_codes("┣[\x1b[33mWARNING\x1b[0m] relay busy"),
            "┣[WARNING] relay busy"
        );
        assert_eq!(strip_ansi_codes("plain"), "plain");
    }

    #[test]
    fn test_frame_shapes() {
        assert_eq!(frame_line(Frame::Line, "", &"ready"), "┣ ready\n");
        assert_eq!(frame_line(Frame::Block, "", &"cycle 1"), "┃\n┣ cycle 1\n");
        assert_eq!(
            frame_line(Frame::Indented, "[12:00:00] ", &"lux 256.0"),
            "[12:00:00] ┃   lux 256.0\n"
        );
        assert_eq!(frame_line(Frame::End, "", &""), "╹\n");
    }

    #[test]
    fn test_level_line_is_colored_by_severity() {
        let line = level_line(LogLevel::Warning, "", &"relay busy");
        assert_eq!(line, "┣[\x1b[33mWARNING\x1b[0m] relay busy\n");
        assert_eq!(strip_ansi_codes(&line), "┣[WARNING] relay busy\n");
    }

    #[test]
    fn test_level_parsing_is_case_insensitive() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("Critical".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    #[serial]
    fn test_min_level_filters_semantic_messages() {
        let original = Log::level();

        Log::set_level(LogLevel::Warning);
        assert!(!Log::allows(LogLevel::Info));
        assert!(Log::allows(LogLevel::Warning));
        assert!(Log::allows(LogLevel::Critical));

        Log::set_level(original);
    }
}
