//! Host port surface: logging, fatal termination, and time sources.
//!
//! The engine never talks to the operating system directly; everything goes
//! through a [`HostPort`] owned by the context. Embedders on unusual targets
//! supply their own port; everyone else uses [`StdPort`].

use std::time::{SystemTime, UNIX_EPOCH};

use strum::Display;

use crate::exception::FatalCode;

/// Severity of a host log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Debug,
    Trace,
}

/// Services the engine requires from its embedder.
///
/// `fatal` must not return; the remaining methods are infallible. The time
/// methods exist for Date-style built-ins and are also used to seed the
/// context's random state.
pub trait HostPort {
    /// Emits one log line at the given severity.
    fn log(&mut self, level: LogLevel, message: &str);

    /// Terminates the process with the given fatal code.
    ///
    /// Implementations must not return; the default behavior is to log the
    /// code and abort.
    fn fatal(&mut self, code: FatalCode) -> ! {
        self.log(LogLevel::Error, &format!("Error: {code}"));
        std::process::abort();
    }

    /// Milliseconds since the Unix epoch.
    fn current_time_ms(&mut self) -> f64;

    /// Local time zone offset from UTC in minutes.
    fn time_zone_offset_minutes(&mut self) -> i32 {
        0
    }
}

/// Default port: stderr logging, `abort` on fatal, system clock.
#[derive(Debug, Default)]
pub struct StdPort;

impl HostPort for StdPort {
    fn log(&mut self, level: LogLevel, message: &str) {
        eprintln!("[{level}] {message}");
    }

    fn current_time_ms(&mut self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |elapsed| elapsed.as_secs_f64() * 1000.0)
    }
}

/// Port for tests: swallows log output, panics on fatal so failures surface
/// as test failures instead of process aborts.
#[derive(Debug, Default)]
pub struct PanicPort;

impl HostPort for PanicPort {
    fn log(&mut self, _level: LogLevel, _message: &str) {}

    fn fatal(&mut self, code: FatalCode) -> ! {
        panic!("fatal engine error: {code}");
    }

    fn current_time_ms(&mut self) -> f64 {
        0.0
    }
}
