// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Logging and Diagnostics
//!
//! Scheduler code logs through the `log_*!` macros defined here. With the
//! `log` feature enabled every record is forwarded to the [`log`] facade,
//! so whichever `log::Log` sink the kernel installs at boot (UART, ring
//! buffer, ...) receives scheduler messages. Without the feature the
//! macros still type-check their arguments but emit nothing.
//!
//! # Usage
//!
//! ```rust,ignore
//! log_info!("cpu {}: scheduler online", cpu);
//! log_error!("pushState: max nesting depth reached");
//!
//! // Conditional logging
//! log_trace_if!(LOCAL_TRACE, "switch {} -> {}", from, to);
//!
//! // Unrecoverable kernel state
//! fatal!("schedule: no current thread on cpu {}", cpu);
//! ```

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Trace-level logging (very verbose)
    Trace = 0,

    /// Debug-level logging (verbose)
    Debug = 1,

    /// Informational logging
    Info = 2,

    /// Warning-level logging
    Warning = 3,

    /// Error-level logging
    Error = 4,

    /// Fatal errors (will halt the system)
    Fatal = 5,
}

#[cfg(feature = "log")]
impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error | LogLevel::Fatal => log::Level::Error,
        }
    }
}

/// Print a log message at the given level
#[inline]
pub fn log_print(level: LogLevel, args: core::fmt::Arguments) {
    #[cfg(feature = "log")]
    log::log!(target: "rustux::sched", log::Level::from(level), "{}", args);

    #[cfg(not(feature = "log"))]
    let _ = (level, args);
}

/// Log a fatal error message and halt
///
/// Scheduler invariants that cannot be recovered from end here. The
/// kernel's panic handler takes over after the message is recorded.
#[inline(never)]
#[track_caller]
pub fn log_fatal(args: core::fmt::Arguments) -> ! {
    log_print(LogLevel::Fatal, args);
    panic!("{}", args);
}

/// Log a trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::kernel::debug::log_print($crate::kernel::debug::LogLevel::Trace, format_args!($($arg)*))
    };
}

/// Log a trace message if condition is true
#[macro_export]
macro_rules! log_trace_if {
    ($cond:expr, $($arg:tt)*) => {
        if $cond {
            $crate::log_trace!($($arg)*);
        }
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::kernel::debug::log_print($crate::kernel::debug::LogLevel::Debug, format_args!($($arg)*))
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::kernel::debug::log_print($crate::kernel::debug::LogLevel::Info, format_args!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::kernel::debug::log_print($crate::kernel::debug::LogLevel::Warning, format_args!($($arg)*))
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::kernel::debug::log_print($crate::kernel::debug::LogLevel::Error, format_args!($($arg)*))
    };
}

/// Log a fatal message and halt
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::kernel::debug::log_fatal(format_args!($($arg)*))
    };
}
