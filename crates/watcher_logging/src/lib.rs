#![deny(missing_docs)]
//! Shared logging utilities for the watcher workspace.
//!
//! This crate provides the `watch_*` logging macros used across the codebase,
//! a per-thread scan-cycle counter used to tag log lines, and the mapping from
//! the `logLevel` setting onto `log` level filters.

use std::cell::Cell;

use log::LevelFilter;

thread_local! {
    /// Thread-local storage for the current scan cycle number.
    static SCAN_CYCLE: Cell<u64> = const { Cell::new(0) };
}

/// Sets the scan cycle number for the current thread.
/// The host bumps this once per page load; the engine thread copies the
/// value that arrives with each command.
pub fn set_scan_cycle(cycle: u64) {
    SCAN_CYCLE.with(|v| v.set(cycle));
}

/// Retrieves the scan cycle number for the current thread.
/// Returns 0 if no cycle has been recorded yet.
pub fn scan_cycle() -> u64 {
    SCAN_CYCLE.with(|v| v.get())
}

/// Highest accepted `logLevel` setting value.
pub const MAX_VERBOSITY: u8 = 4;

/// Maps the `logLevel` setting (0..=4) onto a level filter.
///
/// 0 is errors only, 4 is everything. Values above 4 saturate.
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Applies a new `logLevel` setting to the global logger at runtime.
pub fn apply_verbosity(verbosity: u8) {
    log::set_max_level(level_for_verbosity(verbosity));
}

/// Logs a trace-level message tagged with the current scan cycle.
#[macro_export]
macro_rules! watch_trace {
    ($($arg:tt)*) => {{
        log::trace!("[cycle {}] {}", $crate::scan_cycle(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the current scan cycle.
#[macro_export]
macro_rules! watch_debug {
    ($($arg:tt)*) => {{
        log::debug!("[cycle {}] {}", $crate::scan_cycle(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the current scan cycle.
#[macro_export]
macro_rules! watch_info {
    ($($arg:tt)*) => {{
        log::info!("[cycle {}] {}", $crate::scan_cycle(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the current scan cycle.
#[macro_export]
macro_rules! watch_warn {
    ($($arg:tt)*) => {{
        log::warn!("[cycle {}] {}", $crate::scan_cycle(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the current scan cycle.
#[macro_export]
macro_rules! watch_error {
    ($($arg:tt)*) => {{
        log::error!("[cycle {}] {}", $crate::scan_cycle(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
