#![deny(missing_docs)]
//! Shared logging utilities for the harvester workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase.
//! Every message is prefixed with the harvest context of the current thread
//! (source name and page ordinal) when one has been set, so interleaved log
//! files from several runs stay readable.

use std::cell::RefCell;

thread_local! {
    /// Source name and page ordinal of the harvest running on this thread.
    static HARVEST_CONTEXT: RefCell<Option<(String, u32)>> = const { RefCell::new(None) };
}

/// Records the source and page the current thread is working on.
/// The harvest session calls this before every page fetch.
pub fn set_harvest_context(source: &str, page: u32) {
    HARVEST_CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        match ctx.as_mut() {
            Some((name, current)) if name == source => *current = page,
            _ => *ctx = Some((source.to_string(), page)),
        }
    });
}

/// Forgets the harvest context of the current thread.
pub fn clear_harvest_context() {
    HARVEST_CONTEXT.with(|ctx| *ctx.borrow_mut() = None);
}

/// Returns the log prefix for the current thread, e.g. `"[tvil p3] "`.
/// Returns an empty string outside of a harvest.
pub fn context_prefix() -> String {
    HARVEST_CONTEXT.with(|ctx| match ctx.borrow().as_ref() {
        Some((source, page)) => format!("[{source} p{page}] "),
        None => String::new(),
    })
}

#[doc(hidden)]
#[macro_export]
macro_rules! __engine_log {
    ($level:ident, $($arg:tt)*) => {{
        log::$level!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// `log::trace!` with the harvest context prefix.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => { $crate::__engine_log!(trace, $($arg)*) };
}

/// `log::debug!` with the harvest context prefix.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => { $crate::__engine_log!(debug, $($arg)*) };
}

/// `log::info!` with the harvest context prefix.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => { $crate::__engine_log!(info, $($arg)*) };
}

/// `log::warn!` with the harvest context prefix.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => { $crate::__engine_log!(warn, $($arg)*) };
}

/// `log::error!` with the harvest context prefix.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => { $crate::__engine_log!(error, $($arg)*) };
}

/// Installs a terminal logger for tests at debug level, keeping HTTP client
/// internals quiet. Later calls are no-ops.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

    let config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();
    let _ = TermLogger::init(
        log::LevelFilter::Debug,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}
