//! Logging setup plus conditional logging macros.
//!
//! Modules that log through these macros declare their own switch:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//!
//! log_info!("popup opened for session {}", key);
//! ```
//! Flipping the flag to `false` silences a noisy module without touching
//! the global `RUST_LOG` filter.

use log::LevelFilter;

/// Initialise `env_logger` once. `RUST_LOG` still wins over the defaults.
pub fn init_logging(debug: bool) {
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warnings are for recoverable trouble, e.g. a dropped heartbeat.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
