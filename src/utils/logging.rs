//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Modules with per-tick or per-step output (the session ticker, audio
//! fades) define the flag so that output can be silenced at compile time
//! without touching `RUST_LOG`:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = false;
//! use crate::log_debug;
//!
//! log_debug!("fade step {i}");
//! ```

/// Info logging, emitted only when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Debug logging, emitted only when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
