//! Log subscriber setup
//!
//! The host owns stdout/stderr, so output stays quiet (`WARN`) unless
//! `HDMISUPPLY_DEBUG` is set or the config asks for debug logging.

use tracing::Level;

/// Environment variable that turns on debug logging
pub const DEBUG_ENV: &str = "HDMISUPPLY_DEBUG";

/// Whether the environment asks for debug logging
pub fn debug_requested() -> bool {
    std::env::var_os(DEBUG_ENV).is_some()
}

/// Install a fmt subscriber at `DEBUG` or `WARN`
///
/// Returns `false` if a global subscriber was already installed, which is
/// normal when several instances load in one process.
pub fn init_logging(debug: bool) -> bool {
    let level = if debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
