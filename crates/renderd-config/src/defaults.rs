use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::home_dir;

use crate::framing::FramingMode;
use crate::logging::LogFormat;

/// File name of the daemon socket inside the user's home directory.
pub const DEFAULT_SOCKET_FILE: &str = "server.socket";

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default sleep between idle polls, in milliseconds.
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 100;

/// Default log filter expression used by the daemon.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default framing: short-read detection, compatible with existing clients.
#[must_use]
pub const fn default_framing() -> FramingMode {
    FramingMode::ShortRead
}

/// Default idle poll interval in milliseconds.
#[must_use]
pub const fn default_idle_interval_ms() -> u64 {
    DEFAULT_IDLE_INTERVAL_MS
}

/// Computes the well-known socket path: `server.socket` under the home
/// directory, falling back to the temporary directory.
#[must_use]
pub fn default_socket_path() -> Utf8PathBuf {
    base_directory().join(DEFAULT_SOCKET_FILE)
}

#[cfg(unix)]
fn base_directory() -> Utf8PathBuf {
    home_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory)
}

#[cfg(not(unix))]
fn base_directory() -> Utf8PathBuf {
    fallback_base_directory()
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
