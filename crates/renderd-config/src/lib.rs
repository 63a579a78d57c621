//! Shared configuration for the `renderd` template render daemon.
//!
//! Configuration is layered through [`ortho_config`]: built-in defaults, then
//! `.renderd.toml` files, then `RENDERD_*` environment variables, then
//! command-line flags such as `--socket-path` and `--framing`.

mod defaults;
mod framing;
mod logging;
mod socket;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_IDLE_INTERVAL_MS, DEFAULT_LOG_FILTER, DEFAULT_SOCKET_FILE, default_framing,
    default_idle_interval_ms, default_log_filter, default_log_filter_string,
    default_log_format, default_socket_path,
};
pub use framing::{FramingMode, FramingModeParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use ortho_config::{OrthoError, OrthoResult};
pub use socket::{SocketPreparationError, prepare_socket_directory};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "RENDERD")]
pub struct Config {
    /// Filesystem path of the Unix domain socket the daemon binds.
    #[serde(default = "defaults::default_socket_path")]
    #[ortho_config(default = defaults::default_socket_path())]
    pub socket_path: Utf8PathBuf,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format of the telemetry subscriber.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Message framing used in both directions on the socket.
    #[serde(default = "defaults::default_framing")]
    #[ortho_config(default = defaults::default_framing())]
    pub framing: FramingMode,
    /// Sleep between idle polls of the client connection, in milliseconds.
    #[serde(default = "defaults::default_idle_interval_ms")]
    #[ortho_config(default = defaults::default_idle_interval_ms())]
    pub idle_interval_ms: u64,
    /// Upper bound on a single framed message. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            framing: default_framing(),
            idle_interval_ms: default_idle_interval_ms(),
            max_message_bytes: None,
        }
    }
}

impl Config {
    /// Path of the daemon socket.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        self.socket_path.as_path()
    }

    /// Configured `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Configured framing mode.
    #[must_use]
    pub const fn framing(&self) -> FramingMode {
        self.framing
    }

    /// Idle poll interval between empty reads.
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Optional limit on accumulated message size.
    #[must_use]
    pub const fn max_message_bytes(&self) -> Option<usize> {
        self.max_message_bytes
    }

    /// Ensures the socket's parent directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the path has no parent or the
    /// directory cannot be created.
    pub fn prepare_socket_filesystem(&self) -> Result<(), SocketPreparationError> {
        prepare_socket_directory(self.socket_path())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_match_public_helpers() {
        let config = Config::default();
        assert_eq!(config.socket_path(), default_socket_path().as_path());
        assert_eq!(config.log_filter(), default_log_filter());
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.framing(), FramingMode::ShortRead);
        assert_eq!(config.idle_interval(), Duration::from_millis(100));
        assert!(config.max_message_bytes().is_none());
    }

    #[rstest]
    fn socket_path_ends_with_well_known_file() {
        let path = default_socket_path();
        assert_eq!(path.file_name(), Some(DEFAULT_SOCKET_FILE));
    }
}
