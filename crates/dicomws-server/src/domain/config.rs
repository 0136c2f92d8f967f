//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is built in layers, lowest precedence first:
//!
//! 1. Built-in defaults for the chosen [`Deployment`].
//! 2. An optional TOML file ([`FileConfig`]).
//! 3. Command-line flags and environment variables (applied in `main.rs`).
//!
//! # Two deployments
//!
//! The service ships in two shapes that have always listened on different
//! ports: embedded next to the desktop application (`combined`, port 2025) and
//! as a standalone process (`standalone`, port 8765).  Neither is canonical;
//! the deployment only picks the default port, and `port` overrides it.
//!
//! # Example TOML
//!
//! ```toml
//! [server]
//! host = "localhost"
//! port = 2025
//! shutdown_grace_secs = 5
//! scan_timeout_secs = 120   # 0 disables the timeout
//! base_directory = "/data/cases/patient-42"
//! log_level = "debug"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default port of the service embedded alongside the desktop application.
pub const COMBINED_PORT: u16 = 2025;

/// Default port of the standalone service.
pub const STANDALONE_PORT: u16 = 8765;

/// Error type for configuration parsing and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Which packaging of the service is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Runs next to the desktop application.
    #[default]
    Combined,
    /// Runs as its own process.
    Standalone,
}

impl Deployment {
    pub fn default_port(self) -> u16 {
        match self {
            Deployment::Combined => COMBINED_PORT,
            Deployment::Standalone => STANDALONE_PORT,
        }
    }
}

/// All runtime configuration for the data service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Host name or IP address to bind.  `localhost` resolves to loopback.
    pub host: String,

    /// TCP port to bind.  `0` asks the OS for a free port.
    pub port: u16,

    /// How long [`stop`](crate::infrastructure::ws_server::Listener::stop)
    /// waits for in-flight responses before closing connections forcibly.
    pub shutdown_grace: Duration,

    /// Upper bound on one scan or extraction.  `None` waits indefinitely.
    pub scan_timeout: Option<Duration>,

    /// Directory that relative `dicom_folder` / `file_path` values resolve against.
    pub base_directory: Option<PathBuf>,

    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    /// | Field           | Default      |
    /// |-----------------|--------------|
    /// | host            | `localhost`  |
    /// | port            | `2025`       |
    /// | shutdown_grace  | 5 seconds    |
    /// | scan_timeout    | 120 seconds  |
    /// | base_directory  | none         |
    /// | log_level       | `info`       |
    fn default() -> Self {
        Self::for_deployment(Deployment::Combined)
    }
}

impl ServerConfig {
    /// Defaults for `deployment`; only the port differs between deployments.
    pub fn for_deployment(deployment: Deployment) -> Self {
        Self {
            host: "localhost".to_string(),
            port: deployment.default_port(),
            shutdown_grace: Duration::from_secs(5),
            scan_timeout: Some(Duration::from_secs(120)),
            base_directory: None,
            log_level: "info".to_string(),
        }
    }

    /// The `host:port` string used in log lines and bind errors.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Overlays every key present in `file` onto `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty host or log level.
    pub fn apply_file(&mut self, file: &FileConfig) -> Result<(), ConfigError> {
        let section = &file.server;
        if let Some(host) = &section.host {
            if host.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "server.host",
                    reason: "must not be empty".to_string(),
                });
            }
            self.host = host.clone();
        }
        if let Some(port) = section.port {
            self.port = port;
        }
        if let Some(secs) = section.shutdown_grace_secs {
            self.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = section.scan_timeout_secs {
            self.scan_timeout = timeout_from_secs(secs);
        }
        if let Some(dir) = &section.base_directory {
            self.base_directory = Some(dir.clone());
        }
        if let Some(level) = &section.log_level {
            if level.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "server.log_level",
                    reason: "must not be empty".to_string(),
                });
            }
            self.log_level = level.clone();
        }
        Ok(())
    }
}

/// Converts a seconds value where `0` means "no timeout".
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// On-disk configuration file layout.
///
/// Every key is optional; absent keys leave the lower layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
}

/// The `[server]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub deployment: Option<Deployment>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub shutdown_grace_secs: Option<u64>,
    pub scan_timeout_secs: Option<u64>,
    pub base_directory: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
