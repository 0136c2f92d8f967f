//! DICOM-WS data service: entry point.
//!
//! Serves a browser-based DICOM viewer over WebSocket.  The viewer asks for
//! the sorted file list of a series folder, then fetches slices one by one.
//!
//! # Usage
//!
//! ```text
//! dicomws-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>          TOML config file
//!   --deployment <KIND>      combined (port 2025) | standalone (port 8765)
//!   --host <HOST>            Bind host [default: localhost]
//!   --port <PORT>            Bind port, overrides the deployment default
//!   --base-dir <PATH>        Resolve relative request paths against PATH
//!   --scan-timeout <SECS>    Per-request limit, 0 disables [default: 120]
//!   --shutdown-grace <SECS>  Drain time on shutdown [default: 5]
//!   --log-level <FILTER>     tracing filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults < deployment < config file < environment < command line.
//!
//! | Variable                | Flag               |
//! |-------------------------|--------------------|
//! | `DICOMWS_CONFIG`        | `--config`         |
//! | `DICOMWS_DEPLOYMENT`    | `--deployment`     |
//! | `DICOMWS_HOST`          | `--host`           |
//! | `DICOMWS_PORT`          | `--port`           |
//! | `DICOMWS_BASE_DIR`      | `--base-dir`       |
//! | `DICOMWS_SCAN_TIMEOUT`  | `--scan-timeout`   |
//! | `DICOMWS_SHUTDOWN_GRACE`| `--shutdown-grace` |
//! | `DICOMWS_LOG`           | `--log-level`      |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dicomws_server::application::{FsSeriesSource, RequestService};
use dicomws_server::domain::config::timeout_from_secs;
use dicomws_server::domain::{Deployment, FileConfig, ServerConfig};
use dicomws_server::infrastructure::{Listener, SessionRegistry};

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeploymentArg {
    Combined,
    Standalone,
}

impl From<DeploymentArg> for Deployment {
    fn from(arg: DeploymentArg) -> Self {
        match arg {
            DeploymentArg::Combined => Deployment::Combined,
            DeploymentArg::Standalone => Deployment::Standalone,
        }
    }
}

/// WebSocket data service for browser-based DICOM viewers.
#[derive(Debug, Parser)]
#[command(
    name = "dicomws-server",
    about = "Lists DICOM series and streams slice pixels to browser viewers over WebSocket",
    version
)]
struct Cli {
    /// TOML config file; see `ServerConfig` for the keys.
    #[arg(long, env = "DICOMWS_CONFIG")]
    config: Option<PathBuf>,

    /// Which packaging is running.  Only changes the default port.
    #[arg(long, value_enum, env = "DICOMWS_DEPLOYMENT")]
    deployment: Option<DeploymentArg>,

    /// Host name or IP address to bind.
    #[arg(long, env = "DICOMWS_HOST")]
    host: Option<String>,

    /// TCP port to bind.
    #[arg(long, env = "DICOMWS_PORT")]
    port: Option<u16>,

    /// Directory that relative request paths resolve against.
    #[arg(long, env = "DICOMWS_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Seconds one scan or extraction may take; 0 waits indefinitely.
    #[arg(long, env = "DICOMWS_SCAN_TIMEOUT")]
    scan_timeout: Option<u64>,

    /// Seconds to let open requests finish on shutdown.
    #[arg(long, env = "DICOMWS_SHUTDOWN_GRACE")]
    shutdown_grace: Option<u64>,

    /// Log filter used when `RUST_LOG` is unset (e.g. `debug`, `dicomws_core=trace`).
    #[arg(long, env = "DICOMWS_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Layers the config file and the command line over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or holds
    /// an invalid value.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let file = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                FileConfig::from_toml_str(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => FileConfig::default(),
        };

        let deployment = self
            .deployment
            .map(Deployment::from)
            .or(file.server.deployment)
            .unwrap_or_default();
        let mut config = ServerConfig::for_deployment(deployment);
        config.apply_file(&file)?;

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.base_dir {
            config.base_directory = Some(dir);
        }
        if let Some(secs) = self.scan_timeout {
            config.scan_timeout = timeout_from_secs(secs);
        }
        if let Some(secs) = self.shutdown_grace {
            config.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Starts the listener, then blocks until Ctrl+C and shuts it down.
///
/// `main` stays synchronous: the listener owns its own runtime on its own
/// thread, and the main thread only needs a tiny runtime to wait for the
/// signal.
fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;

    // `RUST_LOG` wins over the configured level when set.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "DICOM-WS data service starting on {} (scan timeout: {}, base directory: {})",
        config.bind_address(),
        config
            .scan_timeout
            .map_or_else(|| "none".to_string(), |t| format!("{}s", t.as_secs())),
        config
            .base_directory
            .as_deref()
            .map_or_else(|| "none".to_string(), |d| d.display().to_string()),
    );

    let service = RequestService::new(FsSeriesSource, &config);
    let listener = Listener::start(&config, service, Arc::new(SessionRegistry::new()))
        .context("failed to start the WebSocket listener")?;

    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the signal runtime")?;
    signals
        .block_on(tokio::signal::ctrl_c())
        .context("failed to listen for Ctrl+C")?;

    info!("received Ctrl+C, shutting down");
    listener.stop();
    info!("DICOM-WS data service stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["dicomws-server"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_no_arguments_gives_combined_defaults() {
        // Arrange / Act
        let config = cli(&[]).into_server_config().unwrap();

        // Assert
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 2025);
    }

    #[test]
    fn test_standalone_deployment_changes_default_port() {
        let config = cli(&["--deployment", "standalone"])
            .into_server_config()
            .unwrap();
        assert_eq!(config.port, 8765);
    }

    #[test]
    fn test_explicit_port_beats_deployment() {
        let config = cli(&["--deployment", "standalone", "--port", "9001"])
            .into_server_config()
            .unwrap();
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn test_scan_timeout_zero_disables() {
        let config = cli(&["--scan-timeout", "0"]).into_server_config().unwrap();
        assert_eq!(config.scan_timeout, None);
    }

    #[test]
    fn test_shutdown_grace_and_base_dir_overrides() {
        let config = cli(&["--shutdown-grace", "1", "--base-dir", "/srv/dicom"])
            .into_server_config()
            .unwrap();
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
        assert_eq!(config.base_directory, Some(PathBuf::from("/srv/dicom")));
    }

    #[test]
    fn test_unknown_deployment_is_rejected_by_parser() {
        let result = Cli::try_parse_from(["dicomws-server", "--deployment", "cluster"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_sits_between_defaults_and_flags() {
        // Arrange: the file sets port and host, the flag overrides the port only
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\ndeployment = \"standalone\"\nhost = \"0.0.0.0\"\nport = 7000\n"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        // Act
        let config = cli(&["--config", &path, "--port", "7100"])
            .into_server_config()
            .unwrap();

        // Assert
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7100);
    }

    #[test]
    fn test_config_file_deployment_applies_without_port() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ndeployment = \"standalone\"\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = cli(&["--config", &path]).into_server_config().unwrap();

        assert_eq!(config.port, 8765);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = cli(&["--config", "/definitely/not/here.toml"]).into_server_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let result = cli(&["--config", &path]).into_server_config();

        assert!(result.is_err());
    }
}
