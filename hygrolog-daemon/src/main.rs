//! Temperature/humidity appliance daemon.
//!
//! Samples a sensor on a fixed cadence, appends readings to a hygrolog
//! file, compacts it to the retention window, and serves the history over
//! HTTP. Everything runs on one thread.

mod api;
mod appliance;
mod sensor;

use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hygrolog::clock::SystemClock;
use hygrolog::config::{self, LogConfig};
use hygrolog::HygroError;
use tracing_subscriber::EnvFilter;

use crate::appliance::Appliance;
use crate::sensor::SensorSpec;

/// hygrolog-daemon — sensor appliance with an embedded history log.
#[derive(Parser)]
#[command(name = "hygrolog-daemon", version, about)]
struct Cli {
    /// JSON configuration file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the log file.
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Address for the HTTP API.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// History to keep (e.g. "7d", "36h").
    #[arg(long, value_parser = config::parse_duration)]
    retention: Option<Duration>,

    /// Time between samples (e.g. "60s").
    #[arg(long, value_parser = config::parse_duration)]
    sample_interval: Option<Duration>,

    /// Minimum time between compactions (e.g. "6h").
    #[arg(long, value_parser = config::parse_duration)]
    compact_interval: Option<Duration>,

    /// How long to wait at boot for the system clock to be set.
    #[arg(long, value_parser = config::parse_duration, default_value = "8s")]
    clock_wait: Duration,

    /// Sensor backend: "simulated" or "file:<path>".
    #[arg(long, default_value = "simulated")]
    sensor: SensorSpec,
}

/// Failures that stop the daemon before it starts serving.
#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error(transparent)]
    Config(#[from] HygroError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("API server failed: {0}")]
    Serve(#[source] std::io::Error),
}

impl Cli {
    /// Resolves the effective configuration: file first, then flags.
    fn log_config(&self) -> Result<LogConfig, HygroError> {
        let mut config = match &self.config {
            Some(path) => LogConfig::load(path)?,
            None => LogConfig::default(),
        };

        if let Some(path) = &self.log_path {
            config.path.clone_from(path);
        }
        if let Some(retention) = self.retention {
            config.retention = retention;
        }
        if let Some(interval) = self.sample_interval {
            config.sample_interval = interval;
        }
        if let Some(interval) = self.compact_interval {
            config.compact_interval = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        tracing::error!("daemon failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), DaemonError> {
    let config = cli.log_config()?;
    tracing::info!(
        path = %config.path.display(),
        retention = %config::format_duration(config.retention),
        sample_interval = %config::format_duration(config.sample_interval),
        compact_interval = %config::format_duration(config.compact_interval),
        sensor = %cli.sensor,
        "starting"
    );

    let mut appliance = Appliance::boot(config, SystemClock, cli.sensor.build(), cli.clock_wait);

    let listener = TcpListener::bind(cli.listen).map_err(|source| DaemonError::Bind {
        addr: cli.listen,
        source,
    })?;
    appliance.serve(&listener).map_err(DaemonError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, r#"{"path": "/data/a.csv", "retention": 172800, "sample_interval": 30}"#)
            .unwrap();

        let cli = Cli::parse_from([
            "hygrolog-daemon",
            "--config",
            file.to_str().unwrap(),
            "--retention",
            "3d",
            "--sensor",
            "file:/tmp/sensor",
        ]);
        let config = cli.log_config().unwrap();

        assert_eq!(config.path, PathBuf::from("/data/a.csv"));
        assert_eq!(config.retention, Duration::from_secs(3 * 86_400));
        assert_eq!(config.sample_interval, Duration::from_secs(30));
        assert_eq!(cli.sensor, SensorSpec::File(PathBuf::from("/tmp/sensor")));
        assert_eq!(cli.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from(["hygrolog-daemon", "--sample-interval", "2h", "--compact-interval", "1h"]);
        assert!(cli.log_config().is_err());
    }

    #[test]
    fn test_bad_flags_fail_to_parse() {
        assert!(Cli::try_parse_from(["hygrolog-daemon", "--retention", "soon"]).is_err());
        assert!(Cli::try_parse_from(["hygrolog-daemon", "--sensor", "i2c"]).is_err());
    }
}
