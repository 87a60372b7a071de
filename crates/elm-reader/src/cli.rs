//! Command-line arguments

use clap::Parser;
use elm_protocol::{TlsVersion, DEFAULT_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Read live OBD-II data from an ELM327 adapter over TCP
#[derive(Debug, Clone, Parser)]
#[command(name = "elm-reader", version, about)]
pub struct Args {
    /// Adapter host name or IP address, e.g. 192.168.0.10
    pub host: String,

    /// Adapter TCP port, e.g. 35000
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Connect and per-command timeout in seconds [default: 5]
    pub timeout_seconds: Option<String>,

    /// Wrap the connection in TLS
    #[arg(long)]
    pub tls: bool,

    /// Skip TLS certificate verification
    #[arg(long, requires = "tls")]
    pub insecure: bool,

    /// Minimum TLS version (1.2 or 1.3)
    #[arg(long, value_name = "VERSION", requires = "tls")]
    pub tls_min_version: Option<TlsVersion>,

    /// Polling rounds, 0 to poll until interrupted
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Settings file [default: elm-reader.toml, if present]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print one JSON object per reading
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Command timeout; an unparsable value falls back to the default
    pub fn timeout(&self) -> Duration {
        let Some(raw) = self.timeout_seconds.as_deref() else {
            return DEFAULT_TIMEOUT;
        };

        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    value = raw,
                    default_secs = DEFAULT_TIMEOUT.as_secs(),
                    "Invalid timeout, using default"
                );
                DEFAULT_TIMEOUT
            }
        }
    }
}
