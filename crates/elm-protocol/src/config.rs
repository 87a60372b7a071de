//! Adapter session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default adapter address for Wi-Fi ELM327 dongles
pub const DEFAULT_HOST: &str = "192.168.0.10";
/// Default adapter TCP port
pub const DEFAULT_PORT: u16 = 35000;
/// Default per-command and connect timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default delay between initialization commands
pub const DEFAULT_INIT_PACING: Duration = Duration::from_millis(100);

/// AT commands sent on initialization, in order
pub const DEFAULT_INIT_COMMANDS: [&str; 5] = [
    "ATZ",   // reset
    "ATE0",  // echo off
    "ATL0",  // linefeeds off
    "ATH1",  // headers on
    "ATSP0", // automatic protocol
];

/// Minimum TLS protocol version to negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlsVersion {
    #[default]
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

impl std::str::FromStr for TlsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.2" => Ok(TlsVersion::Tls12),
            "1.3" => Ok(TlsVersion::Tls13),
            other => Err(format!("unsupported TLS version {other:?} (expected 1.2 or 1.3)")),
        }
    }
}

/// TLS policy for encrypted adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Lowest protocol version accepted
    pub min_version: TlsVersion,
    /// Verify the server certificate against the webpki roots
    pub verify_certificates: bool,
    /// Name used for SNI and verification (defaults to the host)
    pub server_name: Option<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            verify_certificates: true,
            server_name: None,
        }
    }
}

impl TlsOptions {
    /// Options for self-signed adapters: TLS 1.2 minimum, no certificate checks
    pub fn insecure() -> Self {
        Self {
            verify_certificates: false,
            ..Default::default()
        }
    }
}

/// Session configuration, fixed for the lifetime of a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElmConfig {
    /// Adapter host name or IP address
    pub host: String,
    /// Adapter TCP port
    pub port: u16,
    /// Deadline for the dial and for each command
    pub timeout: Duration,
    /// Wrap the connection in TLS
    pub use_tls: bool,
    /// TLS policy, used when `use_tls` is set
    pub tls: TlsOptions,
    /// Initialization commands, in order
    pub init_commands: Vec<String>,
    /// Delay after each initialization command
    pub init_pacing: Duration,
}

impl Default for ElmConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            use_tls: false,
            tls: TlsOptions::default(),
            init_commands: DEFAULT_INIT_COMMANDS.iter().map(|c| c.to_string()).collect(),
            init_pacing: DEFAULT_INIT_PACING,
        }
    }
}

impl ElmConfig {
    /// Create a plain TCP config for the given adapter
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the connect and command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable TLS with the given policy
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.use_tls = true;
        self.tls = tls;
        self
    }

    /// `host:port` string used for dialing and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Name presented for SNI and certificate verification
    pub fn tls_server_name(&self) -> &str {
        self.tls.server_name.as_deref().unwrap_or(&self.host)
    }
}
