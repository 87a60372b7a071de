//! Layered reader settings
//!
//! Defaults, then an optional TOML file, then `ELM_READER__*` environment
//! variables. Command-line flags are applied on top by the caller.

use config::{Config, ConfigError, Environment, File, Map};
use elm_protocol::{TlsOptions, DEFAULT_INIT_COMMANDS, DEFAULT_INIT_PACING};
use obd_poller::{PollTarget, PollerConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Settings file looked up in the working directory when none is given
pub const DEFAULT_SETTINGS_FILE: &str = "elm-reader.toml";

/// Environment variable prefix, e.g. `ELM_READER__ROUNDS=3`
pub const ENV_PREFIX: &str = "ELM_READER";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// PIDs polled each round
    pub targets: Vec<PollTarget>,
    /// Polling rounds, 0 for unlimited
    pub rounds: u32,
    pub pid_interval_ms: u64,
    pub round_interval_ms: u64,
    pub init_pacing_ms: u64,
    pub init_commands: Vec<String>,
    pub tls: TlsOptions,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        let poller = PollerConfig::default();

        Self {
            targets: poller.targets,
            rounds: poller.rounds.unwrap_or(0),
            pid_interval_ms: poller.pid_interval.as_millis() as u64,
            round_interval_ms: poller.round_interval.as_millis() as u64,
            init_pacing_ms: DEFAULT_INIT_PACING.as_millis() as u64,
            init_commands: DEFAULT_INIT_COMMANDS.iter().map(|c| c.to_string()).collect(),
            tls: TlsOptions::default(),
        }
    }
}

impl ReaderSettings {
    /// Load settings from `path` (required) or the default file (optional),
    /// then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading environment overrides from `env`
    /// instead of the process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Path::new(DEFAULT_SETTINGS_FILE)).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }

    /// Poller configuration, with an optional round count from the command line
    pub fn poller_config(&self, rounds_override: Option<u32>) -> PollerConfig {
        let rounds = rounds_override.unwrap_or(self.rounds);

        PollerConfig {
            targets: self.targets.clone(),
            rounds: (rounds > 0).then_some(rounds),
            pid_interval: Duration::from_millis(self.pid_interval_ms),
            round_interval: Duration::from_millis(self.round_interval_ms),
        }
    }

    pub fn init_pacing(&self) -> Duration {
        Duration::from_millis(self.init_pacing_ms)
    }
}
