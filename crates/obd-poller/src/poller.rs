//! PID Poller Implementation

use chrono::{DateTime, Utc};
use elm_protocol::{lookup, ElmClient, ElmError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A PID to poll and the label it is reported under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTarget {
    /// Two-digit hex PID code
    pub pid: String,
    /// Label printed next to the value, empty to use the PID table name
    #[serde(default)]
    pub description: String,
}

impl PollTarget {
    pub fn new(pid: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            description: description.into(),
        }
    }

    /// Target labelled with its decode table name
    pub fn from_pid(pid: impl Into<String>) -> Self {
        Self::new(pid, "")
    }

    /// Description, else the decode table name, else the PID code
    pub fn label(&self) -> &str {
        if !self.description.is_empty() {
            return &self.description;
        }
        lookup(&self.pid).map_or(self.pid.as_str(), |d| d.name)
    }
}

/// Configuration for the poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// PIDs queried each round, in order
    pub targets: Vec<PollTarget>,
    /// Number of rounds, `None` to poll until stopped
    pub rounds: Option<u32>,
    /// Pause after each PID query
    pub pid_interval: Duration,
    /// Pause between rounds
    pub round_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            targets: Self::default_targets(),
            rounds: Some(10),
            pid_interval: Duration::from_millis(500),
            round_interval: Duration::from_secs(2),
        }
    }
}

impl PollerConfig {
    /// Speed, RPM, coolant temperature, fuel pressure and intake pressure
    pub fn default_targets() -> Vec<PollTarget> {
        vec![
            PollTarget::from_pid("0D"),
            PollTarget::from_pid("0C"),
            PollTarget::from_pid("05"),
            PollTarget::new("0A", "Fuel Pressure"),
            PollTarget::new("0B", "Intake Manifold Pressure"),
        ]
    }
}

/// Result of one PID query
#[derive(Debug, Clone, Serialize)]
pub struct PidReading {
    /// Round number, starting at 1
    pub round: u32,
    pub pid: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    /// Decoded value on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PidReading {
    fn new(round: u32, target: &PollTarget, result: Result<String, ElmError>) -> Self {
        let (value, error) = match result {
            Ok(value) => (Some(value), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Self {
            round,
            pid: target.pid.clone(),
            description: target.label().to_string(),
            timestamp: Utc::now(),
            value,
            error,
        }
    }

    /// Decoded value, or the error message
    pub fn outcome(&self) -> Result<&str, &str> {
        match (&self.value, &self.error) {
            (Some(value), _) => Ok(value.as_str()),
            (None, Some(error)) => Err(error.as_str()),
            (None, None) => Err("no value"),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.value.is_some()
    }
}

/// Polls a fixed list of PIDs over one adapter session
pub struct Poller {
    config: PollerConfig,
    rounds_completed: u32,
    failures: u64,
}

impl Poller {
    /// Create a new poller
    pub fn new(config: PollerConfig) -> Self {
        info!("PID poller created with {} PIDs", config.targets.len());

        Self {
            config,
            rounds_completed: 0,
            failures: 0,
        }
    }

    async fn poll_target(&mut self, client: &mut ElmClient, round: u32, index: usize) -> PidReading {
        let target = &self.config.targets[index];
        let result = client.read_obd_data(&target.pid).await;

        match &result {
            Ok(value) => debug!(pid = %target.pid, value = %value, "PID read"),
            Err(e) => {
                self.failures += 1;
                warn!(pid = %target.pid, error = %e, "PID query failed");
            }
        }

        PidReading::new(round, target, result)
    }

    /// Query every target once and return the readings
    pub async fn poll_round(&mut self, client: &mut ElmClient) -> Vec<PidReading> {
        let round = self.rounds_completed + 1;
        let mut readings = Vec::with_capacity(self.config.targets.len());

        for index in 0..self.config.targets.len() {
            readings.push(self.poll_target(client, round, index).await);
            tokio::time::sleep(self.config.pid_interval).await;
        }

        self.rounds_completed = round;
        readings
    }

    /// Run the polling loop, sending each reading as soon as it is taken.
    ///
    /// Stops after the configured number of rounds, or early when the
    /// receiver is dropped. Fails with [`ElmError::NotConnected`] once a
    /// transport error has closed the client.
    pub async fn run(
        &mut self,
        client: &mut ElmClient,
        reading_tx: mpsc::Sender<PidReading>,
    ) -> Result<(), ElmError> {
        if !client.is_connected() {
            return Err(ElmError::NotConnected);
        }

        info!(rounds = ?self.config.rounds, "Starting PID poller");

        loop {
            let round = self.rounds_completed + 1;
            debug!(round, "Polling round");

            for index in 0..self.config.targets.len() {
                let reading = self.poll_target(client, round, index).await;
                if reading_tx.send(reading).await.is_err() {
                    info!("Reading receiver dropped, stopping poller");
                    return Ok(());
                }
                if !client.is_connected() {
                    warn!(round, "Connection lost, stopping poller");
                    return Err(ElmError::NotConnected);
                }
                tokio::time::sleep(self.config.pid_interval).await;
            }

            self.rounds_completed = round;
            if self.config.rounds.is_some_and(|limit| round >= limit) {
                break;
            }
            tokio::time::sleep(self.config.round_interval).await;
        }

        info!(rounds = self.rounds_completed, failures = self.failures, "PID poller finished");
        Ok(())
    }

    /// Rounds fully completed so far
    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    /// Failed PID queries so far
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Get the number of polled PIDs
    pub fn pid_count(&self) -> usize {
        self.config.targets.len()
    }
}
