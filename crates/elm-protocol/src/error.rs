//! ELM327 Error Types

use crate::response::RawResponse;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to an ELM327 adapter
#[derive(Debug, Error)]
pub enum ElmError {
    /// TCP dial failed
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Dial (including TLS handshake) did not finish before the deadline
    #[error("Connection to {addr} timed out after {}ms", .timeout.as_millis())]
    ConnectTimeout { addr: String, timeout: Duration },

    /// TLS configuration or handshake error
    #[error("TLS error: {0}")]
    Tls(String),

    /// No open connection to the adapter
    #[error("Not connected to adapter")]
    NotConnected,

    /// Writing a command to the adapter failed
    #[error("Failed to send command: {0}")]
    Write(#[source] std::io::Error),

    /// Reading the response failed. Lines read before the failure are kept.
    #[error("Failed to read response: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        partial: RawResponse,
    },

    /// No terminator seen within the command timeout. Lines read so far are kept.
    #[error("Timeout waiting for response after {}ms", .timeout.as_millis())]
    Timeout {
        timeout: Duration,
        partial: RawResponse,
    },

    /// Malformed PID code argument
    #[error("Invalid PID: {0:?}")]
    InvalidPid(String),

    /// No answer line for the PID in the response
    #[error("PID response not found: {0}")]
    PidNotFound(String),

    /// Known PID with missing or malformed data bytes
    #[error("Bad data format for PID {pid}: {reason}")]
    BadDataFormat { pid: String, reason: String },

    /// An initialization command failed
    #[error("AT command {command} failed: {source}")]
    Init {
        command: String,
        #[source]
        source: Box<ElmError>,
    },
}

impl ElmError {
    /// Lines received before a read error or timeout, if any were kept
    pub fn partial_response(&self) -> Option<&RawResponse> {
        match self {
            ElmError::Read { partial, .. } | ElmError::Timeout { partial, .. } => Some(partial),
            ElmError::Init { source, .. } => source.partial_response(),
            _ => None,
        }
    }

    /// Whether the connection should be considered unusable after this error
    pub fn is_fatal_to_connection(&self) -> bool {
        match self {
            ElmError::Connect { .. }
            | ElmError::ConnectTimeout { .. }
            | ElmError::Tls(_)
            | ElmError::NotConnected
            | ElmError::Write(_)
            | ElmError::Read { .. } => true,
            ElmError::Init { source, .. } => source.is_fatal_to_connection(),
            _ => false,
        }
    }
}

impl From<rustls::Error> for ElmError {
    fn from(err: rustls::Error) -> Self {
        ElmError::Tls(err.to_string())
    }
}
