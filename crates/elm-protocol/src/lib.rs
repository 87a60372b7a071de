//! ELM327 Protocol Implementation
//!
//! This crate provides async TCP (optionally TLS) communication with
//! ELM327-compatible OBD-II adapters: connection setup, the line-oriented
//! command/response cycle, and decoding of mode 01 PID answers.

mod client;
mod config;
mod error;
mod framer;
mod pid;
mod response;
mod transport;

pub use client::ElmClient;
pub use config::{
    ElmConfig, TlsOptions, TlsVersion, DEFAULT_HOST, DEFAULT_INIT_COMMANDS, DEFAULT_INIT_PACING,
    DEFAULT_PORT, DEFAULT_TIMEOUT,
};
pub use error::ElmError;
pub use framer::{ElmLineCodec, MAX_LINE_LENGTH};
pub use pid::{
    convert_pid_value, lookup, parse_obd_response, query_command, PidDescriptor, PID_TABLE,
};
pub use response::{is_terminator, RawResponse, ResponseStatus, TERMINATORS};
pub use transport::{build_tls_config, connect, DeviceStream};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Positive response echo for current data
    pub const CURRENT_DATA_RESPONSE: u8 = 0x41;
}
