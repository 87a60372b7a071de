//! OBD-II PID Decoding
//!
//! Mode 01 answers arrive as text such as `41 0C 1F 88`: the positive
//! response echo, the PID code, then the data bytes in hex. Decoding is
//! driven by [`PID_TABLE`]; codes missing from the table are passed through
//! as raw hex.

use crate::error::ElmError;
use crate::mode::{CURRENT_DATA, CURRENT_DATA_RESPONSE};
use std::fmt;

/// Decoding rule for one mode 01 PID
#[derive(Clone, Copy)]
pub struct PidDescriptor {
    /// Two-digit hex code, upper case
    pub code: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Unit appended to the formatted value
    pub unit: &'static str,
    /// Data bytes the formula needs
    pub min_bytes: usize,
    /// Formula applied to the data bytes, formatted without the unit
    pub decode: fn(&[u8]) -> String,
}

impl fmt::Debug for PidDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidDescriptor")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("min_bytes", &self.min_bytes)
            .finish_non_exhaustive()
    }
}

impl PidDescriptor {
    /// Apply the formula and append the unit
    pub fn format(&self, bytes: &[u8]) -> String {
        format!("{} {}", (self.decode)(bytes), self.unit)
    }
}

/// Known mode 01 PIDs
pub static PID_TABLE: &[PidDescriptor] = &[
    PidDescriptor {
        code: "0D",
        name: "Vehicle Speed",
        unit: "km/h",
        min_bytes: 1,
        // A
        decode: |b| b[0].to_string(),
    },
    PidDescriptor {
        code: "0C",
        name: "Engine RPM",
        unit: "RPM",
        min_bytes: 2,
        // ((A*256)+B)/4
        decode: |b| format!("{:.0}", (b[0] as f64 * 256.0 + b[1] as f64) / 4.0),
    },
    PidDescriptor {
        code: "05",
        name: "Engine Coolant Temperature",
        unit: "°C",
        min_bytes: 1,
        // A - 40
        decode: |b| (b[0] as i16 - 40).to_string(),
    },
];

/// Find the descriptor for a PID code
pub fn lookup(pid: &str) -> Option<&'static PidDescriptor> {
    PID_TABLE.iter().find(|d| d.code == pid)
}

/// Build the mode 01 query for a PID
pub fn query_command(pid: &str) -> String {
    format!("{CURRENT_DATA:02X} {pid}")
}

/// Locate the answer for `pid` in a raw response and decode it.
///
/// A line starting with `41 <pid>` is decoded. When there is none, the first
/// line that merely mentions the PID and is at least 10 characters long is
/// returned verbatim, for adapters with headers or odd spacing.
pub fn parse_obd_response(response: &str, pid: &str) -> Result<String, ElmError> {
    let prefix = format!("{CURRENT_DATA_RESPONSE:02X} {pid}");

    for line in response.lines().map(str::trim) {
        if line.starts_with(&prefix) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() >= 3 {
                return convert_pid_value(pid, &tokens[2..]);
            }
        }
    }

    response
        .lines()
        .map(str::trim)
        .find(|line| line.contains(pid) && line.len() >= 10)
        .map(str::to_string)
        .ok_or_else(|| ElmError::PidNotFound(pid.to_string()))
}

/// Convert the hex data tokens of an answer into a display value
pub fn convert_pid_value(pid: &str, tokens: &[&str]) -> Result<String, ElmError> {
    let Some(descriptor) = lookup(pid) else {
        return Ok(tokens.join(" "));
    };

    if tokens.len() < descriptor.min_bytes {
        return Err(ElmError::BadDataFormat {
            pid: pid.to_string(),
            reason: format!(
                "need {} data bytes, got {}",
                descriptor.min_bytes,
                tokens.len()
            ),
        });
    }

    let bytes = tokens[..descriptor.min_bytes]
        .iter()
        .map(|t| {
            u8::from_str_radix(t, 16).map_err(|_| ElmError::BadDataFormat {
                pid: pid.to_string(),
                reason: format!("{t:?} is not a hex byte"),
            })
        })
        .collect::<Result<Vec<u8>, ElmError>>()?;

    Ok(descriptor.format(&bytes))
}
