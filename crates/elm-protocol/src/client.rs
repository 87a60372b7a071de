//! ELM327 Client
//!
//! Command/response engine for ELM327 adapters over TCP. Each command is
//! written with a CR+LF terminator, then response lines are read until one
//! contains a terminator, the adapter closes the stream, or the command
//! timeout elapses.

use crate::config::ElmConfig;
use crate::error::ElmError;
use crate::framer::ElmLineCodec;
use crate::pid;
use crate::response::{is_terminator, RawResponse, ResponseStatus};
use crate::transport::{self, DeviceStream};
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

struct Connection {
    reader: FramedRead<ReadHalf<Box<dyn DeviceStream>>, ElmLineCodec>,
    writer: BufWriter<WriteHalf<Box<dyn DeviceStream>>>,
}

/// Client for one ELM327 adapter session
pub struct ElmClient {
    config: ElmConfig,
    /// Open connection, `None` before connect and after close
    conn: Option<Connection>,
}

impl ElmClient {
    /// Create a client; no I/O happens until [`connect`](Self::connect)
    pub fn new(config: ElmConfig) -> Self {
        Self { config, conn: None }
    }

    /// Create a client over an already open stream
    pub fn from_stream(config: ElmConfig, stream: Box<dyn DeviceStream>) -> Self {
        let mut client = Self::new(config);
        client.attach(stream);
        client
    }

    /// Dial the adapter. An existing connection is replaced.
    pub async fn connect(&mut self) -> Result<(), ElmError> {
        let stream = transport::connect(&self.config).await?;
        self.attach(stream);
        Ok(())
    }

    fn attach(&mut self, stream: Box<dyn DeviceStream>) {
        let (read_half, write_half) = tokio::io::split(stream);
        self.conn = Some(Connection {
            reader: FramedRead::new(read_half, ElmLineCodec::new()),
            writer: BufWriter::new(write_half),
        });
    }

    /// Send a command and collect its response.
    ///
    /// End of stream counts as the end of the response. A read error or
    /// timeout returns the lines received so far inside the error. After a
    /// write or read error the connection is dropped and later commands
    /// fail with [`ElmError::NotConnected`].
    pub async fn send_command(&mut self, command: &str) -> Result<RawResponse, ElmError> {
        let timeout = self.config.timeout;
        let conn = self.conn.as_mut().ok_or(ElmError::NotConnected)?;

        let result = exchange(conn, command, timeout).await;
        if matches!(result, Err(ElmError::Write(_) | ElmError::Read { .. })) {
            warn!(addr = %self.config.address(), "Dropping connection after transport error");
            self.conn = None;
        }
        result
    }

    /// Run the initialization script from the config.
    ///
    /// Stops at the first failing command; there is no partial retry.
    pub async fn initialize(&mut self) -> Result<(), ElmError> {
        info!(addr = %self.config.address(), "Initializing adapter");

        let commands = self.config.init_commands.clone();
        for command in &commands {
            let response = self
                .send_command(command)
                .await
                .map_err(|e| ElmError::Init {
                    command: command.clone(),
                    source: Box::new(e),
                })?;
            let text = response.text();
            info!(command = %command, response = %text.trim(), "AT response");
            tokio::time::sleep(self.config.init_pacing).await;
        }

        info!("Adapter initialized");
        Ok(())
    }

    /// Query a mode 01 PID and decode the answer
    pub async fn read_obd_data(&mut self, pid: &str) -> Result<String, ElmError> {
        if pid.chars().count() != 2 {
            return Err(ElmError::InvalidPid(pid.to_string()));
        }

        let response = self.send_command(&pid::query_command(pid)).await?;
        pid::parse_obd_response(&response.text(), pid)
    }

    /// Close the connection. Safe to call repeatedly or before connecting.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.writer.shutdown().await {
                debug!(error = %e, "Failed to shut down stream (continuing anyway)");
            }
            info!(addr = %self.config.address(), "Connection closed");
        }
    }

    /// Check whether a connection is open
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Session configuration
    pub fn config(&self) -> &ElmConfig {
        &self.config
    }
}

async fn exchange(
    conn: &mut Connection,
    command: &str,
    timeout: Duration,
) -> Result<RawResponse, ElmError> {
    metrics::counter!("elm_commands_total").increment(1);

    // Output left over from the previous command, usually its prompt
    let stale = conn.reader.read_buffer_mut();
    if !stale.is_empty() {
        debug!(bytes = stale.len(), "Discarding unread adapter output");
        stale.clear();
        conn.reader.decoder_mut().reset();
    }

    let line = format!("{command}\r\n");
    if let Err(e) = write_line(&mut conn.writer, &line).await {
        error!(command, error = %e, "Failed to send command");
        return Err(ElmError::Write(e));
    }
    debug!(command, "Command sent");

    let deadline = Instant::now() + timeout;
    let mut response = RawResponse::new();

    loop {
        match tokio::time::timeout_at(deadline, conn.reader.next()).await {
            Ok(Some(Ok(line))) => {
                // A late prompt from the previous command
                if response.is_empty() && line.trim() == ">" {
                    debug!(command, "Skipping stale prompt");
                    continue;
                }

                debug!(command, line = %line, "Response line");
                let done = is_terminator(&line);
                response.push_line(line);
                if done {
                    response.finish(ResponseStatus::Terminated);
                    return Ok(response);
                }
            }
            Ok(None) => {
                debug!(command, lines = response.lines().len(), "Adapter closed stream");
                response.finish(ResponseStatus::Closed);
                return Ok(response);
            }
            Ok(Some(Err(e))) => {
                error!(command, error = %e, "Failed to read response");
                response.finish(ResponseStatus::Failed);
                return Err(ElmError::Read {
                    source: e,
                    partial: response,
                });
            }
            Err(_) => {
                warn!(
                    command,
                    timeout_ms = timeout.as_millis(),
                    lines = response.lines().len(),
                    "Timeout waiting for response"
                );
                metrics::counter!("elm_command_timeouts_total").increment(1);
                response.finish(ResponseStatus::TimedOut);
                return Err(ElmError::Timeout {
                    timeout,
                    partial: response,
                });
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
