//! Rig connection wrapper
//!
//! Owns the byte stream and implements the read/write contract the engine
//! relies on: blocking line reads, non-blocking drains, and best-effort
//! writes with the bus settling delay. A read or write on a closed
//! connection opens it implicitly; failure to open is reported, never
//! swallowed.

use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::serial::open_port;
use super::stream::{CommunicationChannel, SerialChannel};
use super::{ProtocolError, DEFAULT_BAUD_RATE, WRITE_SETTLE_MS};

/// Factory producing a fresh channel for the configured endpoint.
///
/// The default dialer opens a real serial port; tests inject a scripted
/// channel through [`Connection::with_dialer`].
pub type Dialer =
    Box<dyn Fn(&ConnectionConfig) -> Result<Box<dyn CommunicationChannel>, ProtocolError> + Send>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Stream released (or never opened)
    Closed,
    /// Stream open and usable
    Open,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Rig connection over an exchangeable byte stream
pub struct Connection {
    /// Channel handle; `None` while closed
    channel: Option<Box<dyn CommunicationChannel>>,
    /// Endpoint identity
    config: ConnectionConfig,
    /// How to (re)open the channel
    dialer: Dialer,
}

impl Connection {
    /// Create a connection to a physical serial port (not yet opened)
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            channel: None,
            config,
            dialer: Box::new(|cfg| {
                let port = open_port(&cfg.port_name, Some(cfg.baud_rate))?;
                Ok(Box::new(SerialChannel::new(port)) as Box<dyn CommunicationChannel>)
            }),
        }
    }

    /// Create a connection over an injected transport factory
    pub fn with_dialer(config: ConnectionConfig, dialer: Dialer) -> Self {
        Self {
            channel: None,
            config,
            dialer,
        }
    }

    /// Current open/closed state
    pub fn state(&self) -> ConnectionState {
        if self.channel.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Endpoint configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the underlying byte stream if not already open. Idempotent.
    pub fn open(&mut self) -> Result<(), ProtocolError> {
        if self.channel.is_none() {
            self.channel = Some((self.dialer)(&self.config)?);
            tracing::debug!(port = %self.config.port_name, "serial link opened");
        }
        Ok(())
    }

    /// Blocking line read: accumulate bytes one at a time until LF.
    ///
    /// Returns the line with the delimiter stripped. An empty string means
    /// the read timed out with nothing pending, not that an empty line
    /// arrived; a timeout mid-line returns the partial text accumulated so
    /// far. Transport faults are not swallowed here, they propagate so the
    /// engine's read loop can react.
    pub fn read_line(&mut self) -> Result<String, ProtocolError> {
        self.open()?;
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;

        let mut pending = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match channel.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    pending.push(byte[0]);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    break
                }
                Err(e) => return Err(ProtocolError::SerialError(e.to_string())),
            }
        }

        Ok(String::from_utf8(pending)?)
    }

    /// Non-blocking drain of whatever is currently buffered at the
    /// transport, decoded as text. Empty string if nothing is pending.
    pub fn read_available(&mut self) -> Result<String, ProtocolError> {
        self.open()?;
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;

        let available = channel
            .bytes_to_read()
            .map_err(|e| ProtocolError::SerialError(e.to_string()))? as usize;
        if available == 0 {
            return Ok(String::new());
        }

        let mut buf = vec![0u8; available];
        let mut got = 0;
        while got < buf.len() {
            match channel.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    break
                }
                Err(e) => return Err(ProtocolError::SerialError(e.to_string())),
            }
        }
        buf.truncate(got);

        Ok(String::from_utf8(buf)?)
    }

    /// Best-effort write of an already composed message.
    ///
    /// Returns `false` on a transport failure instead of raising, so the
    /// caller decides whether the failure is fatal (handshake) or
    /// ignorable (ad-hoc toggle). A successful transmit is followed by the
    /// bus settling delay before returning.
    pub fn write(&mut self, message: &str) -> bool {
        if let Err(e) = self.open() {
            tracing::warn!("write could not open link: {e}");
            return false;
        }
        let Some(channel) = self.channel.as_mut() else {
            return false;
        };

        match channel
            .write_all(message.as_bytes())
            .and_then(|()| channel.flush())
        {
            Ok(()) => {
                thread::sleep(Duration::from_millis(WRITE_SETTLE_MS));
                true
            }
            Err(e) => {
                tracing::warn!("write failed: {e}");
                false
            }
        }
    }

    /// Release the stream. Safe to call multiple times.
    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            tracing::debug!(port = %self.config.port_name, "serial link closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::MockScript;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    fn mock_connection() -> (Connection, MockScript) {
        let script = MockScript::new();
        let conn = Connection::with_dialer(ConnectionConfig::default(), script.dialer());
        (conn, script)
    }

    #[test]
    fn read_line_strips_delimiter() {
        let (mut conn, script) = mock_connection();
        script.push_bytes(b"Toggle PIN3 1\n");
        assert_eq!(conn.read_line().unwrap(), "Toggle PIN3 1");
    }

    #[test]
    fn read_line_empty_on_timeout_without_data() {
        let (mut conn, _script) = mock_connection();
        assert_eq!(conn.read_line().unwrap(), "");
    }

    #[test]
    fn read_line_returns_partial_text_on_timeout() {
        let (mut conn, script) = mock_connection();
        script.push_bytes(b"12.5, 13");
        assert_eq!(conn.read_line().unwrap(), "12.5, 13");
    }

    #[test]
    fn read_line_consumes_one_line_per_call() {
        let (mut conn, script) = mock_connection();
        script.push_bytes(b"first\nsecond\n");
        assert_eq!(conn.read_line().unwrap(), "first");
        assert_eq!(conn.read_line().unwrap(), "second");
        assert_eq!(conn.read_line().unwrap(), "");
    }

    #[test]
    fn read_line_propagates_transport_fault() {
        let (mut conn, script) = mock_connection();
        script.fail_reads();
        assert!(conn.read_line().is_err());
    }

    #[test]
    fn read_available_drains_everything_pending() {
        let (mut conn, script) = mock_connection();
        script.push_bytes(b"Toggle PIN1 0\n3.2, 4.1\n");
        assert_eq!(conn.read_available().unwrap(), "Toggle PIN1 0\n3.2, 4.1\n");
        assert_eq!(conn.read_available().unwrap(), "");
    }

    #[test]
    fn write_reports_failure_as_boolean() {
        let (mut conn, script) = mock_connection();
        assert!(conn.write("24\n"));
        script.fail_writes();
        assert!(!conn.write("24\n"));
        assert_eq!(script.written_string(), "24\n");
    }

    #[test]
    fn successful_writes_pause_for_the_settling_delay() {
        let (mut conn, _script) = mock_connection();
        let start = Instant::now();
        assert!(conn.write("1\n"));
        assert!(conn.write("2\n"));
        assert!(start.elapsed() >= Duration::from_millis(2 * WRITE_SETTLE_MS));
    }

    #[test]
    fn operations_open_implicitly_and_close_is_idempotent() {
        let (mut conn, script) = mock_connection();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(script.dial_count(), 0);

        assert!(conn.write("1\n"));
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(script.dial_count(), 1);

        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);

        // next operation reopens
        assert_eq!(conn.read_line().unwrap(), "");
        assert_eq!(script.dial_count(), 2);
    }

    #[test]
    fn failed_dial_surfaces_as_error() {
        let conn_err: Dialer =
            Box::new(|_| Err(ProtocolError::ConnectionFailed("no such port".into())));
        let mut conn = Connection::with_dialer(ConnectionConfig::default(), conn_err);
        assert!(conn.open().is_err());
        // boolean path reports the same failure as false
        assert!(!conn.write("1\n"));
    }
}
