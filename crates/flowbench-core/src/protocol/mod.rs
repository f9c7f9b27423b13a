//! Serial rig communication
//!
//! Implements the test bench serial link: toggle commands out, telemetry
//! lines in, plus the connection plumbing shared by the engine's reader
//! and writer threads.

mod connection;
mod error;
pub mod serial;
pub mod stream;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{Connection, ConnectionConfig, ConnectionState, Dialer};
pub use error::ProtocolError;
pub use serial::{list_ports, open_port, PortInfo};
pub use stream::{CommunicationChannel, SerialChannel};

/// Default baud rate for the bench firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Read timeout for the blocking line read, in milliseconds.
/// Short so the background reader stays responsive to shutdown and
/// releases the bus lock frequently.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 50;

/// Minimum settling delay after a successful write, in milliseconds.
/// The rig's bus needs this pause between commands.
pub const WRITE_SETTLE_MS: u64 = 2;

/// Fixed token sent during bring-up until the rig acknowledges
pub const HANDSHAKE_TOKEN: &str = "12345";

/// Prefix of the acknowledgement the rig answers the handshake with
pub const ACK_PREFIX: &str = crate::telemetry::VALVE_MARKER;
