//! Protocol errors

use thiserror::Error;

/// Errors that can occur on the rig serial link
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to the rig")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Rig never acknowledged handshake after {attempts} attempts")]
    SetupTimeout { attempts: u32 },

    #[error("Received bytes were not valid text: {0}")]
    DecodeError(#[from] std::string::FromUtf8Error),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
