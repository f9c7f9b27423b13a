//! Serial port handling
//!
//! Port discovery and opening for the bench link.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// Human-readable description, if the backend provides one
    pub description: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => usb.product,
            _ => None,
        };
        Self {
            name: info.port_name,
            description,
        }
    }
}

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List available serial ports in deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports.dedup_by(|a, b| a.name == b.name);
    ports
}

/// Open a serial port configured for the rig: 8N1, no flow control, and a
/// short read timeout so the blocking line read returns regularly.
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(DEFAULT_READ_TIMEOUT_MS))
        .open()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))
}
