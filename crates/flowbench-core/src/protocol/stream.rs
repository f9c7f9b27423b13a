//! Byte-stream abstraction over the physical link
//!
//! The connection talks to the rig through this trait so tests can swap
//! the serial backend for a scripted channel.

use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Byte-stream transport supporting the operations the connection needs
pub trait CommunicationChannel: Read + Write + Send {
    /// Number of bytes buffered at the transport, without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard anything buffered at the transport input
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Serial port wrapper implementing `CommunicationChannel`
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
