//! Transport abstraction: any byte-oriented serial channel.
//!
//! A [`TransportFactory`] opens a [`Transport`] for a port name and baud rate.
//! The transport is the write half and is owned by the runtime thread, so
//! writes for one connection are naturally issued one at a time. Its
//! [`ByteSource`] read half is moved onto a dedicated reader thread.
//!
//! Concrete implementations:
//! - [`SerialFactory`]: host serial ports via the `serialport` crate
//! - [`crate::bridge::memory::MemoryFactory`]: in-process loopback for tests and dry runs

use crate::bridge::error::{BridgeError, BridgeResult};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Default read timeout of the serial reader; bounds how long a cancelled
/// reader keeps running.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Readable half of a transport.
pub trait ByteSource: Send {
    /// Read the next chunk into `buf`.
    ///
    /// Returns `Ok(0)` when no data arrived within the transport's timeout.
    fn read_chunk(&mut self, buf: &mut [u8]) -> BridgeResult<usize>;
}

/// Writable half of a transport, plus lifecycle.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Write every byte of `bytes` before returning.
    fn write_all(&mut self, bytes: &[u8]) -> BridgeResult<()>;

    /// Split off the read half for the reader thread.
    fn reader(&mut self) -> BridgeResult<Box<dyn ByteSource>>;

    /// Release the underlying port.
    fn close(&mut self);
}

/// Opens transports by port name.
pub trait TransportFactory: Send {
    fn open(&self, port: &str, baud_rate: u32) -> BridgeResult<Box<dyn Transport>>;
}

// ==================== Serial ports ====================

/// Names of the serial ports currently present on this host.
pub fn list_ports() -> BridgeResult<Vec<String>> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| BridgeError::Unsupported(e.to_string()))
}

/// Opens host serial ports.
#[derive(Debug, Clone)]
pub struct SerialFactory {
    read_timeout: Duration,
}

impl Default for SerialFactory {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl SerialFactory {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl TransportFactory for SerialFactory {
    fn open(&self, port: &str, baud_rate: u32) -> BridgeResult<Box<dyn Transport>> {
        tracing::info!("Opening serial port {} at {} baud", port, baud_rate);
        let handle = serialport::new(port, baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| BridgeError::Open {
                port: port.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(SerialTransport {
            name: port.to_string(),
            port: Some(handle),
        }))
    }
}

/// An open host serial port.
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    fn port_mut(&mut self) -> BridgeResult<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| BridgeError::Write(format!("{} is closed", self.name)))
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> BridgeResult<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)
            .and_then(|_| port.flush())
            .map_err(|e| BridgeError::Write(e.to_string()))
    }

    fn reader(&mut self) -> BridgeResult<Box<dyn ByteSource>> {
        let port = self.port_mut()?;
        let clone = port
            .try_clone()
            .map_err(|e| BridgeError::Read(e.to_string()))?;
        Ok(Box::new(SerialReader { port: clone }))
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            tracing::info!("Closing serial port {}", self.name);
            let _ = port.clear(serialport::ClearBuffer::All);
        }
    }
}

struct SerialReader {
    port: Box<dyn serialport::SerialPort>,
}

impl ByteSource for SerialReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        match self.port.read(buf) {
            Ok(0) => Err(BridgeError::Read("port closed".to_string())),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(e) => Err(BridgeError::Read(e.to_string())),
        }
    }
}

/// A factory for environments with no serial capability at all.
///
/// Every `open` fails with [`BridgeError::Unsupported`].
#[derive(Debug, Clone, Default)]
pub struct UnsupportedFactory;

impl TransportFactory for UnsupportedFactory {
    fn open(&self, _port: &str, _baud_rate: u32) -> BridgeResult<Box<dyn Transport>> {
        Err(BridgeError::Unsupported(
            "this build has no serial transport".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_factory_always_fails() {
        let err = UnsupportedFactory.open("/dev/ttyACM0", 57_600).err();
        assert!(matches!(err, Some(BridgeError::Unsupported(_))));
    }

    #[test]
    fn test_serial_open_failure_is_reported() {
        let factory = SerialFactory::default();
        let err = factory
            .open("/definitely/not/a/serial/port", 57_600)
            .err();
        assert!(matches!(err, Some(BridgeError::Open { .. })));
    }
}
