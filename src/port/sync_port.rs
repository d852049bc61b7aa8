//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own
//! `SerialPortAdapter` trait, and exposes `SystemTransport` for opening and
//! enumerating the host's devices.

use super::error::{IoError, OpenError};
use super::traits::{ConnectionParameters, SerialPortAdapter, Transport};
use std::io::{Read, Write};
use std::time::Duration;

/// How long a single read may block before reporting "no data".
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given parameters.
    ///
    /// # Example
    /// ```no_run
    /// use serialbowl::port::{ConnectionParameters, SyncSerialPort};
    ///
    /// let params = ConnectionParameters {
    ///     port: "/dev/ttyUSB0".into(),
    ///     ..Default::default()
    /// };
    /// let port = SyncSerialPort::open(&params)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(params: &ConnectionParameters) -> Result<Self, OpenError> {
        let parity: serialport::Parity = params.parity.try_into()?;
        let port = serialport::new(&params.port, params.baud_rate)
            .data_bits(params.data_bits.into())
            .flow_control(params.flow_control.into())
            .parity(parity)
            .stop_bits(params.stop_bits.into())
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| OpenError::from_serial(&params.port, &e))?;

        Ok(Self {
            port,
            name: params.port.clone(),
        })
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, IoError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, IoError> {
        match self.port.read(buffer) {
            // poll() said readable but nothing came: the device hung up
            Ok(0) => Err(IoError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::Interrupted => Ok(0),
                _ => Err(e.into()),
            },
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone(&self) -> Result<Box<dyn SerialPortAdapter>, IoError> {
        let port = self.port.try_clone()?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
        }))
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

/// The host's serial devices, via the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTransport;

impl Transport for SystemTransport {
    fn open(&self, params: &ConnectionParameters) -> Result<Box<dyn SerialPortAdapter>, OpenError> {
        Ok(Box::new(SyncSerialPort::open(params)?))
    }

    fn list_ports(&self) -> Result<Vec<String>, IoError> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}
