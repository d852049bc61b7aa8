//! Port-specific error types.
//!
//! Every OS-level failure is resolved into one of these kinds before it leaves
//! the port layer, so callers above it never see raw error codes.

use thiserror::Error;

/// Failures surfaced synchronously by an open attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    /// The device identifier does not name an existing device.
    #[error("serial device not found: {0}")]
    NotFound(String),

    /// The process is not allowed to open the device.
    #[error("permission denied opening {0}")]
    PermissionDenied(String),

    /// Another program holds the device.
    #[error("serial device is busy: {0}")]
    Busy(String),

    /// The parameters cannot be applied to this device (or no port is set).
    #[error("invalid connection parameters: {0}")]
    InvalidParameters(String),

    /// A connection is already open.
    #[error("connection is already open")]
    AlreadyOpen,
}

impl OpenError {
    /// Classify a `serialport` failure for the given device.
    pub fn from_serial(port_name: &str, err: &serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::NotFound(port_name.to_string()),
            serialport::ErrorKind::InvalidInput => Self::InvalidParameters(err.to_string()),
            serialport::ErrorKind::Io(kind) => Self::from_io_kind(port_name, kind, &err.to_string()),
            serialport::ErrorKind::Unknown => Self::from_message(port_name, &err.to_string()),
        }
    }

    fn from_io_kind(port_name: &str, kind: std::io::ErrorKind, message: &str) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => Self::NotFound(port_name.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(port_name.to_string()),
            std::io::ErrorKind::InvalidInput => Self::InvalidParameters(message.to_string()),
            _ => Self::from_message(port_name, message),
        }
    }

    // serialport drops the OS code for EBUSY, only the text survives.
    fn from_message(port_name: &str, message: &str) -> Self {
        if message.to_ascii_lowercase().contains("busy") {
            Self::Busy(port_name.to_string())
        } else {
            Self::NotFound(port_name.to_string())
        }
    }
}

/// Failures raised while an episode is reading or writing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// The device went away or the stream ended.
    #[error("device disconnected")]
    Disconnected,

    /// A write did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// The operation needs an open connection.
    #[error("connection is not open")]
    NotOpen,

    /// Anything else the OS reported.
    #[error("I/O failure: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
            ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotFound => Self::Disconnected,
            _ => match err.raw_os_error() {
                // EIO, ENXIO, ENODEV: what unplugging a USB adapter looks like on unix
                Some(5) | Some(6) | Some(19) => Self::Disconnected,
                _ => Self::Unknown(err.to_string()),
            },
        }
    }
}

impl From<serialport::Error> for IoError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::Disconnected,
            serialport::ErrorKind::Io(kind) => std::io::Error::new(kind, err.description).into(),
            _ => Self::Unknown(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpenError::NotFound("/dev/ttyUSB0".into());
        assert_eq!(err.to_string(), "serial device not found: /dev/ttyUSB0");

        let err = OpenError::AlreadyOpen;
        assert_eq!(err.to_string(), "connection is already open");

        assert_eq!(IoError::NotOpen.to_string(), "connection is not open");
    }

    #[test]
    fn test_serial_error_classification() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert_eq!(OpenError::from_serial("COM3", &err), OpenError::NotFound("COM3".into()));

        let err = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "Permission denied",
        );
        assert_eq!(
            OpenError::from_serial("/dev/ttyACM0", &err),
            OpenError::PermissionDenied("/dev/ttyACM0".into())
        );

        let err = serialport::Error::new(serialport::ErrorKind::Unknown, "Device or resource busy");
        assert_eq!(OpenError::from_serial("/dev/ttyS1", &err), OpenError::Busy("/dev/ttyS1".into()));

        let err = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud");
        assert!(matches!(
            OpenError::from_serial("/dev/ttyS1", &err),
            OpenError::InvalidParameters(_)
        ));
    }

    #[test]
    fn test_io_error_classification() {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(IoError::from(timeout), IoError::Timeout);

        let pipe = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        assert_eq!(IoError::from(pipe), IoError::Disconnected);

        let eio = std::io::Error::from_raw_os_error(5);
        assert_eq!(IoError::from(eio), IoError::Disconnected);

        let other = std::io::Error::new(std::io::ErrorKind::Other, "weird");
        assert!(matches!(IoError::from(other), IoError::Unknown(_)));
    }
}
