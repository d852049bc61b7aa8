//! Core traits for serial port abstraction.
//!
//! Defines the `SerialPortAdapter` handle trait and the `Transport` factory
//! trait so that real serial ports and mock implementations can be used
//! interchangeably, plus the typed connection parameters they are opened with.

use super::error::{IoError, OpenError};
use crate::error::ConfigError;
use crate::state::Parameter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Everything an open attempt needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Device identifier, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,

    /// Baud rate (bits per second), always positive.
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Flow control mode.
    pub flow_control: FlowControl,
}

pub const DEFAULT_BAUD_RATE: u32 = 9600;

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl fmt::Display for ConnectionParameters {
    /// Renders the usual `115200 8N1` shorthand.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits.bits(),
            parity,
            self.stop_bits.bits()
        )
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(ConfigError::out_of_range(Parameter::DataBits, other)),
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    pub fn bits(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(ConfigError::out_of_range(Parameter::StopBits, other)),
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Odd => "odd",
            Self::Even => "even",
            Self::Mark => "mark",
            Self::Space => "space",
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "odd" => Ok(Self::Odd),
            "even" => Ok(Self::Even),
            "mark" => Ok(Self::Mark),
            "space" => Ok(Self::Space),
            _ => Err(ConfigError::out_of_range(Parameter::Parity, s)),
        }
    }
}

/// `serialport` has no mark/space parity, so those only work on transports
/// that implement them natively.
impl TryFrom<Parity> for serialport::Parity {
    type Error = OpenError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(OpenError::InvalidParameters(format!(
                "{parity} parity is not supported by the system serial driver"
            ))),
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl FlowControl {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Software => "software",
            Self::Hardware => "hardware",
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowControl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "software" | "xonxoff" => Ok(Self::Software),
            "hardware" | "rtscts" => Ok(Self::Hardware),
            _ => Err(ConfigError::out_of_range(Parameter::FlowControl, s)),
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// An open OS handle to a serial device.
///
/// Dropping the adapter closes the handle. Reads are expected to block for at
/// most a short timeout so that the reading worker can notice cancellation.
pub trait SerialPortAdapter: Send + fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, IoError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// `Ok(0)` means nothing arrived within the read timeout. End of stream is
    /// reported as `IoError::Disconnected`.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, IoError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// A second handle to the same device, used by the writer worker.
    fn try_clone(&self) -> Result<Box<dyn SerialPortAdapter>, IoError>;
}

/// Opens handles and enumerates devices.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Acquire a handle configured with `params`.
    fn open(&self, params: &ConnectionParameters) -> Result<Box<dyn SerialPortAdapter>, OpenError>;

    /// Names of the devices currently present, in no particular order.
    fn list_ports(&self) -> Result<Vec<String>, IoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let params = ConnectionParameters::default();
        assert_eq!(params.port, "");
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.data_bits, DataBits::Eight);
        assert_eq!(params.flow_control, FlowControl::None);
        assert_eq!(params.parity, Parity::None);
        assert_eq!(params.stop_bits, StopBits::One);
        assert_eq!(params.to_string(), "9600 8N1");
    }

    #[test]
    fn test_data_bits_range() {
        assert_eq!(DataBits::try_from(5u8).unwrap(), DataBits::Five);
        assert_eq!(DataBits::try_from(8u8).unwrap().bits(), 8);
        assert!(DataBits::try_from(4u8).is_err());
        assert!(DataBits::try_from(9u8).is_err());
    }

    #[test]
    fn test_stop_bits_range() {
        assert_eq!(StopBits::try_from(2u8).unwrap(), StopBits::Two);
        assert!(StopBits::try_from(0u8).is_err());
        assert!(StopBits::try_from(3u8).is_err());
    }

    #[test]
    fn test_parity_strings() {
        for parity in [Parity::None, Parity::Odd, Parity::Even, Parity::Mark, Parity::Space] {
            assert_eq!(parity.as_str().parse::<Parity>().unwrap(), parity);
        }
        assert_eq!("EVEN".parse::<Parity>().unwrap(), Parity::Even);
        assert!("sideways".parse::<Parity>().is_err());
    }

    #[test]
    fn test_parity_conversion() {
        let serialport_parity: serialport::Parity = Parity::Even.try_into().unwrap();
        assert_eq!(serialport_parity, serialport::Parity::Even);

        let mark: Result<serialport::Parity, _> = Parity::Mark.try_into();
        assert!(matches!(mark, Err(OpenError::InvalidParameters(_))));
    }

    #[test]
    fn test_flow_control_conversion() {
        let serialport_flow: serialport::FlowControl = FlowControl::Hardware.into();
        assert_eq!(serialport_flow, serialport::FlowControl::Hardware);
        assert_eq!("xonxoff".parse::<FlowControl>().unwrap(), FlowControl::Software);
    }

    #[test]
    fn test_stop_bits_conversion() {
        let serialport_stop_bits: serialport::StopBits = StopBits::Two.into();
        assert_eq!(serialport_stop_bits, serialport::StopBits::Two);
    }
}
