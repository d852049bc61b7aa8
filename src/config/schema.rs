//! Settings schema definitions.
//!
//! This module defines the structure of the settings file using serde. All
//! sections carry defaults so a partial (or missing) file is fine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{StoreError, StoreResult};
use crate::port::{FlowControl, Parity, DEFAULT_BAUD_RATE};
use crate::state::Parameter;

/// A single setting value as seen through the store interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for ConfigValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u8> for ConfigValue {
    fn from(value: u8) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Parity> for ConfigValue {
    fn from(value: Parity) -> Self {
        Self::Str(value.as_str().to_string())
    }
}

impl From<FlowControl> for ConfigValue {
    fn from(value: FlowControl) -> Self {
        Self::Str(value.as_str().to_string())
    }
}

/// Root settings structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Last used connection parameters and reconnect policy
    pub connection: ConnectionSettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Persisted connection parameters.
///
/// Values are stored as entered; range checks happen when they are applied
/// to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub reconnect_automatically: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
            reconnect_automatically: true,
        }
    }
}

impl ConnectionSettings {
    pub fn get(&self, key: Parameter) -> ConfigValue {
        match key {
            Parameter::Port => self.port.as_str().into(),
            Parameter::BaudRate => self.baud_rate.into(),
            Parameter::DataBits => self.data_bits.into(),
            Parameter::StopBits => self.stop_bits.into(),
            Parameter::Parity => self.parity.into(),
            Parameter::FlowControl => self.flow_control.into(),
            Parameter::ReconnectAutomatically => self.reconnect_automatically.into(),
        }
    }

    /// Store `value` under `key`. Returns whether anything changed.
    pub fn set(&mut self, key: Parameter, value: &ConfigValue) -> StoreResult<bool> {
        let mismatch = || StoreError::invalid_value(key.key(), format!("unexpected value {value:?}"));
        let before = self.get(key);

        match key {
            Parameter::Port => self.port = value.as_str().ok_or_else(mismatch)?.to_string(),
            Parameter::BaudRate => {
                self.baud_rate = int_value(value).ok_or_else(mismatch)?;
            }
            Parameter::DataBits => {
                self.data_bits = int_value(value).ok_or_else(mismatch)?;
            }
            Parameter::StopBits => {
                self.stop_bits = int_value(value).ok_or_else(mismatch)?;
            }
            Parameter::Parity => {
                let text = value.as_str().ok_or_else(mismatch)?;
                self.parity = text
                    .parse()
                    .map_err(|e: crate::error::ConfigError| StoreError::invalid_value(key.key(), e.to_string()))?;
            }
            Parameter::FlowControl => {
                let text = value.as_str().ok_or_else(mismatch)?;
                self.flow_control = text
                    .parse()
                    .map_err(|e: crate::error::ConfigError| StoreError::invalid_value(key.key(), e.to_string()))?;
            }
            Parameter::ReconnectAutomatically => {
                self.reconnect_automatically = value.as_bool().ok_or_else(mismatch)?;
            }
        }

        Ok(self.get(key) != before)
    }
}

fn int_value<T: TryFrom<i64>>(value: &ConfigValue) -> Option<T> {
    value.as_int().and_then(|i| T::try_from(i).ok())
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "pretty" or "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line format with colors
    Pretty,
    /// Single-line format
    #[default]
    Compact,
}
