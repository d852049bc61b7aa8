//! Errors raised at the parameter boundary.
//!
//! Port failures live in [`crate::port::error`]; configuration file failures
//! in [`crate::config::StoreError`].

use crate::state::Parameter;
use thiserror::Error;

pub use crate::port::error::{IoError, OpenError};

/// A parameter setter rejected its argument. State is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("value {value:?} is out of range for {field}")]
    OutOfRange { field: Parameter, value: String },

    /// A setting delivered by key that names no parameter.
    #[error("unknown setting {0:?}")]
    UnknownSetting(String),
}

impl ConfigError {
    pub fn out_of_range(field: Parameter, value: impl ToString) -> Self {
        Self::OutOfRange {
            field,
            value: value.to_string(),
        }
    }
}
