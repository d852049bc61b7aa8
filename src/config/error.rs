//! Failures of the settings file and the stores built on it.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No path to keep `serialbowl.toml` at could be resolved.
    #[error("no location for the settings file ({0})")]
    NoLocation(PathBuf),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file: {0}")]
    Malformed(#[from] toml::de::Error),

    #[error("cannot encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    /// The file is left as it was; the in-memory value is rolled back.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored value that doesn't fit its key.
    #[error("bad value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("bad override {var}: {reason}")]
    BadOverride { var: String, reason: String },

    #[error("unknown setting {0}")]
    UnknownKey(String),
}

impl StoreError {
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn bad_override(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadOverride {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
