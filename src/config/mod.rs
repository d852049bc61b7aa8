//! Persisted settings.
//!
//! TOML-based settings with environment variable overrides, exposed to the
//! connection through the [`ConfigStore`] get/set/subscribe interface.
//!
//! # Resolution
//!
//! Settings are loaded from the following locations (in order of priority):
//!
//! 1. `SERIALBOWL_CONFIG` environment variable (explicit path)
//! 2. `./serialbowl.toml` (current directory)
//! 3. the platform config directory (`~/.config/serialbowl/serialbowl.toml`
//!    on Linux)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! - `SERIALBOWL_PORT`
//! - `SERIALBOWL_BAUD_RATE`
//! - `SERIALBOWL_LOG_LEVEL`
//!
//! # Example
//!
//! ```rust,ignore
//! use serialbowl::config::{ConfigStore, FileStore};
//!
//! let store = FileStore::open("serialbowl.toml")?;
//! store.set("baud-rate", 115200u32.into())?;
//! ```

mod error;
mod loader;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{ConfigValue, ConnectionSettings, LogFormat, LoggingConfig, Settings};
pub use store::{ConfigStore, FileStore, MemoryStore, Subscriber};
