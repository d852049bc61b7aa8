//! serialbowl core library
//!
//! Connection lifecycle management for a serial console: opening and
//! configuring the link, pumping bytes on background workers, detecting loss
//! and reconnecting when the device comes back, without ever blocking the
//! thread that owns the display.
//!
//! # Modules
//!
//! - `connection`: the consumer-owned [`Connection`] and its setters
//! - `port`: transport abstraction, real and mock serial ports
//! - `registry`: periodic device discovery
//! - `episode`: read and write workers of one open link
//! - `supervisor`: waits for a lost device to reappear
//! - `dispatch`: the single-consumer event queue and notifications
//! - `config`: TOML settings and the get/set/subscribe store interface
//! - `bridge`: two-way sync between a connection and a store
//! - `logging`: tracing subscriber setup

pub mod bridge;
mod cancel;
pub mod config;
pub mod connection;
pub mod dispatch;
mod episode;
pub mod error;
pub mod logging;
pub mod port;
pub mod registry;
pub mod state;
mod supervisor;

pub use bridge::ConfigBridge;
pub use config::{ConfigStore, ConfigValue, FileStore, MemoryStore, StoreError};
pub use connection::{Connection, Flow, Timings};
pub use dispatch::{EventSender, Notification, Observer};
pub use error::{ConfigError, IoError, OpenError};
pub use port::{
    ConnectionParameters, DataBits, FlowControl, MockSerialPort, MockTransport, Parity,
    SerialPortAdapter, StopBits, SystemTransport, Transport,
};
pub use registry::{Snapshot, REGISTRY_POLL_INTERVAL};
pub use state::{ConnectionStatus, LinkState, Parameter};
pub use supervisor::RECONNECT_POLL_INTERVAL;
