//! Port abstraction layer for serial communication.
//!
//! Provides the handle and transport traits, the `serialport`-backed
//! implementation, and mocks for driving the connection in tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::{IoError, OpenError};
pub use mock::{MockRead, MockSerialPort, MockTransport};
pub use sync_port::*;
pub use traits::*;
