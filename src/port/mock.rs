//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware, and a `MockTransport` that simulates devices
//! being attached, detached, and opened.

use super::error::{IoError, OpenError};
use super::traits::{ConnectionParameters, SerialPortAdapter, Transport};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// How long an empty mock read blocks before reporting "no data".
const MOCK_IDLE: Duration = Duration::from_millis(10);

/// One scripted outcome of a read call.
#[derive(Debug, Clone)]
pub enum MockRead {
    /// Bytes returned by a single read (split if the caller's buffer is smaller).
    Data(Vec<u8>),
    /// The read fails with this error.
    Fail(IoError),
}

/// Inner state of the mock port, protected by a mutex for interior mutability.
#[derive(Debug, Default)]
struct MockPortState {
    /// Scripted read results, consumed front to back.
    reads: VecDeque<MockRead>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Error returned by the next write, if any.
    write_failure: Option<IoError>,
}

#[derive(Debug, Default)]
struct MockPortShared {
    state: Mutex<MockPortState>,
    readable: Condvar,
}

/// Mock serial port implementation for testing.
///
/// Clones share the same scripted state, which is how a test keeps a handle
/// on a device while the connection reads from it.
///
/// # Example
/// ```
/// use serialbowl::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
///
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    shared: Arc<MockPortShared>,
    /// Present on handles handed out by `MockTransport::open`.
    handle: Option<Arc<()>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::default(),
            handle: None,
        }
    }

    /// Queue bytes to be returned by one read.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.push(MockRead::Data(data.to_vec()));
    }

    /// Queue a read failure.
    pub fn enqueue_failure(&self, error: IoError) {
        self.push(MockRead::Fail(error));
    }

    fn push(&self, read: MockRead) {
        self.shared.state.lock().reads.push_back(read);
        self.shared.readable.notify_all();
    }

    /// Make the next write fail.
    pub fn fail_next_write(&self, error: IoError) {
        self.shared.state.lock().write_failure = Some(error);
    }

    /// Get a copy of all data written to the port.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// Number of scripted reads not consumed yet.
    pub fn pending_reads(&self) -> usize {
        self.shared.state.lock().reads.len()
    }

    fn with_handle(&self, handle: Arc<()>) -> Self {
        Self {
            handle: Some(handle),
            ..self.clone()
        }
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, IoError> {
        let mut state = self.shared.state.lock();
        if let Some(error) = state.write_failure.take() {
            return Err(error);
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, IoError> {
        let mut state = self.shared.state.lock();
        if state.reads.is_empty() {
            self.shared.readable.wait_for(&mut state, MOCK_IDLE);
        }

        match state.reads.pop_front() {
            None => Ok(0),
            Some(MockRead::Fail(error)) => Err(error),
            Some(MockRead::Data(mut data)) => {
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    state.reads.push_front(MockRead::Data(rest));
                }
                Ok(n)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone(&self) -> Result<Box<dyn SerialPortAdapter>, IoError> {
        Ok(Box::new(self.clone()))
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("pending_reads", &self.pending_reads())
            .finish()
    }
}

#[derive(Debug, Default)]
struct MockTransportState {
    /// Devices listed by `list_ports`, in the order the "OS" reports them.
    present: Vec<String>,
    devices: HashMap<String, MockSerialPort>,
    open_failures: HashMap<String, VecDeque<OpenError>>,
    open_calls: Vec<ConnectionParameters>,
    handles: Vec<Weak<()>>,
    listing_fails: bool,
}

/// Simulated host: which devices exist, and what opening them does.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport with these devices attached.
    pub fn with_ports(ports: &[&str]) -> Self {
        let transport = Self::new();
        transport.set_present(ports);
        transport
    }

    /// Replace the list of attached devices, keeping the given order.
    pub fn set_present(&self, ports: &[&str]) {
        self.state.lock().present = ports.iter().map(|p| p.to_string()).collect();
    }

    pub fn attach(&self, port: &str) {
        let mut state = self.state.lock();
        if !state.present.iter().any(|p| p == port) {
            state.present.push(port.to_string());
        }
    }

    pub fn detach(&self, port: &str) {
        self.state.lock().present.retain(|p| p != port);
    }

    /// Detach the device and fail the next read on any open handle to it.
    pub fn unplug(&self, port: &str) {
        self.detach(port);
        self.device(port).enqueue_failure(IoError::Disconnected);
    }

    /// The scripting handle for a device; reads queued here reach the
    /// connection once it opens the device.
    pub fn device(&self, port: &str) -> MockSerialPort {
        self.state
            .lock()
            .devices
            .entry(port.to_string())
            .or_insert_with(|| MockSerialPort::new(port))
            .clone()
    }

    /// Make the next open of `port` fail with `error`.
    pub fn fail_next_open(&self, port: &str, error: OpenError) {
        self.state
            .lock()
            .open_failures
            .entry(port.to_string())
            .or_default()
            .push_back(error);
    }

    /// Make `list_ports` fail until switched back.
    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().listing_fails = fail;
    }

    /// Parameters of every open attempt, successful or not.
    pub fn open_calls(&self) -> Vec<ConnectionParameters> {
        self.state.lock().open_calls.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_calls.len()
    }

    /// Handles (including worker clones) that have not been dropped yet.
    pub fn live_handles(&self) -> usize {
        self.state
            .lock()
            .handles
            .iter()
            .filter(|h| h.strong_count() > 0)
            .count()
    }
}

impl Transport for MockTransport {
    fn open(&self, params: &ConnectionParameters) -> Result<Box<dyn SerialPortAdapter>, OpenError> {
        let mut state = self.state.lock();
        state.open_calls.push(params.clone());

        if let Some(error) = state
            .open_failures
            .get_mut(&params.port)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if !state.present.iter().any(|p| *p == params.port) {
            return Err(OpenError::NotFound(params.port.clone()));
        }

        let handle = Arc::new(());
        state.handles.push(Arc::downgrade(&handle));
        let port = state
            .devices
            .entry(params.port.clone())
            .or_insert_with(|| MockSerialPort::new(params.port.clone()))
            .with_handle(handle);
        Ok(Box::new(port))
    }

    fn list_ports(&self) -> Result<Vec<String>, IoError> {
        let state = self.state.lock();
        if state.listing_fails {
            return Err(IoError::Unknown("enumeration failed".into()));
        }
        Ok(state.present.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello");

        let mut buffer = [0u8; 10];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"Hello");
    }

    #[test]
    fn test_partial_read_keeps_remainder() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello, World!");

        let mut buffer = [0u8; 5];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"Hello");

        let mut rest = [0u8; 16];
        let n = port.read_bytes(&mut rest).unwrap();
        assert_eq!(&rest[..n], b", World!");
    }

    #[test]
    fn test_empty_read_times_out_with_zero() {
        let mut port = MockSerialPort::new("MOCK0");
        let mut buffer = [0u8; 10];
        assert_eq!(port.read_bytes(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_scripted_failure() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_failure(IoError::Disconnected);

        let mut buffer = [0u8; 10];
        assert_eq!(port.read_bytes(&mut buffer), Err(IoError::Disconnected));
    }

    #[test]
    fn test_write_logging_and_failure() {
        let mut port = MockSerialPort::new("MOCK0");
        port.write_bytes(b"Test1").unwrap();
        port.fail_next_write(IoError::Timeout);
        assert_eq!(port.write_bytes(b"Test2"), Err(IoError::Timeout));
        port.write_bytes(b"Test3").unwrap();

        assert_eq!(port.write_log(), vec![b"Test1".to_vec(), b"Test3".to_vec()]);
    }

    #[test]
    fn test_open_requires_presence() {
        let transport = MockTransport::new();
        let params = ConnectionParameters {
            port: "devA".into(),
            ..Default::default()
        };
        assert_eq!(
            transport.open(&params).unwrap_err(),
            OpenError::NotFound("devA".into())
        );

        transport.attach("devA");
        assert!(transport.open(&params).is_ok());
        assert_eq!(transport.open_count(), 2);
    }

    #[test]
    fn test_handles_tracked_until_dropped() {
        let transport = MockTransport::with_ports(&["devA"]);
        let params = ConnectionParameters {
            port: "devA".into(),
            ..Default::default()
        };

        let handle = transport.open(&params).unwrap();
        let writer = handle.try_clone().unwrap();
        assert_eq!(transport.live_handles(), 1);

        drop(handle);
        assert_eq!(transport.live_handles(), 1);
        drop(writer);
        assert_eq!(transport.live_handles(), 0);
    }

    #[test]
    fn test_scripted_open_failure_is_consumed() {
        let transport = MockTransport::with_ports(&["devA"]);
        transport.fail_next_open("devA", OpenError::Busy("devA".into()));
        let params = ConnectionParameters {
            port: "devA".into(),
            ..Default::default()
        };

        assert_eq!(transport.open(&params).unwrap_err(), OpenError::Busy("devA".into()));
        assert!(transport.open(&params).is_ok());
    }

    #[test]
    fn test_device_handle_shares_script() {
        let transport = MockTransport::with_ports(&["devA"]);
        transport.device("devA").enqueue_read(b"hi");
        let params = ConnectionParameters {
            port: "devA".into(),
            ..Default::default()
        };

        let mut handle = transport.open(&params).unwrap();
        let mut buffer = [0u8; 4];
        let n = handle.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"hi");
    }
}
