//! Shared test utilities for connection lifecycle tests.
//!
//! The [`Harness`] wires a [`Connection`] to a [`MockTransport`] with short
//! poll intervals and records every notification the connection emits.

#![allow(dead_code)]

use parking_lot::Mutex;
use serialbowl::{
    Connection, ConnectionParameters, LinkState, MockTransport, Notification, Timings,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll intervals short enough for tests, long enough to be observable.
pub const FAST: Timings = Timings {
    registry_poll: Duration::from_millis(20),
    reconnect_poll: Duration::from_millis(25),
};

/// Upper bound for any single wait in a test.
pub const PATIENCE: Duration = Duration::from_secs(5);

pub struct Harness {
    pub transport: MockTransport,
    pub conn: Connection,
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl Harness {
    /// A connection configured for `port`, with `present` devices attached.
    pub fn new(present: &[&str], port: &str) -> Self {
        let transport = MockTransport::with_ports(present);
        let params = ConnectionParameters {
            port: port.to_string(),
            ..Default::default()
        };
        let mut conn = Connection::with_timings(Arc::new(transport.clone()), params, FAST);
        conn.refresh_ports().expect("mock listing");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        conn.subscribe(move |n| sink.lock().push(n.clone()));

        Self {
            transport,
            conn,
            seen,
        }
    }

    /// Process events until `done` holds; panics after [`PATIENCE`].
    pub fn drive_until(&mut self, what: &str, mut done: impl FnMut(&Self) -> bool) {
        let deadline = Instant::now() + PATIENCE;
        while !done(self) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            self.conn.process(Duration::from_millis(5));
        }
    }

    /// Process events for a fixed amount of time.
    pub fn drive_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.conn.process(Duration::from_millis(5));
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    /// Every `StateChanged` so far, in order.
    pub fn states(&self) -> Vec<LinkState> {
        self.seen
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of every `DataReceived` payload.
    pub fn received(&self) -> Vec<u8> {
        self.seen
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::DataReceived(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Whether the latest published snapshot lists `port`.
    pub fn sees(&self, port: &str) -> bool {
        self.conn.snapshot().contains(port)
    }
}
