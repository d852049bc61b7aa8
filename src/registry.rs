//! Periodic device discovery.
//!
//! A persistent worker lists the host's serial devices on a fixed interval
//! and publishes the full, sorted snapshot on every tick, changed or not.

use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::dispatch::{Event, EventSender};
use crate::port::{IoError, Transport};
use crate::state::Shared;

/// Interval between two registry polls.
pub const REGISTRY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Device identifiers present at one poll: ascending, no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Snapshot(Vec<String>);

impl Snapshot {
    pub fn new<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ports: Vec<String> = ports.into_iter().map(Into::into).collect();
        ports.sort_unstable();
        ports.dedup();
        Self(ports)
    }

    pub fn contains(&self, port: &str) -> bool {
        self.0
            .binary_search_by(|probe| probe.as_str().cmp(port))
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// One enumeration, normalized.
pub fn poll_once(transport: &dyn Transport) -> Result<Snapshot, IoError> {
    transport.list_ports().map(Snapshot::new)
}

/// Handle to the running registry worker. Dropping it stops the worker.
#[derive(Debug)]
pub(crate) struct PortRegistry {
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl PortRegistry {
    pub fn spawn(
        transport: Arc<dyn Transport>,
        shared: Arc<Shared>,
        events: EventSender,
        interval: Duration,
    ) -> Self {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let worker = thread::Builder::new()
            .name("port-registry".into())
            .spawn(move || run(transport.as_ref(), &shared, &events, &token, interval))
            .map_err(|e| warn!(error = %e, "failed to start port registry"))
            .ok();

        Self { cancel, worker }
    }
}

impl Drop for PortRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(
    transport: &dyn Transport,
    shared: &Shared,
    events: &EventSender,
    cancel: &CancelToken,
    interval: Duration,
) {
    loop {
        match poll_once(transport) {
            Ok(snapshot) => {
                debug!(ports = snapshot.len(), "registry tick");
                shared.publish_snapshot(snapshot.clone());
                if !events.send(Event::Ports(snapshot)) {
                    break;
                }
            }
            Err(error) => warn!(%error, "listing serial ports failed"),
        }

        if cancel.wait_timeout(interval) {
            break;
        }
    }
    debug!("port registry stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventQueue;
    use crate::port::{ConnectionParameters, MockTransport};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_sorted_and_deduplicated() {
        let snapshot = Snapshot::new(["/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyUSB1", "COM3"]);
        assert_eq!(
            snapshot.as_slice(),
            &["/dev/ttyACM0", "/dev/ttyUSB1", "COM3"].map(String::from)
        );
        assert!(snapshot.contains("COM3"));
        assert!(!snapshot.contains("COM4"));
        assert_eq!(snapshot.first(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_publishes_every_tick_even_if_unchanged() {
        let transport = MockTransport::with_ports(&["devB", "devA"]);
        let shared = Arc::new(Shared::new(ConnectionParameters::default()));
        let (tx, queue) = EventQueue::new();

        let registry = PortRegistry::spawn(
            Arc::new(transport),
            shared.clone(),
            tx,
            Duration::from_millis(10),
        );

        let mut ticks = Vec::new();
        while ticks.len() < 3 {
            match queue.next_timeout(Duration::from_secs(2)) {
                Some(Event::Ports(snapshot)) => ticks.push(snapshot),
                Some(_) => {}
                None => panic!("registry stopped publishing"),
            }
        }
        drop(registry);

        let expected = Snapshot::new(["devA", "devB"]);
        assert!(ticks.iter().all(|s| *s == expected));
        assert_eq!(*shared.snapshot.read(), expected);
    }

    #[test]
    fn test_failed_listing_skips_tick() {
        let transport = MockTransport::with_ports(&["devA"]);
        transport.fail_listing(true);
        assert!(poll_once(&transport).is_err());

        transport.fail_listing(false);
        assert_eq!(poll_once(&transport).unwrap(), Snapshot::new(["devA"]));
    }
}
