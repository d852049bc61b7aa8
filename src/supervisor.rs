//! Waits for a lost device to come back.
//!
//! Armed by the consumer when a Lost transition is applied and the policy
//! allows it. It watches the registry's latest snapshot for the currently
//! configured port and, when it shows up, asks the consumer to reopen. It
//! never opens anything itself.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::dispatch::{AbandonReason, Event, EventSender};
use crate::state::Shared;

/// Interval between two presence checks while waiting.
pub const RECONNECT_POLL_INTERVAL: Duration = Duration::from_millis(1250);

#[derive(Debug)]
pub(crate) struct ReconnectSupervisor {
    id: u64,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl ReconnectSupervisor {
    pub fn spawn(
        id: u64,
        shared: Arc<Shared>,
        events: EventSender,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let worker = thread::Builder::new()
            .name("reconnect-supervisor".into())
            .spawn(move || supervise(id, &shared, &events, &token, interval))?;

        Ok(Self {
            id,
            cancel,
            worker: Some(worker),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Still waiting for the device.
    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn supervise(
    id: u64,
    shared: &Shared,
    events: &EventSender,
    cancel: &CancelToken,
    interval: Duration,
) {
    info!(supervisor = id, "waiting for device to reappear");
    // The snapshot current at arm time may predate the loss.
    let armed_at = shared.snapshot_ticks();
    loop {
        let force_closed = shared.flags.lock().force_close_requested;
        if force_closed || cancel.is_cancelled() {
            shared.flags.lock().connection_lost = false;
            debug!("reconnect cancelled");
            events.send(Event::ReconnectAbandoned {
                supervisor: id,
                reason: AbandonReason::ForceClose,
            });
            return;
        }

        if !shared.reconnect_automatically() {
            debug!("reconnect policy switched off");
            events.send(Event::ReconnectAbandoned {
                supervisor: id,
                reason: AbandonReason::PolicyDisabled,
            });
            return;
        }

        // Read at check time so a port changed while lost is honored.
        let port = shared.port();
        let fresh = shared.snapshot_ticks() > armed_at;
        if fresh && !port.is_empty() && shared.snapshot.read().contains(&port) {
            info!(%port, "device reappeared");
            events.send(Event::DeviceReappeared {
                supervisor: id,
                port,
            });
            return;
        }

        cancel.wait_timeout(interval);
    }
}
