//! Single-consumer event queue.
//!
//! Workers, config subscriptions and the consumer itself enqueue [`Event`]s
//! through an [`EventSender`]; only the owning [`crate::Connection`] drains
//! the queue, one event at a time, in arrival order. Observers see
//! [`Notification`]s, which are emitted only while an event is processed.

use std::sync::mpsc;
use std::time::Duration;

use crate::config::ConfigValue;
use crate::port::IoError;
use crate::registry::Snapshot;
use crate::state::{LinkState, Parameter};

/// What observers of the connection get to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Bytes read from the device, in order.
    DataReceived(Vec<u8>),
    StateChanged(LinkState),
    ParameterChanged { field: Parameter, value: ConfigValue },
    /// Latest registry poll, sent every tick.
    PortsChanged(Snapshot),
    /// Human-readable status line (opened, switched port, reconnecting...).
    Status(String),
}

/// Observer callback, invoked on the consumer thread.
pub type Observer = Box<dyn FnMut(&Notification) + Send>;

/// Why a supervisor stopped without reopening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbandonReason {
    ForceClose,
    PolicyDisabled,
}

#[derive(Debug)]
pub(crate) enum Event {
    Data { episode: u64, bytes: Vec<u8> },
    Lost { episode: u64, error: IoError },
    Ports(Snapshot),
    /// Supervisor `supervisor` saw its port come back.
    DeviceReappeared { supervisor: u64, port: String },
    ReconnectAbandoned { supervisor: u64, reason: AbandonReason },
    Setting { key: String, value: ConfigValue },
    Outbound(Vec<u8>),
    Notify(Notification),
    Shutdown,
}

/// Producer side of the queue. Cheap to clone; sending never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Returns `false` once the consumer is gone.
    pub(crate) fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Ask the consumer to write `bytes` to the device.
    pub fn send_input(&self, bytes: Vec<u8>) -> bool {
        self.send(Event::Outbound(bytes))
    }

    /// Deliver a setting from outside the consumer thread, e.g. a config
    /// store subscription. Applied through the regular setters.
    pub fn apply_setting(&self, key: impl Into<String>, value: ConfigValue) -> bool {
        self.send(Event::Setting {
            key: key.into(),
            value,
        })
    }

    /// Make the consumer's processing loop report shutdown.
    pub fn shutdown(&self) -> bool {
        self.send(Event::Shutdown)
    }
}

/// Consumer side of the queue.
#[derive(Debug)]
pub(crate) struct EventQueue {
    rx: mpsc::Receiver<Event>,
}

impl EventQueue {
    pub fn new() -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel();
        (EventSender { tx }, Self { rx })
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_next(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}
