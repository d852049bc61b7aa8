use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::port::ConnectionParameters;
use crate::registry::Snapshot;

/// Externally observed state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Closed,
    Open,
    /// An established episode failed; distinct from a user close.
    Lost,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Lost => "lost",
        })
    }
}

/// Settable fields, named by their config-store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Parameter {
    Port,
    BaudRate,
    DataBits,
    StopBits,
    Parity,
    FlowControl,
    ReconnectAutomatically,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Self::Port,
        Self::BaudRate,
        Self::DataBits,
        Self::StopBits,
        Self::Parity,
        Self::FlowControl,
        Self::ReconnectAutomatically,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Port => "port",
            Self::BaudRate => "baud-rate",
            Self::DataBits => "data-bits",
            Self::StopBits => "stop-bits",
            Self::Parity => "parity",
            Self::FlowControl => "flow-control",
            Self::ReconnectAutomatically => "reconnect-automatically",
        }
    }

    /// Whether changing this field requires reopening an open link.
    pub fn affects_link(self) -> bool {
        !matches!(self, Self::ReconnectAutomatically)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.key() == s)
            .ok_or_else(|| format!("unknown setting key: {s}"))
    }
}

/// Open/lost bookkeeping shared between the consumer and the workers.
///
/// Invariant: `is_open` and `connection_lost` are never both true.
#[derive(Debug, Clone, Default)]
pub struct LinkFlags {
    pub is_open: bool,
    pub connection_lost: bool,
    pub force_close_requested: bool,
    /// Id of the current (or most recent) episode.
    pub episode: u64,
}

impl LinkFlags {
    pub fn state(&self) -> LinkState {
        if self.is_open {
            LinkState::Open
        } else if self.connection_lost {
            LinkState::Lost
        } else {
            LinkState::Closed
        }
    }
}

/// Point-in-time copy of the connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub parameters: ConnectionParameters,
    pub is_open: bool,
    pub connection_lost: bool,
    pub force_close_requested: bool,
}

impl ConnectionStatus {
    pub fn state(&self) -> LinkState {
        if self.is_open {
            LinkState::Open
        } else if self.connection_lost {
            LinkState::Lost
        } else {
            LinkState::Closed
        }
    }
}

/// State readable from worker threads.
///
/// Parameters are only written by the consumer; workers publish flag and
/// snapshot updates here before enqueueing the matching event.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub flags: Mutex<LinkFlags>,
    pub params: RwLock<ConnectionParameters>,
    pub snapshot: RwLock<Snapshot>,
    /// Number of snapshots published so far.
    snapshot_ticks: AtomicU64,
    reconnect_automatically: AtomicBool,
}

impl Shared {
    pub fn new(params: ConnectionParameters) -> Self {
        Self {
            params: RwLock::new(params),
            reconnect_automatically: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn reconnect_automatically(&self) -> bool {
        self.reconnect_automatically.load(Ordering::Acquire)
    }

    pub fn set_reconnect_automatically(&self, enabled: bool) {
        self.reconnect_automatically.store(enabled, Ordering::Release);
    }

    pub fn port(&self) -> String {
        self.params.read().port.clone()
    }

    pub fn publish_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.write() = snapshot;
        self.snapshot_ticks.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot_ticks(&self) -> u64 {
        self.snapshot_ticks.load(Ordering::Acquire)
    }
}
