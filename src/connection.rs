//! The connection lifecycle manager.
//!
//! [`Connection`] is the single consumer of the event queue. It owns the
//! parameters, the current episode and the reconnect supervisor, and is the
//! only place observable notifications are emitted from. Every public method
//! runs on the consumer's thread; worker threads only publish flags and
//! enqueue events.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut conn = Connection::new(Arc::new(SystemTransport), params);
//! conn.subscribe(|n| println!("{n:?}"));
//! conn.open()?;
//! while conn.process(Duration::from_millis(50)) == Flow::Continue {}
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ConfigValue;
use crate::dispatch::{AbandonReason, Event, EventQueue, EventSender, Notification, Observer};
use crate::episode::Episode;
use crate::error::{ConfigError, IoError, OpenError};
use crate::port::{ConnectionParameters, DataBits, FlowControl, Parity, StopBits, Transport};
use crate::registry::{poll_once, PortRegistry, Snapshot, REGISTRY_POLL_INTERVAL};
use crate::state::{ConnectionStatus, LinkState, Parameter, Shared};
use crate::supervisor::{ReconnectSupervisor, RECONNECT_POLL_INTERVAL};

/// Poll cadences of the background workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub registry_poll: Duration,
    pub reconnect_poll: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            registry_poll: REGISTRY_POLL_INTERVAL,
            reconnect_poll: RECONNECT_POLL_INTERVAL,
        }
    }
}

/// Whether the caller's processing loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct Connection {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    sender: EventSender,
    queue: EventQueue,
    observers: Vec<Observer>,
    timings: Timings,
    episode: Option<Episode>,
    supervisor: Option<ReconnectSupervisor>,
    supervisors_started: u64,
    /// Last state announced through `StateChanged`.
    reported: LinkState,
    registry: Option<PortRegistry>,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>, parameters: ConnectionParameters) -> Self {
        Self::with_timings(transport, parameters, Timings::default())
    }

    /// Starts the port registry right away.
    pub fn with_timings(
        transport: Arc<dyn Transport>,
        parameters: ConnectionParameters,
        timings: Timings,
    ) -> Self {
        let shared = Arc::new(Shared::new(parameters));
        let (sender, queue) = EventQueue::new();
        let registry = PortRegistry::spawn(
            transport.clone(),
            shared.clone(),
            sender.clone(),
            timings.registry_poll,
        );

        Self {
            transport,
            shared,
            sender,
            queue,
            observers: Vec::new(),
            timings,
            episode: None,
            supervisor: None,
            supervisors_started: 0,
            reported: LinkState::Closed,
            registry: Some(registry),
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&Notification) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// A producer handle for other threads (input readers, store callbacks).
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Handle at most one event, waiting up to `timeout` for it.
    pub fn process(&mut self, timeout: Duration) -> Flow {
        match self.queue.next_timeout(timeout) {
            Some(event) => self.handle(event),
            None => Flow::Continue,
        }
    }

    /// Handle everything already queued, without waiting.
    pub fn process_pending(&mut self) -> Flow {
        while let Some(event) = self.queue.try_next() {
            if self.handle(event) == Flow::Shutdown {
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    pub fn state(&self) -> LinkState {
        self.shared.flags.lock().state()
    }

    pub fn status(&self) -> ConnectionStatus {
        let flags = self.shared.flags.lock().clone();
        ConnectionStatus {
            parameters: self.parameters(),
            is_open: flags.is_open,
            connection_lost: flags.connection_lost,
            force_close_requested: flags.force_close_requested,
        }
    }

    pub fn parameters(&self) -> ConnectionParameters {
        self.shared.params.read().clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot.read().clone()
    }

    pub fn reconnect_automatically(&self) -> bool {
        self.shared.reconnect_automatically()
    }

    /// A supervisor is waiting for the device.
    pub fn is_reconnecting(&self) -> bool {
        self.supervisor.as_ref().is_some_and(ReconnectSupervisor::is_active)
    }

    /// Whether an open action makes sense right now.
    pub fn can_open(&self) -> bool {
        let any_present = !self.shared.snapshot.read().is_empty();
        any_present && self.state() != LinkState::Open && !self.is_reconnecting()
    }

    /// Current value of one parameter, as the store sees it.
    pub fn parameter(&self, field: Parameter) -> ConfigValue {
        let params = self.shared.params.read();
        match field {
            Parameter::Port => params.port.as_str().into(),
            Parameter::BaudRate => params.baud_rate.into(),
            Parameter::DataBits => params.data_bits.bits().into(),
            Parameter::StopBits => params.stop_bits.bits().into(),
            Parameter::Parity => params.parity.into(),
            Parameter::FlowControl => params.flow_control.into(),
            Parameter::ReconnectAutomatically => self.shared.reconnect_automatically().into(),
        }
    }

    /// Synchronous enumeration, used to seed the snapshot before the first
    /// registry tick.
    pub fn refresh_ports(&mut self) -> Result<Snapshot, IoError> {
        let snapshot = poll_once(self.transport.as_ref())?;
        self.shared.publish_snapshot(snapshot.clone());
        self.emit(Notification::PortsChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Open the configured port. Never retried on failure.
    pub fn open(&mut self) -> Result<(), OpenError> {
        let port = self.open_episode()?;
        self.report(format!("opened {port}"));
        Ok(())
    }

    /// Close the link. A user close also stops any reconnect attempt.
    pub fn close(&mut self, user_initiated: bool) {
        self.close_episode(user_initiated);
        self.sync_state();
    }

    /// Tear down the episode without announcing the resulting state.
    fn close_episode(&mut self, user_initiated: bool) {
        {
            let mut flags = self.shared.flags.lock();
            // Cancel under the lock so a racing loss report backs off.
            if let Some(episode) = &self.episode {
                episode.cancel();
            }
            flags.is_open = false;
            if user_initiated {
                flags.force_close_requested = true;
                flags.connection_lost = false;
            }
        }

        if user_initiated {
            self.stop_supervisor();
        }

        if let Some(episode) = self.episode.take() {
            let id = episode.id();
            drop(episode);
            info!(episode = id, user_initiated, "connection closed");
            if user_initiated {
                let port = self.shared.port();
                self.report(format!("closed {port}"));
            }
        }
    }

    /// Queue bytes for the device. Never blocks.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        if !self.shared.flags.lock().is_open {
            return Err(IoError::NotOpen);
        }
        match &self.episode {
            Some(episode) => episode.write(bytes.to_vec()),
            None => Err(IoError::NotOpen),
        }
    }

    pub fn set_port(&mut self, port: impl Into<String>) {
        let port = port.into();
        self.update(Parameter::Port, |p| p.port = port);
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ConfigError> {
        if baud_rate == 0 {
            return Err(ConfigError::out_of_range(Parameter::BaudRate, baud_rate));
        }
        self.update(Parameter::BaudRate, |p| p.baud_rate = baud_rate);
        Ok(())
    }

    pub fn set_data_bits(&mut self, bits: u8) -> Result<(), ConfigError> {
        let data_bits = DataBits::try_from(bits)?;
        self.update(Parameter::DataBits, |p| p.data_bits = data_bits);
        Ok(())
    }

    pub fn set_stop_bits(&mut self, bits: u8) -> Result<(), ConfigError> {
        let stop_bits = StopBits::try_from(bits)?;
        self.update(Parameter::StopBits, |p| p.stop_bits = stop_bits);
        Ok(())
    }

    pub fn set_parity(&mut self, parity: Parity) {
        self.update(Parameter::Parity, |p| p.parity = parity);
    }

    pub fn set_flow_control(&mut self, flow_control: FlowControl) {
        self.update(Parameter::FlowControl, |p| p.flow_control = flow_control);
    }

    /// Takes effect on the next loss. Switching it off also makes a waiting
    /// supervisor give up, leaving the state Lost.
    pub fn set_reconnect_automatically(&mut self, enabled: bool) {
        if self.shared.reconnect_automatically() == enabled {
            return;
        }
        self.shared.set_reconnect_automatically(enabled);
        debug!(enabled, "reconnect policy changed");
        self.emit(Notification::ParameterChanged {
            field: Parameter::ReconnectAutomatically,
            value: enabled.into(),
        });
    }

    /// Route a keyed value (as stored in a config store) to its setter.
    pub fn apply_setting(&mut self, key: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let field: Parameter = key
            .parse()
            .map_err(|_| ConfigError::UnknownSetting(key.to_string()))?;
        let mismatch = || ConfigError::out_of_range(field, &value);

        match field {
            Parameter::Port => self.set_port(value.as_str().ok_or_else(mismatch)?),
            Parameter::BaudRate => self.set_baud_rate(int_value(&value).ok_or_else(mismatch)?)?,
            Parameter::DataBits => self.set_data_bits(int_value(&value).ok_or_else(mismatch)?)?,
            Parameter::StopBits => self.set_stop_bits(int_value(&value).ok_or_else(mismatch)?)?,
            Parameter::Parity => self.set_parity(value.as_str().ok_or_else(mismatch)?.parse()?),
            Parameter::FlowControl => {
                self.set_flow_control(value.as_str().ok_or_else(mismatch)?.parse()?)
            }
            Parameter::ReconnectAutomatically => {
                self.set_reconnect_automatically(value.as_bool().ok_or_else(mismatch)?)
            }
        }
        Ok(())
    }

    fn update(&mut self, field: Parameter, apply: impl FnOnce(&mut ConnectionParameters)) {
        let changed = {
            let mut params = self.shared.params.write();
            let before = params.clone();
            apply(&mut *params);
            *params != before
        };
        if !changed {
            return;
        }

        let value = self.parameter(field);
        debug!(%field, %value, "parameter changed");
        self.emit(Notification::ParameterChanged {
            field,
            value: value.clone(),
        });
        if field == Parameter::Port {
            self.report(format!("switched port to {value}"));
        }

        if field.affects_link() && self.state() == LinkState::Open {
            self.reconfigure();
        }
    }

    /// Close and reopen with the current parameters. Observers only see a
    /// state change if the reopen fails.
    fn reconfigure(&mut self) {
        self.close_episode(false);
        match self.open_episode() {
            Ok(port) => info!(%port, "reopened with new parameters"),
            Err(error) => {
                warn!(%error, "reopen with new parameters failed");
                self.report(format!("could not reopen: {error}"));
            }
        }
        self.sync_state();
    }

    /// Acquire a handle and start an episode. Returns the port opened.
    fn open_episode(&mut self) -> Result<String, OpenError> {
        let params = self.parameters();
        if params.port.is_empty() {
            return Err(OpenError::InvalidParameters("no port selected".into()));
        }

        {
            let mut flags = self.shared.flags.lock();
            if flags.is_open {
                return Err(OpenError::AlreadyOpen);
            }
            flags.force_close_requested = false;
            flags.connection_lost = false;
        }
        self.stop_supervisor();
        // A lost episode may still hold its handle until its event is handled.
        self.episode = None;

        let handle = match self.transport.open(&params) {
            Ok(handle) => handle,
            Err(error) => {
                warn!(port = %params.port, %error, "open failed");
                self.sync_state();
                return Err(error);
            }
        };

        let id = {
            let mut flags = self.shared.flags.lock();
            flags.episode += 1;
            flags.is_open = true;
            flags.episode
        };
        match Episode::start(id, handle, self.shared.clone(), self.sender.clone()) {
            Ok(episode) => self.episode = Some(episode),
            Err(error) => {
                self.shared.flags.lock().is_open = false;
                self.sync_state();
                return Err(error);
            }
        }

        info!(port = %params.port, settings = %params, episode = id, "connection opened");
        self.sync_state();
        Ok(params.port)
    }

    fn stop_supervisor(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.cancel();
            debug!(supervisor = supervisor.id(), "reconnect supervisor stopped");
        }
    }

    fn arm_supervisor(&mut self) {
        let force_closed = self.shared.flags.lock().force_close_requested;
        if force_closed || !self.shared.reconnect_automatically() || self.is_reconnecting() {
            return;
        }

        self.supervisors_started += 1;
        let id = self.supervisors_started;
        match ReconnectSupervisor::spawn(
            id,
            self.shared.clone(),
            self.sender.clone(),
            self.timings.reconnect_poll,
        ) {
            Ok(supervisor) => {
                self.supervisor = Some(supervisor);
                let port = self.shared.port();
                self.report(format!("waiting for {port} to reappear"));
            }
            Err(error) => warn!(%error, "failed to start reconnect supervisor"),
        }
    }

    fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Data { bytes, .. } => self.emit(Notification::DataReceived(bytes)),
            Event::Lost { episode, error } => self.on_lost(episode, error),
            Event::Ports(snapshot) => self.emit(Notification::PortsChanged(snapshot)),
            Event::DeviceReappeared { supervisor, port } => self.on_reappeared(supervisor, port),
            Event::ReconnectAbandoned { supervisor, reason } => {
                if self.supervisor.as_ref().map(ReconnectSupervisor::id) == Some(supervisor) {
                    self.supervisor = None;
                    if reason == AbandonReason::PolicyDisabled {
                        info!("automatic reconnect switched off while waiting");
                    }
                }
                self.sync_state();
            }
            Event::Setting { key, value } => {
                if let Err(error) = self.apply_setting(&key, value) {
                    warn!(%key, %error, "ignoring setting");
                }
            }
            Event::Outbound(bytes) => {
                if let Err(error) = self.write(&bytes) {
                    debug!(%error, len = bytes.len(), "dropping input");
                }
            }
            Event::Notify(notification) => self.emit(notification),
            Event::Shutdown => return Flow::Shutdown,
        }
        Flow::Continue
    }

    fn on_lost(&mut self, episode: u64, error: IoError) {
        if self.episode.as_ref().map(Episode::id) != Some(episode) {
            debug!(episode, "ignoring loss of a finished episode");
            return;
        }
        self.episode = None;
        self.sync_state();

        let port = self.shared.port();
        self.report(format!("connection to {port} lost: {error}"));
        self.arm_supervisor();
    }

    fn on_reappeared(&mut self, supervisor: u64, port: String) {
        if self.supervisor.as_ref().map(ReconnectSupervisor::id) != Some(supervisor) {
            debug!(supervisor, "ignoring stale reopen request");
            return;
        }
        self.supervisor = None;
        let flags = self.shared.flags.lock().clone();
        if flags.force_close_requested || flags.is_open {
            return;
        }

        match self.open_episode() {
            Ok(port) => self.report(format!("reconnected to {port}")),
            Err(error) => {
                warn!(%port, %error, "reconnect failed");
                self.report(format!("reconnect to {port} failed: {error}"));
            }
        }
    }

    fn sync_state(&mut self) {
        let state = self.state();
        if state != self.reported {
            self.reported = state;
            self.emit(Notification::StateChanged(state));
        }
    }

    fn report(&mut self, text: String) {
        debug!(status = %text);
        self.emit(Notification::Status(text));
    }

    fn emit(&mut self, notification: Notification) {
        for observer in &mut self.observers {
            observer(&notification);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop_supervisor();
        self.episode = None;
        self.registry = None;
        debug!("connection torn down");
    }
}

fn int_value<T: TryFrom<i64>>(value: &ConfigValue) -> Option<T> {
    value.as_int().and_then(|i| T::try_from(i).ok())
}
