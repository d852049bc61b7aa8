//! One open episode: the read pump and its writer.
//!
//! An episode owns the OS handle from a successful open until the next close
//! or loss. The reader forwards every chunk in order; either worker turns an
//! I/O failure into a Lost transition. Episodes never restart themselves.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::dispatch::{Event, EventSender};
use crate::port::{IoError, OpenError, SerialPortAdapter};
use crate::state::Shared;

/// Size of the read buffer handed to the OS.
const READ_CHUNK: usize = 4096;

/// How often an idle writer checks for cancellation.
const WRITER_POLL: Duration = Duration::from_millis(50);

/// What both workers of one episode share.
#[derive(Clone)]
struct EpisodeContext {
    id: u64,
    shared: Arc<Shared>,
    events: EventSender,
    cancel: CancelToken,
}

impl EpisodeContext {
    /// Publish the Lost transition, then enqueue the event.
    ///
    /// Does nothing if the episode was cancelled (a close is in progress) or
    /// is no longer the current one.
    fn report_loss(&self, error: IoError) {
        {
            let mut flags = self.shared.flags.lock();
            if self.cancel.is_cancelled() || flags.episode != self.id || !flags.is_open {
                return;
            }
            flags.is_open = false;
            flags.connection_lost = true;
        }
        self.cancel.cancel();
        warn!(episode = self.id, %error, "connection lost");
        self.events.send(Event::Lost {
            episode: self.id,
            error,
        });
    }
}

/// Running episode, owned by the consumer.
#[derive(Debug)]
pub(crate) struct Episode {
    id: u64,
    cancel: CancelToken,
    outbound: mpsc::Sender<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Episode {
    /// Start the workers. On failure the handle is released before returning.
    pub fn start(
        id: u64,
        port: Box<dyn SerialPortAdapter>,
        shared: Arc<Shared>,
        events: EventSender,
    ) -> Result<Self, OpenError> {
        let name = port.name().to_string();
        let busy = |reason: String| {
            warn!(port = %name, %reason, "could not start episode workers");
            OpenError::Busy(name.clone())
        };

        let writer_port = port.try_clone().map_err(|e| busy(e.to_string()))?;
        let cancel = CancelToken::new();
        let ctx = EpisodeContext {
            id,
            shared,
            events,
            cancel: cancel.clone(),
        };
        let (outbound, requests) = mpsc::channel();

        let reader = {
            let ctx = ctx.clone();
            thread::Builder::new()
                .name(format!("read-pump-{id}"))
                .spawn(move || read_pump(port, ctx))
                .map_err(|e| busy(e.to_string()))?
        };
        let writer = thread::Builder::new()
            .name(format!("writer-{id}"))
            .spawn(move || write_pump(writer_port, requests, ctx));
        let writer = match writer {
            Ok(writer) => writer,
            Err(e) => {
                cancel.cancel();
                let _ = reader.join();
                return Err(busy(e.to_string()));
            }
        };

        debug!(episode = id, port = %name, "episode started");
        Ok(Self {
            id,
            cancel,
            outbound,
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue bytes for the writer; never blocks.
    pub fn write(&self, bytes: Vec<u8>) -> Result<(), IoError> {
        if self.cancel.is_cancelled() {
            return Err(IoError::NotOpen);
        }
        self.outbound.send(bytes).map_err(|_| IoError::NotOpen)
    }

    /// Signal both workers without waiting for them.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Episode {
    /// Cancels and joins both workers, which releases the OS handle. Bounded
    /// by the read timeout of the handle.
    fn drop(&mut self) {
        self.cancel.cancel();
        for worker in [self.reader.take(), self.writer.take()].into_iter().flatten() {
            let _ = worker.join();
        }
        debug!(episode = self.id, "episode finished");
    }
}

fn read_pump(mut port: Box<dyn SerialPortAdapter>, ctx: EpisodeContext) {
    let mut buffer = vec![0u8; READ_CHUNK];
    let failure = loop {
        if ctx.cancel.is_cancelled() {
            break None;
        }
        match port.read_bytes(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => {
                let event = Event::Data {
                    episode: ctx.id,
                    bytes: buffer[..n].to_vec(),
                };
                if !ctx.events.send(event) {
                    break None;
                }
            }
            Err(error) => break Some(error),
        }
    };

    drop(port);
    if let Some(error) = failure {
        ctx.report_loss(error);
    }
}

fn write_pump(
    mut port: Box<dyn SerialPortAdapter>,
    requests: mpsc::Receiver<Vec<u8>>,
    ctx: EpisodeContext,
) {
    let failure = loop {
        if ctx.cancel.is_cancelled() {
            break None;
        }
        match requests.recv_timeout(WRITER_POLL) {
            Ok(bytes) => {
                if let Err(error) = port.write_bytes(&bytes) {
                    break Some(error);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break None,
        }
    };

    drop(port);
    if let Some(error) = failure {
        ctx.report_loss(error);
    }
}
