//! Two-way sync between a [`Connection`] and a [`ConfigStore`].
//!
//! Store changes reach the connection as queued settings, applied through
//! the regular setters. Parameter changes on the connection are written back
//! to the store. A write-back never re-enters the connection as a setting,
//! so queued store changes can't chase each other.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::connection::Connection;
use crate::dispatch::Notification;
use crate::state::Parameter;

pub struct ConfigBridge;

impl ConfigBridge {
    /// Seed `conn` from `store`, then keep both in sync.
    ///
    /// If the stored port is not in the connection's current snapshot, the
    /// first present port is used instead (not written back). Call
    /// [`Connection::refresh_ports`] first for the fallback to see devices.
    pub fn attach(conn: &mut Connection, store: Arc<dyn ConfigStore>) {
        for field in Parameter::ALL {
            let Some(value) = store.get(field.key()) else {
                continue;
            };
            if let Err(error) = conn.apply_setting(field.key(), value) {
                warn!(key = field.key(), %error, "ignoring stored setting");
            }
        }

        let snapshot = conn.snapshot();
        let port = conn.parameters().port;
        if !snapshot.contains(&port) {
            if let Some(first) = snapshot.first() {
                info!(stored = %port, fallback = first, "stored port not present");
                conn.set_port(first);
            }
        }

        // Thread currently writing a connection change back; store
        // notifications it triggers are its own echo.
        let writer: Arc<Mutex<Option<ThreadId>>> = Arc::default();

        for field in Parameter::ALL {
            let sender = conn.sender();
            let writer = writer.clone();
            store.subscribe(
                field.key(),
                Box::new(move |value| {
                    if *writer.lock() == Some(thread::current().id()) {
                        return;
                    }
                    sender.apply_setting(field.key(), value.clone());
                }),
            );
        }

        conn.subscribe(move |notification| {
            if let Notification::ParameterChanged { field, value } = notification {
                debug!(%field, %value, "persisting parameter");
                *writer.lock() = Some(thread::current().id());
                let result = store.set(field.key(), value.clone());
                *writer.lock() = None;
                if let Err(error) = result {
                    warn!(%field, %error, "could not persist parameter");
                }
            }
        });
    }
}
