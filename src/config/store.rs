//! Key/value view over the persisted settings.
//!
//! The connection core only ever talks to a [`ConfigStore`]. Keys are the
//! kebab-case names of [`Parameter`]. Subscribers fire only when a stored
//! value actually changes, and never while the store holds its own lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{StoreError, StoreResult};
use super::loader::{load_from_file, save_to_file, ConfigLoader};
use super::schema::{ConfigValue, Settings};
use crate::state::Parameter;

/// Change callback registered for one key.
pub type Subscriber = Box<dyn Fn(&ConfigValue) + Send + Sync>;

/// get/set/subscribe access to persisted settings.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<ConfigValue>;

    fn set(&self, key: &str, value: ConfigValue) -> StoreResult<()>;

    fn subscribe(&self, key: &str, callback: Subscriber);
}

#[derive(Default)]
struct Subscribers(Mutex<HashMap<String, Vec<Arc<Subscriber>>>>);

impl Subscribers {
    fn add(&self, key: &str, callback: Subscriber) {
        self.0
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    fn notify(&self, key: &str, value: &ConfigValue) {
        let callbacks: Vec<_> = self.0.lock().get(key).cloned().unwrap_or_default();
        for callback in callbacks {
            (**callback)(value);
        }
    }
}

/// Volatile store, used by tests and when persistence is not wanted.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, ConfigValue>>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: Into<String>,
    {
        Self {
            values: Mutex::new(values.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            subscribers: Subscribers::default(),
        }
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: ConfigValue) -> StoreResult<()> {
        let previous = self.values.lock().insert(key.to_string(), value.clone());
        if previous.as_ref() != Some(&value) {
            self.subscribers.notify(key, &value);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str, callback: Subscriber) {
        self.subscribers.add(key, callback);
    }
}

/// Settings persisted to a TOML file. Every change is written through.
pub struct FileStore {
    path: PathBuf,
    settings: Mutex<Settings>,
    subscribers: Subscribers,
}

impl FileStore {
    /// Open the store at `path`; a missing file starts from defaults.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let loader = ConfigLoader::load_from(path)?;
        Self::from_loader(loader)
    }

    /// Take over an already resolved loader. Without a resolved path the
    /// store writes to the platform default location.
    pub fn from_loader(loader: ConfigLoader) -> StoreResult<Self> {
        let path = loader
            .config_path
            .clone()
            .or_else(super::get_default_config_path)
            .ok_or_else(|| StoreError::NoLocation(PathBuf::from("serialbowl.toml")))?;

        debug!(path = %path.display(), "settings store opened");
        Ok(Self {
            path,
            settings: Mutex::new(loader.into_settings()),
            subscribers: Subscribers::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    /// Re-read the file and notify subscribers of every key whose value
    /// differs from what the store held.
    pub fn reload(&self) -> StoreResult<()> {
        let fresh = load_from_file(&self.path)?;
        let changed: Vec<(Parameter, ConfigValue)> = {
            let mut settings = self.settings.lock();
            let changed = Parameter::ALL
                .into_iter()
                .map(|p| (p, fresh.connection.get(p)))
                .filter(|(p, value)| settings.connection.get(*p) != *value)
                .collect();
            *settings = fresh;
            changed
        };

        if !changed.is_empty() {
            info!(count = changed.len(), "settings file changed on disk");
        }
        for (param, value) in changed {
            self.subscribers.notify(param.key(), &value);
        }
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        let param: Parameter = key.parse().ok()?;
        Some(self.settings.lock().connection.get(param))
    }

    fn set(&self, key: &str, value: ConfigValue) -> StoreResult<()> {
        let param: Parameter = key
            .parse()
            .map_err(|_| StoreError::UnknownKey(key.to_string()))?;

        {
            let mut settings = self.settings.lock();
            let previous = settings.connection.clone();
            if !settings.connection.set(param, &value)? {
                return Ok(());
            }
            if let Err(e) = save_to_file(&settings, &self.path) {
                settings.connection = previous;
                return Err(e);
            }
        }

        debug!(key, %value, "setting persisted");
        self.subscribers.notify(key, &value);
        Ok(())
    }

    fn subscribe(&self, key: &str, callback: Subscriber) {
        self.subscribers.add(key, callback);
    }
}
