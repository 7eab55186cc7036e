//! Flat JSON key/value store shared between watcher processes.
//!
//! Every instance keeps an in-memory copy of `settings.json`. Local writes
//! merge into the freshest on-disk copy and replace the file atomically;
//! [`SettingsStore::sync_from_disk`] picks up writes made by other processes
//! and reports them to subscribers as remote changes.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use thiserror::Error;
use watcher_logging::{watch_debug, watch_trace, watch_warn};

use crate::persist::{ensure_dir, write_atomic, PersistError};

pub const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings file {path:?} is not a JSON object")]
    NotAnObject { path: PathBuf },
    #[error("settings file {path:?} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub remote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&SettingChange) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    /// `None` listens to every key.
    key: Option<String>,
    callback: Callback,
}

struct StoreInner {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

impl SettingsStore {
    /// Open (or create) the store in `dir`. A corrupt file is logged and
    /// treated as empty; it is replaced on the next write.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        ensure_dir(dir)?;
        let path = dir.join(SETTINGS_FILENAME);
        let values = match read_settings(&path) {
            Ok(values) => values.unwrap_or_default(),
            Err(err @ (StoreError::Parse { .. } | StoreError::NotAnObject { .. })) => {
                watch_warn!("{err}; starting from empty settings");
                Map::new()
            }
            Err(err) => return Err(err),
        };
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                values: Mutex::new(values),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.inner.values).get(key).cloned()
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        lock(&self.inner.values).clone()
    }

    /// Write `key`, notifying local subscribers. Changes other processes made
    /// since the last sync are merged in first and reported as remote.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.write_key(key, Some(value))
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.write_key(key, None)
    }

    fn write_key(&self, key: &str, value: Option<Value>) -> Result<(), StoreError> {
        self.sync_from_disk()?;
        let change = {
            let mut values = lock(&self.inner.values);
            let mut updated = values.clone();
            let old = match &value {
                Some(value) => updated.insert(key.to_string(), value.clone()),
                None => updated.remove(key),
            };
            if old == value {
                return Ok(());
            }
            self.persist(&updated)?;
            *values = updated;
            SettingChange {
                key: key.to_string(),
                old,
                new: value,
                remote: false,
            }
        };
        watch_debug!("setting {key} changed locally");
        self.notify(&[change]);
        Ok(())
    }

    /// Fill in every absent key from `defaults`; returns the keys written.
    pub fn initialize_defaults<I>(&self, defaults: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.sync_from_disk()?;
        let mut values = lock(&self.inner.values);
        let mut updated = values.clone();
        let mut written = Vec::new();
        for (key, value) in defaults {
            if !updated.contains_key(&key) {
                updated.insert(key.clone(), value);
                written.push(key);
            }
        }
        if !written.is_empty() {
            self.persist(&updated)?;
            *values = updated;
            watch_debug!("initialized defaults for {}", written.join(", "));
        }
        Ok(written)
    }

    /// Re-read the file and report every key that differs from memory as a
    /// remote change. A missing file changes nothing.
    pub fn sync_from_disk(&self) -> Result<usize, StoreError> {
        let Some(on_disk) = read_settings(&self.inner.path)? else {
            return Ok(0);
        };
        let changes = {
            let mut values = lock(&self.inner.values);
            let keys: BTreeSet<&String> = values.keys().chain(on_disk.keys()).collect();
            let changes: Vec<SettingChange> = keys
                .into_iter()
                .filter(|key| values.get(*key) != on_disk.get(*key))
                .map(|key| SettingChange {
                    key: key.clone(),
                    old: values.get(key).cloned(),
                    new: on_disk.get(key).cloned(),
                    remote: true,
                })
                .collect();
            if !changes.is_empty() {
                *values = on_disk;
            }
            changes
        };
        for change in &changes {
            watch_trace!("setting {} changed remotely", change.key);
        }
        self.notify(&changes);
        Ok(changes.len())
    }

    /// Listen to changes of `key`.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&SettingChange) + Send + Sync + 'static,
    {
        self.add_subscriber(Some(key.to_string()), Arc::new(callback))
    }

    /// Listen to changes of every key.
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SettingChange) + Send + Sync + 'static,
    {
        self.add_subscriber(None, Arc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.inner.subscribers);
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    fn add_subscriber(&self, key: Option<String>, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.subscribers).push(Subscriber { id, key, callback });
        id
    }

    /// Callbacks run without any store lock held, so they may call back in.
    fn notify(&self, changes: &[SettingChange]) {
        if changes.is_empty() {
            return;
        }
        let listeners: Vec<(Option<String>, Callback)> = lock(&self.inner.subscribers)
            .iter()
            .map(|subscriber| (subscriber.key.clone(), Arc::clone(&subscriber.callback)))
            .collect();
        for change in changes {
            for (key, callback) in &listeners {
                if key.as_deref().is_none_or(|key| key == change.key) {
                    callback(change);
                }
            }
        }
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(values).map_err(|source| StoreError::Parse {
            path: self.inner.path.clone(),
            source,
        })?;
        write_atomic(&self.inner.path, &json)?;
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<Option<Map<String, Value>>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if text.trim().is_empty() {
        return Ok(Some(Map::new()));
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(StoreError::NotAnObject {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(StoreError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}
