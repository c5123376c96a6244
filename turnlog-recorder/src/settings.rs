//! Persisted key/value settings shared between execution contexts.
//!
//! Every write publishes a [`SettingsChange`] so caches elsewhere can be
//! invalidated. The file-backed store can also watch its file and publish
//! changes made by another process.

use crate::error::{RecorderError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANGE_BUFFER: usize = 64;

/// A key whose stored value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChange {
    pub key: String,
}

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Change notifications for writes made after this call.
    fn subscribe(&self) -> broadcast::Receiver<SettingsChange>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn notify_change(changes: &broadcast::Sender<SettingsChange>, key: &str) {
    debug!(key, "settings changed");
    let _ = changes.send(SettingsChange {
        key: key.to_string(),
    });
}

pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, String>>,
    changes: broadcast::Sender<SettingsChange>,
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            values: Mutex::new(BTreeMap::new()),
            changes,
        }
    }
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        notify_change(&self.changes, key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if lock(&self.values).remove(key).is_some() {
            notify_change(&self.changes, key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }
}

struct FileInner {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
    changes: broadcast::Sender<SettingsChange>,
}

/// Settings persisted as a flat JSON object of string values.
#[derive(Clone)]
pub struct JsonFileSettingsStore {
    inner: Arc<FileInner>,
}

impl JsonFileSettingsStore {
    /// Open the store, starting empty when the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = read_values(&path)?;
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self {
            inner: Arc::new(FileInner {
                path,
                values: Mutex::new(values),
                changes,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.inner.path, json).map_err(|e| {
            RecorderError::StorageError(format!(
                "Failed to write settings to {:?}: {e}",
                self.inner.path
            ))
        })
    }

    /// Re-read the file and publish a change for every key that differs
    /// from what this store last saw. Returns the changed keys.
    pub fn reload_from_disk(&self) -> Result<Vec<String>> {
        let fresh = read_values(&self.inner.path)?;
        let changed: Vec<String> = {
            let mut values = lock(&self.inner.values);
            let changed = values
                .keys()
                .chain(fresh.keys())
                .filter(|key| values.get(*key) != fresh.get(*key))
                .cloned()
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            *values = fresh;
            changed
        };
        for key in &changed {
            notify_change(&self.inner.changes, key);
        }
        Ok(changed)
    }

    /// Watch the backing file for edits made by other processes. The watch
    /// lasts as long as the returned watcher is alive.
    pub fn watch(&self) -> Result<notify::RecommendedWatcher> {
        use notify::{EventKind, RecursiveMode, Watcher};

        let store = self.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    if let Err(e) = store.reload_from_disk() {
                        warn!("Failed to reload settings after file change: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Settings watcher error: {}", e),
            })
            .map_err(|e| RecorderError::StorageError(format!("Failed to create watcher: {e}")))?;

        watcher
            .watch(&self.inner.path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                RecorderError::StorageError(format!(
                    "Failed to watch {:?}: {e}",
                    self.inner.path
                ))
            })?;
        Ok(watcher)
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(json) if json.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(json) => serde_json::from_str(&json).map_err(|e| {
            RecorderError::StorageError(format!("Malformed settings file {path:?}: {e}"))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.inner.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut values = lock(&self.inner.values);
            values.insert(key.to_string(), value.to_string());
            self.persist(&values)?;
        }
        notify_change(&self.inner.changes, key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let removed = {
            let mut values = lock(&self.inner.values);
            let removed = values.remove(key).is_some();
            if removed {
                self.persist(&values)?;
            }
            removed
        };
        if removed {
            notify_change(&self.inner.changes, key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.inner.changes.subscribe()
    }
}
