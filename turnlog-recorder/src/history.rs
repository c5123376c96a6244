//! Completed turns and where they are kept.

use crate::error::{RecorderError, Result};
use crate::gem::GemInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// One captured conversation turn, as shown by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,

    /// ISO-8601 UTC, millisecond precision
    pub timestamp: String,

    pub title: String,

    pub url: String,

    /// Prompt with codeblocks masked
    pub prompt: String,

    #[serde(default)]
    pub attached_files: Vec<String>,

    pub account_name: String,

    pub account_email: String,

    pub model_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_plan: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gem: Option<GemInfo>,

    #[serde(default)]
    pub is_new_chat: bool,
}

pub trait HistoryStore: Send + Sync {
    /// Append one record after all existing ones.
    fn append(&self, record: HistoryRecord) -> Result<()>;

    /// Every record in insertion order.
    fn all(&self) -> Result<Vec<HistoryRecord>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, record: HistoryRecord) -> Result<()> {
        lock(&self.records).push(record);
        Ok(())
    }

    fn all(&self) -> Result<Vec<HistoryRecord>> {
        Ok(lock(&self.records).clone())
    }
}

/// History persisted as a JSON array, rewritten on every append.
pub struct JsonFileHistoryStore {
    path: PathBuf,
    records: Mutex<Vec<HistoryRecord>>,
}

impl JsonFileHistoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            load_history_file(&path)?
        } else {
            Vec::new()
        };
        info!("Opened history at {:?} ({} records)", path, records.len());
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileHistoryStore {
    fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut records = lock(&self.records);
        records.push(record);
        if let Err(e) = save_history_file(&self.path, &records) {
            records.pop();
            return Err(e);
        }
        Ok(())
    }

    fn all(&self) -> Result<Vec<HistoryRecord>> {
        Ok(lock(&self.records).clone())
    }
}

pub fn load_history_file<P: AsRef<Path>>(path: P) -> Result<Vec<HistoryRecord>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&json).map_err(|e| {
        RecorderError::StorageError(format!("Malformed history file {path:?}: {e}"))
    })
}

pub fn save_history_file<P: AsRef<Path>>(path: P, records: &[HistoryRecord]) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)
        .map_err(|e| RecorderError::SaveError(format!("Failed to write history {path:?}: {e}")))
}
