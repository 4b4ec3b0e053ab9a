#![warn(missing_docs)]
//! # deepscan-store
//!
//! ## Purpose
//! Provides the persistent client-side key-value store and the scan history
//! kept in it.
//!
//! ## Responsibilities
//! - Abstract string key-value storage behind [`KeyValueStore`].
//! - Persist the store as one JSON object on disk ([`JsonFileStore`]).
//! - Keep an append-only, newest-first scan history ([`HistoryStore`]).
//!
//! ## Data flow
//! Start-up reads the login flag from the store. A `save` action builds a
//! [`HistoryEntry`] and calls [`HistoryStore::append`], which reads the whole
//! history, prepends the entry, and writes the whole list back.
//!
//! ## Error model
//! IO and JSON failures are [`StoreError`] values. A guest `append` returns
//! [`StoreError::Refused`] without touching storage.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use deepscan_core::{HistoryEntry, SessionMode};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Key holding the login flag (`"true"` when authenticated).
pub const LOGIN_FLAG_KEY: &str = "ds_logged";

/// Key holding the JSON-encoded history array.
pub const HISTORY_KEY: &str = "ds_history";

/// String key-value storage that survives restarts.
pub trait KeyValueStore: Send + Sync {
    /// Reads one value.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes one value, replacing any previous value.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Volatile store used by tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `pairs`.
    pub fn with_values<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }

    fn values(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Poisoned("memory store"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store persisted as a single JSON object file.
///
/// Every operation reads the file fully; writes replace it through a sibling
/// temporary file so a crash never leaves a half-written store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens (lazily) the store at `path`. A missing file reads as empty.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            key: None,
            source,
        })
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let encoded = serde_json::to_string_pretty(values).map_err(|source| {
            StoreError::Corrupt {
                key: None,
                source,
            }
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let staging = self.staging_path();
        fs::write(&staging, encoded).map_err(|source| StoreError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &self.path).map_err(|source| {
            let _ = fs::remove_file(&staging);
            StoreError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Sibling path unique to one write, so concurrent writers never share it.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("store"));
        name.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Poisoned("file store"))?;

        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)?;
        debug!(key, path = %self.path.display(), "store value written");
        Ok(())
    }
}

/// Append-only scan history kept under [`HISTORY_KEY`].
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Wraps a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns all entries, newest first.
    ///
    /// # Errors
    /// Returns [`StoreError::Corrupt`] when the persisted list is not valid
    /// history JSON.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let Some(raw) = self.store.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            key: Some(HISTORY_KEY),
            source,
        })
    }

    /// Prepends one entry. Only a secure session may write.
    ///
    /// # Errors
    /// Returns [`StoreError::Refused`] for guest sessions (nothing is written)
    /// and propagates read/write failures otherwise.
    pub fn append(&self, mode: SessionMode, entry: HistoryEntry) -> Result<(), StoreError> {
        if !mode.is_secure() {
            warn!("history append refused for guest session");
            return Err(StoreError::Refused);
        }

        let mut entries = self.entries()?;
        entries.insert(0, entry);

        let encoded = serde_json::to_string(&entries).map_err(|source| StoreError::Corrupt {
            key: Some(HISTORY_KEY),
            source,
        })?;
        self.store.set(HISTORY_KEY, &encoded)?;
        info!(entries = entries.len(), "history entry saved");
        Ok(())
    }
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persisting is not allowed in the current session mode.
    #[error("Login required to save results")]
    Refused,
    /// Backing file could not be read or written.
    #[error("store io failure at '{path}': {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Stored JSON could not be decoded or encoded.
    #[error("store data is corrupt: {source}")]
    Corrupt {
        /// Key whose value failed, when known.
        key: Option<&'static str>,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A store lock was poisoned by a panicking writer.
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}
