//! Client-local key/value storage and the session token slot.
//!
//! # Design
//! - `KeyValueStore` is the seam for "local storage": memory for tests and
//!   embedding, a JSON file for the CLI.
//! - The token lives under one fixed key. `TokenStore` exposes reads publicly
//!   and keeps its writers crate-private so only login, refresh and logout can
//!   replace or clear it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::error::{ClientError, ClientResult};

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "temuin.auth.token";

/// Minimal string key/value store.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backing medium cannot be read.
    fn get(&self, key: &str) -> ClientResult<Option<String>>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backing medium cannot be written.
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Delete `key` if present.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backing medium cannot be written.
    fn remove(&self, key: &str) -> ClientResult<()>;
}

/// In-memory store; contents die with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Store persisted as a flat JSON object in a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    /// Store backed by `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> ClientResult<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| ClientError::Storage {
                detail: format!("{} is not a valid state file: {err}", self.path.display()),
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(ClientError::Storage {
                detail: format!("failed to read {}: {err}", self.path.display()),
            }),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| ClientError::Storage {
                detail: format!("failed to create {}: {err}", parent.display()),
            })?;
        }
        let text = serde_json::to_vec_pretty(entries).map_err(|err| ClientError::Storage {
            detail: format!("failed to encode state: {err}"),
        })?;
        fs::write(&self.path, text).map_err(|err| ClientError::Storage {
            detail: format!("failed to write {}: {err}", self.path.display()),
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// The persisted bearer token slot.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Token slot inside `backend`.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Current token, read lazily; unreadable or blank values count as absent.
    #[must_use]
    pub fn read(&self) -> Option<String> {
        match self.backend.get(TOKEN_KEY) {
            Ok(token) => token.filter(|value| !value.trim().is_empty()),
            Err(err) => {
                warn!(error = %err, detail = %err.user_message(), "failed to read session token");
                None
            }
        }
    }

    pub(crate) fn persist(&self, token: &str) -> ClientResult<()> {
        self.backend.set(TOKEN_KEY, token)
    }

    pub(crate) fn clear(&self) -> ClientResult<()> {
        self.backend.remove(TOKEN_KEY)
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenStore")
            .field("present", &self.read().is_some())
            .finish()
    }
}
