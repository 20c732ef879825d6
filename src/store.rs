//! Per-role persistent storage.
//!
//! Every role keeps its own [`Store`]; the Verifier and all Authenticators additionally
//! share one for the global key registry. Values are opaque bytes; [`RecordStore`] layers
//! JSON-encoded records on top.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no value at {collection}/{key}")]
    Missing { collection: String, key: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("corrupt record at {collection}/{key}: {reason}")]
    Corrupt {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Minimal save/retrieve/update/delete interface over `(collection, key)`.
pub trait Store: Send + Sync {
    /// Insert or overwrite.
    fn save(&self, collection: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn retrieve(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrite an existing value; fails with [`StoreError::Missing`] if there is none.
    fn update(&self, collection: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Returns whether a value was removed.
    fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Insert only if `key` is absent; returns whether the value was written.
    ///
    /// The default is check-then-write. Backends that can should make it atomic per key.
    fn save_new(&self, collection: &str, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        if self.retrieve(collection, key)?.is_some() {
            return Ok(false);
        }
        self.save(collection, key, value)?;
        Ok(true)
    }

    fn contains(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.retrieve(collection, key)?.is_some())
    }
}

/// Typed JSON records on top of any [`Store`].
pub trait RecordStore {
    fn load<T: DeserializeOwned>(&self, collection: &str, key: &str)
        -> Result<Option<T>, StoreError>;

    fn put<T: Serialize>(&self, collection: &str, key: &str, record: &T)
        -> Result<(), StoreError>;

    fn insert_new<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        record: &T,
    ) -> Result<bool, StoreError>;
}

fn encode<T: Serialize>(collection: &str, key: &str, record: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(|e| StoreError::Corrupt {
        collection: collection.to_owned(),
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

impl<S: Store + ?Sized> RecordStore for S {
    fn load<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.retrieve(collection, key)?
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                    collection: collection.to_owned(),
                    key: key.to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn put<T: Serialize>(&self, collection: &str, key: &str, record: &T) -> Result<(), StoreError> {
        self.save(collection, key, &encode(collection, key, record)?)
    }

    fn insert_new<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        record: &T,
    ) -> Result<bool, StoreError> {
        self.save_new(collection, key, &encode(collection, key, record)?)
    }
}

type Collections = HashMap<String, HashMap<String, Vec<u8>>>;

/// In-memory [`Store`] for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held in `collection`.
    pub fn len(&self, collection: &str) -> Result<usize, StoreError> {
        let guard = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(collection).map_or(0, HashMap::len))
    }

    pub fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let guard = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut keys: Vec<String> = guard
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}

impl Store for MemoryStore {
    fn save(&self, collection: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        guard
            .entry(collection.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn retrieve(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(collection).and_then(|c| c.get(key)).cloned())
    }

    fn update(&self, collection: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        match guard.get_mut(collection).and_then(|c| c.get_mut(key)) {
            Some(slot) => {
                *slot = value.to_vec();
                Ok(())
            }
            None => Err(StoreError::Missing {
                collection: collection.to_owned(),
                key: key.to_owned(),
            }),
        }
    }

    fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        Ok(guard
            .get_mut(collection)
            .and_then(|c| c.remove(key))
            .is_some())
    }

    fn save_new(&self, collection: &str, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let slot = guard.entry(collection.to_owned()).or_default();
        if slot.contains_key(key) {
            return Ok(false);
        }
        slot.insert(key.to_owned(), value.to_vec());
        Ok(true)
    }
}
