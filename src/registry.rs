use std::sync::Arc;

use coco_primitives::constants::COLLECTION_GLOBAL;
use tracing::debug;

use crate::{
    errors::CocoError,
    store::{Store, StoreError},
    types::VerificationKey,
};

/// The global key registry: a content-addressed, append/overwrite-only set of
/// verification keys shared by the Verifier and every Authenticator.
///
/// A key is trusted only once it is present here.
pub trait KeyRegistry: Send + Sync {
    fn publish(&self, key: &VerificationKey) -> Result<(), StoreError>;

    fn contains(&self, key: &VerificationKey) -> Result<bool, StoreError>;

    /// Fail with [`CocoError::UnknownVerificationKey`] on the first absent key.
    fn require_all(&self, keys: &[VerificationKey]) -> Result<(), CocoError> {
        if keys.is_empty() {
            return Err(CocoError::invalid("verificationKeys", "empty"));
        }
        for key in keys {
            if !self.contains(key)? {
                return Err(CocoError::UnknownVerificationKey(key.to_hex()));
            }
        }
        Ok(())
    }
}

/// [`KeyRegistry`] over the `global_storage` collection of a shared [`Store`].
/// Entries are keyed and valued by the hex of the key, so concurrent writers agree.
#[derive(Clone)]
pub struct StoreRegistry {
    store: Arc<dyn Store>,
}

impl StoreRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl KeyRegistry for StoreRegistry {
    fn publish(&self, key: &VerificationKey) -> Result<(), StoreError> {
        let hex = key.to_hex();
        debug!(key = %hex, "publishing verification key");
        self.store.save(COLLECTION_GLOBAL, &hex, hex.as_bytes())
    }

    fn contains(&self, key: &VerificationKey) -> Result<bool, StoreError> {
        self.store.contains(COLLECTION_GLOBAL, &key.to_hex())
    }
}
