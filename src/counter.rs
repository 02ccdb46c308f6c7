//! Named, durable, incrementable counters.
//!
//! Values are stored as base-10 ASCII text. Reads never fail: a missing value
//! reads as zero and that zero is written back, an unparsable value reads as
//! zero and is left alone until the next write replaces it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{KeyValueStore, StoreError};

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("counter {0:?} has no stored value")]
    Missing(String),
    #[error("counter {key:?} holds an invalid value: {value:?}")]
    Corrupt { key: String, value: String },
    #[error("failed to read counter")]
    Store(#[from] StoreError),
}

pub struct CounterStore<S> {
    store: S,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: KeyValueStore> CounterStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backing_store(&self) -> &S {
        &self.store
    }

    /// Reads the counter without applying any fallback.
    pub fn read(&self, key: &str) -> Result<u64, CounterError> {
        let raw = match self.store.read(key) {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => return Err(CounterError::Missing(key.to_owned())),
            Err(err) => return Err(err.into()),
        };

        let text = String::from_utf8_lossy(&raw);
        text.trim()
            .parse()
            .map_err(|_| CounterError::Corrupt {
                key: key.to_owned(),
                value: text.into_owned(),
            })
    }

    /// Current value of the counter, zero when it can't be read.
    ///
    /// A counter that is missing (or whose read fails) is initialized by
    /// writing zero back to the store.
    pub fn get(&self, key: &str) -> u64 {
        match self.read(key) {
            Ok(value) => value,
            Err(err @ CounterError::Corrupt { .. }) => {
                debug!(error = %err, "treating corrupt counter as zero");
                0
            }
            // An increment may land between the miss and the initialization
            Err(_) => self.with_key_locked(key, || self.get_or_initialize(key)),
        }
    }

    /// Adds one to the counter and returns the new value.
    ///
    /// Increments of the same key are serialized, so concurrent callers never
    /// lose an update.
    pub fn increment(&self, key: &str) -> u64 {
        self.with_key_locked(key, || {
            let value = self.get_or_initialize(key).saturating_add(1);
            self.persist(key, value);
            value
        })
    }

    /// Overwrites the counter. Failures are logged and otherwise ignored.
    pub fn write(&self, key: &str, value: u64) {
        self.with_key_locked(key, || self.persist(key, value))
    }

    pub fn try_write(&self, key: &str, value: u64) -> Result<(), StoreError> {
        self.with_key_locked(key, || self.store_value(key, value))
    }

    /// Must be called with the key lock held.
    fn get_or_initialize(&self, key: &str) -> u64 {
        match self.read(key) {
            Ok(value) => value,
            Err(err @ CounterError::Corrupt { .. }) => {
                debug!(error = %err, "treating corrupt counter as zero");
                0
            }
            Err(err) => {
                debug!(key, error = %err, "initializing counter");
                self.persist(key, 0);
                0
            }
        }
    }

    fn persist(&self, key: &str, value: u64) {
        if let Err(err) = self.store_value(key, value) {
            warn!(key, value, error = %err, "failed to persist counter");
        }
    }

    fn store_value(&self, key: &str, value: u64) -> Result<(), StoreError> {
        self.store.write(key, value.to_string().as_bytes())
    }

    fn with_key_locked<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let key_lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_owned()).or_default().clone()
        };
        let _guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
