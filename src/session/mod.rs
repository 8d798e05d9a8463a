//! Session storage boundary.
//!
//! The kernel never owns session state. The host injects a [`SessionStore`]
//! per request and is responsible for any cross-request locking.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

/// Key/value session storage.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    /// Removes `key`, returning the previous value.
    fn remove(&self, key: &str) -> Option<Value>;

    fn clear(&self);
}

/// In-memory session, suitable for tests and single-process hosts.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::session::{MemorySession, SessionStore};
/// use serde_json::json;
///
/// let session = MemorySession::new();
/// session.set("user", json!({"id": 7}));
/// assert_eq!(session.get("user"), Some(json!({"id": 7})));
/// assert_eq!(session.remove("user"), Some(json!({"id": 7})));
/// assert!(session.get("user").is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemorySession {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    fn clear(&self) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
