//! Hierarchical key/value context shared across a session.
//!
//! A session owns a [`RootStore`]; each request branches a [`LeafStore`]
//! off it. Reads fall through to the nearest ancestor holding the key,
//! writes and deletes only ever touch the local level, so a request can
//! shadow a session value without disturbing it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type StoredValue = Arc<dyn Any + Send + Sync>;

pub trait Store: Send + Sync {
    fn save(&self, key: &str, value: StoredValue);
    fn get(&self, key: &str) -> Option<StoredValue>;
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
    /// Removes the key from this level only. Returns whether a local
    /// entry was removed; an ancestor's value, if any, becomes visible
    /// again.
    fn delete(&self, key: &str) -> bool;
}

/// Typed read helper over the `Any`-erased store values.
pub fn get_as<T: Any + Send + Sync>(store: &dyn Store, key: &str) -> Option<Arc<T>> {
    store.get(key)?.downcast::<T>().ok()
}

/// Typed write helper.
pub fn save_value<T: Any + Send + Sync>(store: &dyn Store, key: &str, value: T) {
    store.save(key, Arc::new(value));
}

#[derive(Default)]
pub struct RootStore {
    values: Mutex<HashMap<String, StoredValue>>,
}

impl RootStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for RootStore {
    fn save(&self, key: &str, value: StoredValue) {
        self.values.lock().unwrap().insert(key.to_owned(), value);
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn delete(&self, key: &str) -> bool {
        self.values.lock().unwrap().remove(key).is_some()
    }
}

pub struct LeafStore {
    local: Mutex<HashMap<String, StoredValue>>,
    parent: Arc<dyn Store>,
}

impl LeafStore {
    pub fn new(parent: Arc<dyn Store>) -> Self {
        Self { local: Mutex::new(HashMap::new()), parent }
    }

    pub fn parent(&self) -> &Arc<dyn Store> {
        &self.parent
    }
}

impl Store for LeafStore {
    fn save(&self, key: &str, value: StoredValue) {
        self.local.lock().unwrap().insert(key.to_owned(), value);
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        if let Some(value) = self.local.lock().unwrap().get(key) {
            return Some(value.clone());
        }
        self.parent.get(key)
    }

    fn delete(&self, key: &str) -> bool {
        self.local.lock().unwrap().remove(key).is_some()
    }
}
