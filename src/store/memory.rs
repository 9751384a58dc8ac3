use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;

use super::{KeyValueStore, StoreFuture};

/// Process-local store. Used in tests and as the fallback when the SQLite
/// store can't be opened.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let map = self
                .entries
                .lock()
                .map_err(|_| anyhow!("memory store lock poisoned"))?;
            Ok(map.get(key).cloned())
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self
                .entries
                .lock()
                .map_err(|_| anyhow!("memory store lock poisoned"))?;
            map.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self
                .entries
                .lock()
                .map_err(|_| anyhow!("memory store lock poisoned"))?;
            map.remove(key);
            Ok(())
        })
    }
}
