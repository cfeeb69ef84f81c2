use crate::KeyValueStore;
use anyhow::anyhow;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

/// Process-local store; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn entries(&self) -> Arc<Mutex<HashMap<String, String>>> {
        self.entries.clone()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> crate::Result<Option<String>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> crate::Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
