// Sled-backed implementation of the client key/value store.
use crate::KeyValueStore;
use anyhow::Context;
use sled::{
    Config,
    Db,
    Tree,
};
use std::path::Path;

const CLIENT_TREE: &str = "client_state";

#[derive(Clone)]
pub struct SledStore {
    tree: Tree,
}

impl SledStore {
    pub fn new(db: &Db) -> crate::Result<Self> {
        let tree = db
            .open_tree(CLIENT_TREE)
            .context("open client_state tree")?;
        Ok(Self { tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let db = Config::default()
            .path(path)
            .open()
            .with_context(|| format!("open sled database at {}", path.display()))?;
        tracing::debug!("opened client store at {}", path.display());
        Self::new(&db)
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> crate::Result<Option<String>> {
        let Some(bytes) = self
            .tree
            .get(key.as_bytes())
            .with_context(|| format!("read {key}"))?
        else {
            return Ok(None);
        };
        let value = String::from_utf8(bytes.to_vec())
            .with_context(|| format!("value under {key} is not utf-8"))?;
        Ok(Some(value))
    }

    fn set(&mut self, key: &str, value: &str) -> crate::Result<()> {
        self.tree
            .insert(key.as_bytes(), value.as_bytes())
            .with_context(|| format!("write {key}"))?;
        self.tree.flush().with_context(|| format!("flush {key}"))?;
        Ok(())
    }
}
