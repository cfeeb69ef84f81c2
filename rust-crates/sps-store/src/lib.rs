pub mod in_memory;

pub mod sled_store;

pub use in_memory::InMemoryStore;
pub use sled_store::SledStore;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

const SEED_KEY: &str = "linera_mnemonic";
const PLAYER_NAME_KEY: &str = "sps_player_name";
const SYNC_HEIGHT_PREFIX: &str = "sync_height:";

/// Durable string key/value storage shared by every persisted client value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// write or overwrite the value stored under `key`
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Typed accessors over a [`KeyValueStore`] for the values the client keeps
/// between runs.
#[derive(Clone, Debug)]
pub struct PersistedState<S> {
    store: S,
}

impl<S: KeyValueStore> PersistedState<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn seed(&self) -> Result<Option<String>> {
        Ok(self.store.get(SEED_KEY)?.filter(|s| !s.trim().is_empty()))
    }

    pub fn set_seed(&mut self, seed: &str) -> Result<()> {
        self.store.set(SEED_KEY, seed)
    }

    pub fn player_name(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(PLAYER_NAME_KEY)?
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()))
    }

    pub fn set_player_name(&mut self, name: &str) -> Result<()> {
        self.store.set(PLAYER_NAME_KEY, name.trim())
    }

    /// Minimum block height recorded for `chain_id`, `None` when absent or
    /// not a base-10 integer.
    pub fn sync_height(&self, chain_id: &str) -> Result<Option<u64>> {
        let raw = self.store.get(&sync_height_key(chain_id))?;
        Ok(raw.and_then(|value| value.trim().parse::<u64>().ok()))
    }

    pub fn set_sync_height(&mut self, chain_id: &str, height: u64) -> Result<()> {
        self.store
            .set(&sync_height_key(chain_id), &height.to_string())
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

fn sync_height_key(chain_id: &str) -> String {
    format!("{SYNC_HEIGHT_PREFIX}{chain_id}")
}
