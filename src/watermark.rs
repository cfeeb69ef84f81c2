use sps_store::{
    KeyValueStore,
    PersistedState,
};
use tracing::{
    info,
    warn,
};

/// Blocks refreshes until the chain has been observed at or above the
/// persisted minimum height for `chain_id`.
pub struct HeightGate<S> {
    chain_id: String,
    state: PersistedState<S>,
    watermark: u64,
    unlocked: bool,
}

impl<S: KeyValueStore> HeightGate<S> {
    pub fn load(chain_id: impl Into<String>, state: PersistedState<S>) -> Self {
        let chain_id = chain_id.into();
        let watermark = match state.sync_height(&chain_id) {
            Ok(height) => height.unwrap_or(0),
            Err(err) => {
                warn!(?err, %chain_id, "failed to read sync height; starting from 0");
                0
            }
        };
        let unlocked = watermark == 0;
        if !unlocked {
            info!(%chain_id, watermark, "waiting for chain to reach persisted height");
        }
        Self {
            chain_id,
            state,
            watermark,
            unlocked,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Records an observed block height. Returns true when this observation
    /// unlocked a previously locked gate.
    pub fn observe(&mut self, height: u64) -> bool {
        let required = self.watermark;
        if height > required {
            self.watermark = height;
            if let Err(err) = self.state.set_sync_height(&self.chain_id, height) {
                warn!(?err, chain_id = %self.chain_id, "failed to persist sync height");
            }
        }
        if !self.unlocked && height >= required {
            self.unlocked = true;
            info!(chain_id = %self.chain_id, height, "chain caught up; sync unlocked");
            return true;
        }
        false
    }
}
