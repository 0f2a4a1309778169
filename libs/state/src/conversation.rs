use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;
use proactive_core::ConversationReference;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::{Result, SharedStorage, StateError, StateKey, StoredState};

/// Property under which the bot keeps the latest conversation reference.
pub const REFERENCE_PROPERTY: &str = "ConversationReference";

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Conversation-scoped property store.
///
/// [`ConversationState::load`] serializes turns of the same conversation: the returned
/// [`TurnState`] holds that conversation's lock until it is dropped, so a concurrent turn for
/// the same key observes every change saved before it.
#[derive(Clone)]
pub struct ConversationState {
    storage: SharedStorage,
    locks: Arc<LockMap>,
}

impl ConversationState {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn load(&self, key: &StateKey) -> Result<TurnState> {
        let storage_key = key.storage_key();
        let lock = self
            .locks
            .entry(storage_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        let properties = self
            .storage
            .read(&storage_key)
            .await?
            .map(|record| record.properties)
            .unwrap_or_default();
        Ok(TurnState {
            storage_key,
            properties,
            dirty: false,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        })
    }

    /// Persists every pending change of `state` as one record. A clean state is not written.
    pub async fn save_changes(&self, state: &mut TurnState) -> Result<()> {
        if !state.dirty {
            return Ok(());
        }
        let record = StoredState::new(state.storage_key.clone(), state.properties.clone());
        self.storage.write(record).await?;
        state.dirty = false;
        debug!(key = %state.storage_key, "conversation state saved");
        Ok(())
    }

    /// Latest stored reference for `key`. Reads without taking the conversation lock.
    pub async fn reference(&self, key: &StateKey) -> Result<Option<ConversationReference>> {
        let Some(record) = self.storage.read(&key.storage_key()).await? else {
            return Ok(None);
        };
        match record.properties.get(REFERENCE_PROPERTY) {
            Some(value) => decode(REFERENCE_PROPERTY, value).map(Some),
            None => Ok(None),
        }
    }
}

fn decode<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|source| StateError::Codec {
        name: name.to_string(),
        source,
    })
}

/// Working copy of one conversation's properties for the duration of a turn.
pub struct TurnState {
    storage_key: String,
    properties: BTreeMap<String, Value>,
    dirty: bool,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl TurnState {
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.properties
            .get(name)
            .map(|value| decode(name, value))
            .transpose()
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        Ok(self.get(name)?.unwrap_or_default())
    }

    pub fn set<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|source| StateError::Codec {
            name: name.to_string(),
            source,
        })?;
        if self.properties.get(name) != Some(&value) {
            self.properties.insert(name.to_string(), value);
            self.dirty = true;
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.properties.remove(name).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Drop for TurnState {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Nobody else holds or waits on the lock once the map owns the only handle.
        self.locks
            .remove_if(&self.storage_key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
