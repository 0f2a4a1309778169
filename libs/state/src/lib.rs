mod conversation;
mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

use std::{collections::BTreeMap, env, sync::Arc, time::Duration};

use async_trait::async_trait;
use proactive_core::{Activity, ConversationReference};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
#[cfg(not(feature = "redis-store"))]
use tracing::warn;

pub use conversation::{ConversationState, REFERENCE_PROPERTY, TurnState};
pub use memory::MemoryStorage;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStorage;

/// Shared storage handle used across services.
pub type SharedStorage = Arc<dyn Storage>;

/// Identity of one conversation's state record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub channel_id: String,
    pub conversation_id: String,
}

impl StateKey {
    pub fn new(channel_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Key of the conversation an inbound activity belongs to, if it names one.
    pub fn from_activity(activity: &Activity) -> Option<Self> {
        let conversation_id = activity.conversation_id()?;
        let channel_id = activity.channel_id.as_deref().unwrap_or_default();
        Some(Self::new(channel_id, conversation_id))
    }

    pub fn from_reference(reference: &ConversationReference) -> Self {
        Self::new(&reference.channel_id, reference.conversation_id())
    }

    pub fn storage_key(&self) -> String {
        format!("{}/conversations/{}", self.channel_id, self.conversation_id)
    }
}

/// Persisted property bag of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub key: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    pub updated_unix_ms: i128,
}

impl StoredState {
    pub fn new(key: impl Into<String>, properties: BTreeMap<String, Value>) -> Self {
        Self {
            key: key.into(),
            properties,
            updated_unix_ms: now_unix_ms(),
        }
    }
}

pub(crate) fn now_unix_ms() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state backend error")]
    Backend(#[source] anyhow::Error),
    #[error("failed to decode state property '{name}'")]
    Codec {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<StoredState>>;
    /// Replaces the whole record in one write; the last writer wins.
    async fn write(&self, record: StoredState) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Drops records older than the configured retention. Backends that expire entries on
    /// their own report zero.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Storage selection and retention settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub redis_url: Option<String>,
    pub namespace: String,
    pub ttl: Option<Duration>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            namespace: "proactive".into(),
            ttl: None,
        }
    }
}

impl StorageSettings {
    /// Reads `STATE_REDIS_URL`, `STATE_NAMESPACE` and `STATE_TTL_SECS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let ttl = match lookup("STATE_TTL_SECS").filter(|v| !v.trim().is_empty()) {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|err| anyhow::anyhow!("invalid STATE_TTL_SECS '{raw}': {err}"))?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };
        Ok(Self {
            redis_url: lookup("STATE_REDIS_URL").filter(|v| !v.trim().is_empty()),
            namespace: lookup("STATE_NAMESPACE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "proactive".into()),
            ttl,
        })
    }
}

/// Returns an in-memory storage wrapped in an [`Arc`].
pub fn shared_memory_storage(ttl: Option<Duration>) -> SharedStorage {
    Arc::new(MemoryStorage::new(ttl))
}

/// Builds the storage backend selected by `STATE_REDIS_URL`, `STATE_NAMESPACE` and
/// `STATE_TTL_SECS`.
pub async fn storage_from_env() -> anyhow::Result<SharedStorage> {
    build_storage(&StorageSettings::from_env()?).await
}

/// Builds the storage backend described by `settings`.
///
/// A Redis URL selects the Redis backend when the `redis-store` feature is enabled; otherwise
/// the in-memory implementation is used.
pub async fn build_storage(settings: &StorageSettings) -> anyhow::Result<SharedStorage> {
    match settings.redis_url.as_deref() {
        Some(url) => build_redis_storage(url, settings).await,
        None => Ok(shared_memory_storage(settings.ttl)),
    }
}

#[cfg(feature = "redis-store")]
async fn build_redis_storage(url: &str, settings: &StorageSettings) -> anyhow::Result<SharedStorage> {
    let storage = RedisStorage::connect(url, settings.namespace.clone(), settings.ttl).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "redis-store"))]
async fn build_redis_storage(
    _url: &str,
    settings: &StorageSettings,
) -> anyhow::Result<SharedStorage> {
    warn!("redis-store feature disabled; using in-memory conversation state");
    Ok(shared_memory_storage(settings.ttl))
}
