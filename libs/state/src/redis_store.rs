use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::{Result, StateError, Storage, StoredState};

pub struct RedisStorage {
    namespace: String,
    ttl: Option<Duration>,
    connection: Mutex<redis::aio::ConnectionManager>,
}

impl RedisStorage {
    pub async fn connect(
        url: &str,
        namespace: impl Into<String>,
        ttl: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            namespace: namespace.into(),
            ttl,
            connection: Mutex::new(manager),
        })
    }

    fn state_key(&self, key: &str) -> String {
        format!("{}:state:{}", self.namespace, key)
    }
}

fn backend(err: impl Into<anyhow::Error>) -> StateError {
    StateError::Backend(err.into())
}

#[async_trait]
impl Storage for RedisStorage {
    async fn read(&self, key: &str) -> Result<Option<StoredState>> {
        let mut conn = self.connection.lock().await;
        let payload: Option<String> = conn.get(self.state_key(key)).await.map_err(backend)?;
        payload
            .map(|raw| serde_json::from_str(&raw).map_err(backend))
            .transpose()
    }

    async fn write(&self, record: StoredState) -> Result<()> {
        let payload = serde_json::to_string(&record).map_err(backend)?;
        let state_key = self.state_key(&record.key);
        let mut conn = self.connection.lock().await;
        match self.ttl {
            Some(ttl) => {
                let () = conn
                    .set_ex(state_key, payload, ttl.as_secs().max(1))
                    .await
                    .map_err(backend)?;
            }
            None => {
                let () = conn.set(state_key, payload).await.map_err(backend)?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let _: usize = conn.del(self.state_key(key)).await.map_err(backend)?;
        Ok(())
    }
}
