use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Result, Storage, StoredState, now_unix_ms};

#[derive(Default)]
pub struct MemoryStorage {
    records: DashMap<String, StoredState>,
    ttl: Option<Duration>,
}

impl MemoryStorage {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_expired(&self, record: &StoredState, now_ms: i128) -> bool {
        match self.ttl {
            Some(ttl) => now_ms - record.updated_unix_ms >= ttl.as_millis() as i128,
            None => false,
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<StoredState>> {
        let now = now_unix_ms();
        let record = self.records.get(key).map(|entry| entry.value().clone());
        match record {
            Some(record) if self.is_expired(&record, now) => {
                self.records
                    .remove_if(key, |_, current| self.is_expired(current, now));
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn write(&self, record: StoredState) -> Result<()> {
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        if self.ttl.is_none() {
            return Ok(0);
        }
        let now = now_unix_ms();
        let before = self.records.len();
        self.records
            .retain(|_, record| !self.is_expired(record, now));
        Ok(before.saturating_sub(self.records.len()))
    }
}
