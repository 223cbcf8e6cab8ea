//! InMemoryCache - development key-value cache with optional TTLs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::PersonaError;
use crate::ports::Cache;
use crate::ports::clock::{self, Clock};

struct Entry {
    value: serde_json::Value,
    expires_at: Option<DateTime<Utc>>,
}

pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, PersonaError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), PersonaError> {
        let expires_at = ttl.map(|ttl| clock::add(self.clock.now(), ttl));
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at.is_none_or(|at| at > self.clock.now()));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn ping(&self) -> Result<(), PersonaError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;

    #[tokio::test]
    async fn entries_expire_with_clock() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let cache = InMemoryCache::new(clock.clone());

        cache
            .put("k", serde_json::json!(1), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        cache.put("forever", serde_json::json!(2), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(serde_json::json!(1)));

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.get("forever").await.unwrap(), Some(serde_json::json!(2)));
    }
}
