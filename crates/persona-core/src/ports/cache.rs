//! Cache port - key-value cache in front of the job store.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::PersonaError;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, PersonaError>;

    /// Stores `value`; `ttl = None` keeps it until evicted.
    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), PersonaError>;

    async fn ping(&self) -> Result<(), PersonaError>;
}
