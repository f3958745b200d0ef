use super::{Snapshot, SnapshotStore};
use crate::{BotError, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

/// Snapshot stored as a JSON string under `solspot:{symbol}:state`
pub struct RedisStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `symbol` - Traded pair, used to namespace the key
    pub async fn new(redis_url: &str, symbol: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| BotError::Persistence("Redis connection timeout after 5 seconds".into()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            key: Self::key_for(symbol),
        })
    }

    fn key_for(symbol: &str) -> String {
        format!("solspot:{}:state", symbol)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the stored snapshot
    pub async fn clear(&mut self) -> Result<()> {
        self.conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }
}

impl SnapshotStore for RedisStore {
    async fn load(&mut self) -> Result<Snapshot> {
        let raw: Option<String> = self.conn.get(&self.key).await?;

        match raw {
            Some(json) => {
                let snapshot: Snapshot = serde_json::from_str(&json)?;
                tracing::info!("Loaded state from Redis: {:?}", snapshot);
                Ok(snapshot)
            }
            None => {
                tracing::info!("No state stored at {}, starting fresh", self.key);
                Ok(Snapshot::default())
            }
        }
    }

    async fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.conn.set::<_, _, ()>(&self.key, json).await?;
        tracing::debug!("State saved to Redis: {:?}", snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_namespaced_by_symbol() {
        assert_eq!(RedisStore::key_for("SOLUSDC"), "solspot:SOLUSDC:state");
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_connection_timeout() {
        let result = RedisStore::new("redis://192.0.2.1:6379", "SOLUSDC").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_save_and_load() {
        let mut store = RedisStore::new("redis://127.0.0.1:6379", "TEST_SAVE")
            .await
            .expect("Failed to connect to Redis");
        let _ = store.clear().await;

        assert_eq!(store.load().await.unwrap(), Snapshot::default());

        let snapshot = Snapshot {
            holding: true,
            buy_price: 100.0,
            peak_price: 104.0,
            first_run_sell_done: true,
        };
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), snapshot);

        let _ = store.clear().await;
    }
}
