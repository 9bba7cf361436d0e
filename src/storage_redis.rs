#[cfg(feature = "redis")]
use async_trait::async_trait;
#[cfg(feature = "redis")]
use redis::AsyncCommands;
#[cfg(feature = "redis")]
use tokio::sync::Mutex;

#[cfg(feature = "redis")]
use crate::error::StoreError;
#[cfg(feature = "redis")]
use crate::storage::ErrorStore;
#[cfg(feature = "redis")]
use crate::types::ErrorEvent;

/// Durable store on Redis.
///
/// Layout under `{db_name}`:
/// - `{db_name}:errors` hash of record id -> JSON record
/// - `{db_name}:errors:timestamp` sorted set of record id scored by timestamp
/// - `{db_name}:errors:seq` counter handing out record ids
///
/// Record ids are zero-padded to a fixed width so that members with equal
/// scores, which Redis orders lexicographically, still sort by insertion.
#[cfg(feature = "redis")]
pub struct RedisStore {
    client: Mutex<Option<redis::Client>>,
    prefix: String,
    capacity: usize,
}

#[cfg(feature = "redis")]
impl RedisStore {
    /// Open the store and verify the server is reachable.
    pub async fn open(
        client: redis::Client,
        db_name: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let mut conn = client.get_tokio_connection().await.map_err(backend)?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(backend)?;

        Ok(Self {
            client: Mutex::new(Some(client)),
            prefix: db_name.into(),
            capacity: capacity.max(1),
        })
    }

    fn records_key(&self) -> String {
        format!("{}:errors", self.prefix)
    }

    fn index_key(&self) -> String {
        format!("{}:errors:timestamp", self.prefix)
    }

    fn seq_key(&self) -> String {
        format!("{}:errors:seq", self.prefix)
    }

    async fn connection(
        &self,
        client: &Option<redis::Client>,
    ) -> Result<redis::aio::Connection, StoreError> {
        match client {
            Some(client) => client.get_tokio_connection().await.map_err(backend),
            None => Err(StoreError::Closed),
        }
    }

    async fn load(
        &self,
        conn: &mut redis::aio::Connection,
        ids: &[String],
    ) -> Result<Vec<ErrorEvent>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.records_key())
            .arg(ids)
            .query_async(conn)
            .await
            .map_err(backend)?;

        Ok(values
            .into_iter()
            .flatten()
            .filter_map(|v| serde_json::from_str::<ErrorEvent>(&v).ok())
            .collect())
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl ErrorStore for RedisStore {
    async fn put(&self, event: &ErrorEvent) -> Result<(), StoreError> {
        // Held across check, evict and insert.
        let guard = self.client.lock().await;
        let mut conn = self.connection(&guard).await?;

        let payload = serde_json::to_string(event)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let count: usize = conn.hlen(self.records_key()).await.map_err(backend)?;
        if count >= self.capacity {
            let oldest: Vec<String> = conn
                .zrange(self.index_key(), 0, 0)
                .await
                .map_err(backend)?;
            if let Some(id) = oldest.first() {
                let _: () = redis::pipe()
                    .atomic()
                    .hdel(self.records_key(), id)
                    .ignore()
                    .zrem(self.index_key(), id)
                    .ignore()
                    .query_async(&mut conn)
                    .await
                    .map_err(backend)?;
                crate::metric_inc("sentinel.store.evicted");
            }
        }

        let seq: u64 = conn.incr(self.seq_key(), 1u64).await.map_err(backend)?;
        let id = record_id(seq);
        let _: () = redis::pipe()
            .atomic()
            .hset(self.records_key(), &id, payload)
            .ignore()
            .zadd(self.index_key(), &id, event.timestamp)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ErrorEvent>, StoreError> {
        let guard = self.client.lock().await;
        let mut conn = self.connection(&guard).await?;
        let mut ids: Vec<String> = conn.hkeys(self.records_key()).await.map_err(backend)?;
        ids.sort_unstable();
        self.load(&mut conn, &ids).await
    }

    async fn get_by_time_range(&self, start: u64, end: u64) -> Result<Vec<ErrorEvent>, StoreError> {
        let guard = self.client.lock().await;
        let mut conn = self.connection(&guard).await?;
        let ids: Vec<String> = conn
            .zrangebyscore(self.index_key(), start, end)
            .await
            .map_err(backend)?;
        self.load(&mut conn, &ids).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let guard = self.client.lock().await;
        let mut conn = self.connection(&guard).await?;
        let _: () = conn
            .del(vec![self.records_key(), self.index_key()])
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let guard = self.client.lock().await;
        let mut conn = self.connection(&guard).await?;
        conn.hlen(self.records_key()).await.map_err(backend)
    }

    fn max_records(&self) -> Option<usize> {
        Some(self.capacity)
    }

    async fn close(&self) {
        self.client.lock().await.take();
    }
}

#[cfg(feature = "redis")]
fn record_id(seq: u64) -> String {
    format!("{:020}", seq)
}

#[cfg(feature = "redis")]
fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[cfg(all(test, feature = "redis"))]
mod tests {
    use super::record_id;

    #[test]
    fn record_ids_sort_in_insertion_order() {
        let mut ids: Vec<String> = [10u64, 2, 11, 9, 100].iter().map(|&n| record_id(n)).collect();
        ids.sort();
        assert_eq!(ids, vec![record_id(2), record_id(9), record_id(10), record_id(11), record_id(100)]);
    }
}
