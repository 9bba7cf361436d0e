#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use tokio::sync::Mutex;
#[cfg(feature = "postgres")]
use tokio_postgres::Client;

#[cfg(feature = "postgres")]
use crate::error::StoreError;
#[cfg(feature = "postgres")]
use crate::storage::ErrorStore;
#[cfg(feature = "postgres")]
use crate::types::ErrorEvent;

/// Durable store on PostgreSQL.
///
/// One table per database name, keyed by a `BIGSERIAL` id, with an index
/// on `timestamp` for oldest-first eviction and range queries.
#[cfg(feature = "postgres")]
pub struct PostgresStore {
    client: Mutex<Option<Client>>,
    table: String,
    capacity: usize,
}

#[cfg(feature = "postgres")]
impl PostgresStore {
    /// Create the table and index if needed.
    pub async fn open(
        client: Client,
        db_name: &str,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let table = table_name(db_name);

        client
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id BIGSERIAL PRIMARY KEY,
                        timestamp BIGINT NOT NULL,
                        payload JSONB NOT NULL
                    )"
                ),
                &[],
            )
            .await
            .map_err(backend)?;

        client
            .execute(
                &format!("CREATE INDEX IF NOT EXISTS {table}_timestamp_idx ON {table} (timestamp)"),
                &[],
            )
            .await
            .map_err(backend)?;

        Ok(Self {
            client: Mutex::new(Some(client)),
            table,
            capacity: capacity.max(1),
        })
    }

    fn decode(rows: Vec<tokio_postgres::Row>) -> Vec<ErrorEvent> {
        rows.into_iter()
            .filter_map(|row| row.try_get::<_, serde_json::Value>(0).ok())
            .filter_map(|v| serde_json::from_value::<ErrorEvent>(v).ok())
            .collect()
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl ErrorStore for PostgresStore {
    async fn put(&self, event: &ErrorEvent) -> Result<(), StoreError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(StoreError::Closed)?;

        let payload = serde_json::to_value(event)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let timestamp = event.timestamp as i64;

        let tx = client.transaction().await.map_err(backend)?;

        let count: i64 = tx
            .query_one(&format!("SELECT COUNT(*) FROM {}", self.table), &[])
            .await
            .map_err(backend)?
            .get(0);

        if count as usize >= self.capacity {
            tx.execute(
                &format!(
                    "DELETE FROM {t} WHERE id = (
                        SELECT id FROM {t} ORDER BY timestamp ASC, id ASC LIMIT 1
                    )",
                    t = self.table
                ),
                &[],
            )
            .await
            .map_err(backend)?;
            crate::metric_inc("sentinel.store.evicted");
        }

        tx.execute(
            &format!("INSERT INTO {} (timestamp, payload) VALUES ($1, $2)", self.table),
            &[&timestamp, &payload],
        )
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn get_all(&self) -> Result<Vec<ErrorEvent>, StoreError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(StoreError::Closed)?;
        let rows = client
            .query(&format!("SELECT payload FROM {} ORDER BY id ASC", self.table), &[])
            .await
            .map_err(backend)?;
        Ok(Self::decode(rows))
    }

    async fn get_by_time_range(&self, start: u64, end: u64) -> Result<Vec<ErrorEvent>, StoreError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(StoreError::Closed)?;
        let (start, end) = (start as i64, end as i64);
        let rows = client
            .query(
                &format!(
                    "SELECT payload FROM {} WHERE timestamp BETWEEN $1 AND $2
                     ORDER BY timestamp ASC, id ASC",
                    self.table
                ),
                &[&start, &end],
            )
            .await
            .map_err(backend)?;
        Ok(Self::decode(rows))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(StoreError::Closed)?;
        client
            .execute(&format!("DELETE FROM {}", self.table), &[])
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(StoreError::Closed)?;
        let count: i64 = client
            .query_one(&format!("SELECT COUNT(*) FROM {}", self.table), &[])
            .await
            .map_err(backend)?
            .get(0);
        Ok(count as usize)
    }

    fn max_records(&self) -> Option<usize> {
        Some(self.capacity)
    }

    async fn close(&self) {
        self.client.lock().await.take();
    }
}

/// Table name derived from the database name, restricted to identifier
/// characters. Names that would not start with a letter get a `sentinel_` prefix.
#[cfg(feature = "postgres")]
fn table_name(db_name: &str) -> String {
    let cleaned: String = db_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if cleaned.starts_with(|c: char| c.is_ascii_alphabetic()) {
        format!("{}_errors", cleaned)
    } else {
        format!("sentinel_{}_errors", cleaned)
    }
}

#[cfg(feature = "postgres")]
fn backend(err: tokio_postgres::Error) -> StoreError {
    match err.as_db_error() {
        Some(db) => StoreError::Backend(format!("{} ({}): {}", err, db.code().code(), db.message())),
        None => StoreError::Backend(err.to_string()),
    }
}
