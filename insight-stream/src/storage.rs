//! Storage collaborators behind the `StreamStore` trait: a Postgres-backed
//! implementation and an in-memory one for tests and embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use insight_core::config::StorageSettings;
use insight_core::{InsightError, Result, SamplePoint};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Read-only access to persisted readings. Implementations return
/// `NotFound` when a query matches no samples, never an empty vector.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Latest `count` samples, newest first.
    async fn recent(&self, stream_id: &str, count: usize) -> Result<Vec<SamplePoint>>;

    /// Samples within `[start, end]` inclusive, oldest first.
    async fn range(
        &self,
        stream_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SamplePoint>>;

    /// Identifiers of every stream with at least one reading.
    async fn list_streams(&self) -> Result<Vec<String>>;
}

pub struct PgStreamStore {
    pool: PgPool,
    /// Safety cap applied to window queries.
    fetch_limit: i64,
}

impl PgStreamStore {
    pub async fn connect(settings: &StorageSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.url)
            .await?;

        info!("database connection established");

        Ok(Self {
            pool,
            fetch_limit: settings.fetch_limit as i64,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_sample(row: &sqlx::postgres::PgRow) -> Result<SamplePoint> {
    Ok(SamplePoint {
        value: row.try_get("value")?,
        ts: row.try_get("ts")?,
    })
}

#[async_trait]
impl StreamStore for PgStreamStore {
    async fn recent(&self, stream_id: &str, count: usize) -> Result<Vec<SamplePoint>> {
        let rows = sqlx::query(
            "SELECT value, ts FROM readings WHERE stream_id = $1 ORDER BY ts DESC LIMIT $2",
        )
        .bind(stream_id)
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(InsightError::NotFound {
                stream_id: stream_id.to_string(),
            });
        }
        rows.iter().map(row_to_sample).collect()
    }

    async fn range(
        &self,
        stream_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SamplePoint>> {
        let rows = sqlx::query(
            "SELECT value, ts FROM readings \
             WHERE stream_id = $1 AND ts BETWEEN $2 AND $3 ORDER BY ts ASC LIMIT $4",
        )
        .bind(stream_id)
        .bind(start)
        .bind(end)
        .bind(self.fetch_limit)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(InsightError::NotFound {
                stream_id: stream_id.to_string(),
            });
        }
        rows.iter().map(row_to_sample).collect()
    }

    async fn list_streams(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT stream_id FROM readings ORDER BY stream_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("stream_id")?))
            .collect()
    }
}

/// In-memory store keyed by stream id; samples are kept sorted ascending by
/// timestamp on insert.
#[derive(Default)]
pub struct MemoryStreamStore {
    streams: RwLock<HashMap<String, Vec<SamplePoint>>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, stream_id: &str, mut samples: Vec<SamplePoint>) {
        samples.sort_by_key(|s| s.ts);
        let mut streams = self.streams.write().await;
        let entry = streams.entry(stream_id.to_string()).or_default();
        entry.extend(samples);
        entry.sort_by_key(|s| s.ts);
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn recent(&self, stream_id: &str, count: usize) -> Result<Vec<SamplePoint>> {
        let streams = self.streams.read().await;
        let samples = streams
            .get(stream_id)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| InsightError::NotFound {
                stream_id: stream_id.to_string(),
            })?;
        Ok(samples.iter().rev().take(count).copied().collect())
    }

    async fn range(
        &self,
        stream_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SamplePoint>> {
        let streams = self.streams.read().await;
        let samples: Vec<SamplePoint> = streams
            .get(stream_id)
            .map(|s| {
                s.iter()
                    .filter(|p| p.ts >= start && p.ts <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        if samples.is_empty() {
            return Err(InsightError::NotFound {
                stream_id: stream_id.to_string(),
            });
        }
        Ok(samples)
    }

    async fn list_streams(&self) -> Result<Vec<String>> {
        let streams = self.streams.read().await;
        let mut ids: Vec<String> = streams
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn samples(n: usize) -> Vec<SamplePoint> {
        let start = Utc::now();
        (0..n)
            .map(|i| SamplePoint {
                value: i as f64,
                ts: start + Duration::seconds(60 * i as i64),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let store = MemoryStreamStore::new();
        store.insert("zone1.temp", samples(10)).await;

        let recent = store.recent("zone1.temp", 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].value, 9.0);
        assert!(recent[0].ts > recent[1].ts);
    }

    #[tokio::test]
    async fn test_unknown_stream_is_not_found() {
        let store = MemoryStreamStore::new();
        let err = store.recent("nope", 5).await.unwrap_err();
        assert!(matches!(err, InsightError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_ascending() {
        let store = MemoryStreamStore::new();
        let points = samples(10);
        let start = points[2].ts;
        let end = points[6].ts;
        store.insert("zone1.temp", points).await;

        let slice = store.range("zone1.temp", start, end).await.unwrap();
        assert_eq!(slice.len(), 5);
        assert_eq!(slice[0].value, 2.0);
        assert_eq!(slice[4].value, 6.0);
    }

    #[tokio::test]
    async fn test_list_streams_sorted() {
        let store = MemoryStreamStore::new();
        store.insert("b.valve", samples(2)).await;
        store.insert("a.temp", samples(2)).await;
        let ids = store.list_streams().await.unwrap();
        assert_eq!(ids, vec!["a.temp".to_string(), "b.valve".to_string()]);
    }
}
