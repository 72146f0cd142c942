use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::snapshot::{self, RawTable, SnapshotSource};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub bucket: String,
    pub key: String,
}

impl CacheKey {
    pub fn for_source(source: &SnapshotSource) -> Self {
        match source {
            SnapshotSource::S3 { bucket, key, .. } => CacheKey {
                bucket: bucket.clone(),
                key: key.clone(),
            },
            SnapshotSource::File(path) => CacheKey {
                bucket: "file".to_string(),
                key: path.display().to_string(),
            },
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    key: CacheKey,
    table: Arc<RawTable>,
    fetched_at: DateTime<Utc>,
}

/// Holds the last decoded snapshot until it is invalidated or expires.
#[derive(Debug)]
pub struct SnapshotCache {
    source: SnapshotSource,
    ttl: Option<Duration>,
    entry: Option<CacheEntry>,
}

impl SnapshotCache {
    pub fn new(source: SnapshotSource, ttl: Option<Duration>) -> Self {
        Self {
            source,
            ttl,
            entry: None,
        }
    }

    pub fn source(&self) -> &SnapshotSource {
        &self.source
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|entry| entry.fetched_at)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let key = CacheKey::for_source(&self.source);
        match &self.entry {
            Some(entry) if entry.key == key => match self.ttl {
                Some(ttl) => now - entry.fetched_at < ttl,
                None => true,
            },
            _ => false,
        }
    }

    pub async fn get_or_fetch(&mut self, now: DateTime<Utc>) -> anyhow::Result<Arc<RawTable>> {
        if self.is_fresh(now) {
            if let Some(entry) = &self.entry {
                debug!(fetched_at = %entry.fetched_at, "snapshot served from cache");
                return Ok(Arc::clone(&entry.table));
            }
        }

        let bytes = self.source.fetch().await?;
        let table = Arc::new(snapshot::decode(bytes)?);
        info!(
            location = %self.source.location(),
            rows = table.len(),
            "snapshot cached"
        );
        self.entry = Some(CacheEntry {
            key: CacheKey::for_source(&self.source),
            table: Arc::clone(&table),
            fetched_at: now,
        });
        Ok(table)
    }

    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            info!(location = %self.source.location(), "snapshot cache invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn scratch_file(bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fraud-report-{}.parquet", Uuid::new_v4()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_710_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn serves_cached_table_until_invalidated() {
        let path = scratch_file(&fixtures::epoch_parquet(&[1_700_000_000], &[0], &[5.0]));
        let mut cache = SnapshotCache::new(SnapshotSource::File(path.clone()), None);

        let first = cache.get_or_fetch(t0()).await.unwrap();
        assert_eq!(first.len(), 1);

        std::fs::write(
            &path,
            fixtures::epoch_parquet(&[1_700_000_000, 1_700_000_100], &[0, 1], &[5.0, 7.0]),
        )
        .unwrap();

        let cached = cache.get_or_fetch(t0() + Duration::hours(5)).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert!(Arc::ptr_eq(&first, &cached));

        cache.invalidate();
        let reloaded = cache.get_or_fetch(t0() + Duration::hours(5)).await.unwrap();
        assert_eq!(reloaded.len(), 2);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let path = scratch_file(&fixtures::epoch_parquet(&[1_700_000_000], &[1], &[1.0]));
        let mut cache = SnapshotCache::new(
            SnapshotSource::File(path.clone()),
            Some(Duration::minutes(10)),
        );

        cache.get_or_fetch(t0()).await.unwrap();
        assert!(cache.is_fresh(t0() + Duration::minutes(9)));
        assert!(!cache.is_fresh(t0() + Duration::minutes(10)));

        let later = t0() + Duration::minutes(11);
        cache.get_or_fetch(later).await.unwrap();
        assert_eq!(cache.fetched_at(), Some(later));

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_entry() {
        let path = scratch_file(&fixtures::epoch_parquet(&[1_700_000_000], &[0], &[1.0]));
        let mut cache = SnapshotCache::new(
            SnapshotSource::File(path.clone()),
            Some(Duration::minutes(1)),
        );
        cache.get_or_fetch(t0()).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let err = cache.get_or_fetch(t0() + Duration::hours(1)).await;
        assert!(err.is_err());
        assert_eq!(cache.fetched_at(), Some(t0()));
    }
}
