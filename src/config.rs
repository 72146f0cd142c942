use std::path::PathBuf;

use chrono::Duration;

use crate::cache::SnapshotCache;
use crate::models::Granularity;
use crate::snapshot::SnapshotSource;
use crate::transactions::InvalidRowPolicy;

pub const DEFAULT_BUCKET: &str = "fraud-detection-loicvalentini";
pub const DEFAULT_KEY: &str = "reports/full/scored_payments.parquet";
/// Upper bound for `--cache-ttl-secs`: thirty days.
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Everything a render needs, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bucket: String,
    pub key: String,
    pub file: Option<PathBuf>,
    pub granularity: Granularity,
    pub policy: InvalidRowPolicy,
    pub cache_ttl: Option<Duration>,
}

impl Settings {
    /// Values above [`MAX_TTL_SECS`] are clamped to it.
    pub fn cache_ttl_from_secs(secs: Option<u64>) -> Option<Duration> {
        secs.map(|s| {
            let clamped = s.min(MAX_TTL_SECS) as i64;
            Duration::try_seconds(clamped).unwrap_or(Duration::MAX)
        })
    }

    pub async fn source(&self) -> SnapshotSource {
        match &self.file {
            Some(path) => SnapshotSource::File(path.clone()),
            None => SnapshotSource::s3(&self.bucket, &self.key).await,
        }
    }

    pub async fn cache(&self) -> SnapshotCache {
        SnapshotCache::new(self.source().await, self.cache_ttl)
    }
}
