//! Tracked mint allow-list cache

use crate::db::mint::get_tracked_mints;
use moka::future::Cache;
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const TRACKED_MINTS_KEY: &str = "tracked_mints";

/// Caches the set of mints whose balance changes are recorded. The subscription
/// loop invalidates it whenever the tracked set changes.
#[derive(Clone)]
pub struct MintFilterCache {
    cache: Cache<&'static str, Arc<HashSet<String>>>,
}

impl MintFilterCache {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Current tracked mints, loading them from the store on a miss
    pub async fn tracked_mints(&self, pool: &Pool<Sqlite>) -> Result<Arc<HashSet<String>>, sqlx::Error> {
        if let Some(mints) = self.cache.get(TRACKED_MINTS_KEY).await {
            debug!("Cache hit for tracked mints ({} mints)", mints.len());
            return Ok(mints);
        }

        let mints: Arc<HashSet<String>> = Arc::new(get_tracked_mints(pool).await?.into_iter().collect());
        self.cache.insert(TRACKED_MINTS_KEY, mints.clone()).await;
        debug!("Loaded {} tracked mints", mints.len());
        Ok(mints)
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate(TRACKED_MINTS_KEY).await;
        info!("Invalidated tracked mint cache");
    }
}

/// An empty allow-list admits every mint.
pub fn is_tracked(mints: &HashSet<String>, mint: &str) -> bool {
    mints.is_empty() || mints.contains(mint)
}
