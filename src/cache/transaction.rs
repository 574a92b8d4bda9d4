//! Recently processed signature cache

use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

pub const RECENT_TRANSACTIONS_CAPACITY: u64 = 50;
pub const RECENT_TRANSACTIONS_TTL: Duration = Duration::from_secs(30);

/// Remembers signatures processed in the last few seconds, so a transaction
/// reported by several account updates is only fetched once.
#[derive(Clone)]
pub struct RecentTransactionCache {
    cache: Cache<String, ()>,
}

impl RecentTransactionCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn contains(&self, signature: &str) -> bool {
        let hit = self.cache.contains_key(signature);
        if hit {
            debug!("Cache hit for signature: {}", signature);
        }
        hit
    }

    pub async fn mark_processed(&self, signature: &str) {
        self.cache.insert(signature.to_string(), ()).await;
    }
}

impl Default for RecentTransactionCache {
    fn default() -> Self {
        Self::new(RECENT_TRANSACTIONS_CAPACITY, RECENT_TRANSACTIONS_TTL)
    }
}
