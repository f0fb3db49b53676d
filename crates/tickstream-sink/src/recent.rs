use std::time::Duration;

use moka::future::Cache;

/// Short-lived memory of delivery keys that reached storage.
///
/// A record that was stored but whose acknowledgement never reached the
/// broker comes back on the next poll. Checking this cache first lets a sink
/// skip the second write. Entries are evicted after the TTL, so a miss is
/// never proof that a record is new.
pub struct RecentDeliveries {
    inner: Cache<String, ()>,
}

impl RecentDeliveries {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.get(key).await.is_some()
    }

    pub async fn remember(&self, key: String) {
        self.inner.insert(key, ()).await;
    }
}

impl Default for RecentDeliveries {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(300))
    }
}
