use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::freshness::{log_staleness, DataClass, FreshnessPolicy};

#[derive(Debug, Clone)]
struct Stamped<V> {
    value: V,
    fetched_at: DateTime<Utc>,
}

/// Process-local key -> (value, fetched-at) map for one [`DataClass`].
///
/// Entries are never evicted; a stale entry is simply ignored until overwritten.
pub struct TtlCache<K, V> {
    class: DataClass,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, Stamped<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(class: DataClass, policy: FreshnessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            class,
            policy,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn class(&self) -> DataClass {
        self.class
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The cached value if it is still within the class TTL.
    pub async fn get_fresh(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().await;
        let entry = entries.get(key);
        let check = self
            .policy
            .check(entry.map(|e| e.fetched_at), self.class, self.clock.now());
        log_staleness(self.class, &format!("{key:?}"), &check);
        if check.is_stale {
            return None;
        }
        entry.map(|e| e.value.clone())
    }

    /// Store `value`, stamped with the current clock time.
    pub async fn insert(&self, key: K, value: V) {
        let fetched_at = self.clock.now();
        self.insert_at(key, value, fetched_at).await;
    }

    pub async fn insert_at(&self, key: K, value: V, fetched_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        entries.insert(key, Stamped { value, fetched_at });
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
