use std::{
    collections::HashMap,
    hash::{
        DefaultHasher,
        Hash,
        Hasher,
    },
    time::{
        Duration,
        Instant,
    },
};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Replaces the current value (if any) with the returned one; `None` removes the key.
pub type UpdateFn<'a, V> = Box<dyn FnOnce(Option<V>) -> Option<V> + Send + 'a>;

/// Keyed state shared across requests. Implementations own their eviction policy.
#[async_trait]
pub trait KeyedStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;

    async fn set(&self, key: &str, value: V);

    /// Applies `apply` atomically with respect to other calls on the same store.
    async fn update<'a>(&'a self, key: &'a str, apply: UpdateFn<'a, V>) -> Option<V>;

    async fn delete(&self, key: &str) -> Option<V>;

    /// Drops expired entries and returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

pub fn new_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    written_at: Instant,
}

const SHARD_COUNT: usize = 16;

type Shard<V> = RwLock<HashMap<String, Slot<V>>>;

/// In-process store with an optional time-to-live measured from the last write.
///
/// Keys are spread over independently locked shards, so a slow update on one
/// session never blocks reads of another.
#[derive(Debug)]
pub struct MemoryStore<V> {
    ttl: Option<Duration>,
    shards: Vec<Shard<V>>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self { ttl: None, shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect() }
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl), ..Self::default() }
    }

    fn shard_index(key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % SHARD_COUNT as u64) as usize
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        &self.shards[Self::shard_index(key)]
    }

    fn is_live(&self, slot: &Slot<V>) -> bool {
        match self.ttl {
            Some(ttl) => slot.written_at.elapsed() < ttl,
            None => true,
        }
    }

    pub async fn len(&self) -> usize {
        let mut live = 0;
        for shard in &self.shards {
            let entries = shard.read().await;
            live += entries.values().filter(|slot| self.is_live(slot)).count();
        }
        live
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl<V> KeyedStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let entries = self.shard(key).read().await;
        entries.get(key).filter(|slot| self.is_live(slot)).map(|slot| slot.value.clone())
    }

    async fn set(&self, key: &str, value: V) {
        let mut entries = self.shard(key).write().await;
        entries.insert(key.to_string(), Slot { value, written_at: Instant::now() });
    }

    async fn update<'a>(&'a self, key: &'a str, apply: UpdateFn<'a, V>) -> Option<V> {
        let mut entries = self.shard(key).write().await;

        let current = entries.remove(key).filter(|slot| self.is_live(slot)).map(|slot| slot.value);
        let next = apply(current)?;
        entries.insert(key.to_string(), Slot { value: next.clone(), written_at: Instant::now() });
        Some(next)
    }

    async fn delete(&self, key: &str) -> Option<V> {
        let mut entries = self.shard(key).write().await;
        entries.remove(key).filter(|slot| self.is_live(slot)).map(|slot| slot.value)
    }

    async fn purge_expired(&self) -> usize {
        let mut purged = 0;
        for shard in &self.shards {
            let mut entries = shard.write().await;
            let before = entries.len();
            entries.retain(|_, slot| self.is_live(slot));
            purged += before - entries.len();
        }
        if purged > 0 {
            tracing::debug!("Purged {} expired entries", purged);
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let store: MemoryStore<String> = MemoryStore::new();
        assert!(store.get("a").await.is_none());

        store.set("a", "one".to_string()).await;
        store.set("a", "two".to_string()).await;
        assert_eq!(store.get("a").await.as_deref(), Some("two"));

        assert_eq!(store.delete("a").await.as_deref(), Some("two"));
        assert!(store.get("a").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_creates_and_removes() {
        let store: MemoryStore<Vec<u32>> = MemoryStore::new();

        let created = store
            .update(
                "k",
                Box::new(|current| {
                    let mut list = current.unwrap_or_default();
                    list.push(1);
                    Some(list)
                }),
            )
            .await;
        assert_eq!(created, Some(vec![1]));

        let removed = store.update("k", Box::new(|_| None)).await;
        assert!(removed.is_none());
        assert!(store.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store: MemoryStore<u32> = MemoryStore::with_ttl(Duration::from_millis(20));
        store.set("a", 1).await;
        assert_eq!(store.get("a").await, Some(1));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("a").await, None);
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store: Arc<MemoryStore<u32>> = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update("count", Box::new(|current| Some(current.unwrap_or(0) + 1))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("count").await, Some(32));
    }

    #[tokio::test]
    async fn test_locked_shard_does_not_block_other_keys() {
        let store: MemoryStore<u32> = MemoryStore::new();
        let busy = "busy";
        let other = (0..)
            .map(|i| format!("key-{}", i))
            .find(|key| MemoryStore::<u32>::shard_index(key) != MemoryStore::<u32>::shard_index(busy))
            .unwrap();

        store.set(&other, 7).await;
        let _held = store.shard(busy).write().await;

        let read = tokio::time::timeout(Duration::from_secs(1), store.get(&other)).await;
        assert_eq!(read.unwrap(), Some(7));
        let write = tokio::time::timeout(Duration::from_secs(1), store.set(&other, 8)).await;
        assert!(write.is_ok());
    }

    #[tokio::test]
    async fn test_len_and_purge_span_shards() {
        let store: MemoryStore<usize> = MemoryStore::with_ttl(Duration::from_millis(20));
        for i in 0..64 {
            store.set(&format!("key-{}", i), i).await;
        }
        assert_eq!(store.len().await, 64);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.purge_expired().await, 64);
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_new_key_is_uuid() {
        let key = new_key();
        assert!(uuid::Uuid::parse_str(&key).is_ok());
        assert_ne!(key, new_key());
    }
}
