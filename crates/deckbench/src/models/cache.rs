//! Load-once cache for expensive local models.
//!
//! Each key maps to a shared `OnceCell`. Concurrent callers asking for the same
//! key wait on the same initialization, so a model is loaded at most once per
//! key. A failed load leaves the cell empty and the next caller retries.

use crate::error::Result;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Keyed cache of loaded model handles.
///
/// The cache lives as long as its owner and is never invalidated
/// automatically; [`ModelCache::clear`] drops every entry explicitly.
pub struct ModelCache<K, V: ?Sized> {
    cells: Mutex<AHashMap<K, Arc<OnceCell<Arc<V>>>>>,
}

impl<K, V: ?Sized> Default for ModelCache<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(AHashMap::new()),
        }
    }
}

impl<K, V: ?Sized> std::fmt::Debug for ModelCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache").field("entries", &self.cells.lock().len()).finish()
    }
}

impl<K, V> ModelCache<K, V>
where
    K: Eq + Hash,
    V: ?Sized,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, loading it with `load` on first use.
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<V>>>,
    {
        let cell = {
            let mut cells = self.cells.lock();
            Arc::clone(cells.entry(key).or_default())
        };

        let value = cell.get_or_try_init(load).await?;
        Ok(Arc::clone(value))
    }

    /// Cached value for `key`, if it was loaded.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let cells = self.cells.lock();
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys with a loaded value.
    pub fn len(&self) -> usize {
        self.cells.lock().values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached value.
    pub fn clear(&self) {
        self.cells.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckbenchError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loads_once_per_key() {
        let cache: ModelCache<(&str, bool), String> = ModelCache::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load(("transformers", false), || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new("model".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(value.as_str(), "model");
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_load_separately() {
        let cache: ModelCache<(&str, bool), u32> = ModelCache::new();
        cache.get_or_load(("transformers", false), || async { Ok(Arc::new(1)) }).await.unwrap();
        cache.get_or_load(("transformers", true), || async { Ok(Arc::new(2)) }).await.unwrap();

        assert_eq!(cache.get(&("transformers", false)).as_deref(), Some(&1));
        assert_eq!(cache.get(&("transformers", true)).as_deref(), Some(&2));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache: ModelCache<u8, u8> = ModelCache::new();

        let err = cache
            .get_or_load(0, || async { Err(DeckbenchError::dependency_unavailable("model", "missing")) })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());

        let value = cache.get_or_load(0, || async { Ok(Arc::new(7)) }).await.unwrap();
        assert_eq!(*value, 7);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let cache: Arc<ModelCache<u8, u8>> = Arc::new(ModelCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(1, || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(Arc::new(42))
                    })
                    .await
                    .map(|v| *v)
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_forces_reload() {
        let cache: ModelCache<u8, u8> = ModelCache::new();
        cache.get_or_load(0, || async { Ok(Arc::new(1)) }).await.unwrap();
        cache.clear();
        assert!(cache.get(&0).is_none());
    }
}
