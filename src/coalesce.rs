use crate::error::Result;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Collapses concurrent loads of the same key into one.
///
/// Callers arriving while a load is in flight wait for it and share its
/// value. The slot is released when the load completes, so nothing is cached
/// beyond the lifetime of the in-flight read. A failed load is not shared:
/// the next waiter runs its own loader.
pub struct Coalescer<K, V> {
    inflight: DashMap<K, Arc<OnceCell<V>>>,
}

impl<K, V> Default for Coalescer<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    pub async fn load<F, Fut>(&self, key: K, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell.get_or_try_init(loader).await.cloned();
        self.inflight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        result
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_loads_hit_storage_once() {
        let coalescer = Arc::new(Coalescer::<String, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let loads = (0..10).map(|_| {
            let coalescer = coalescer.clone();
            let calls = calls.clone();
            async move {
                coalescer
                    .load("M1".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
            }
        });
        let results = futures::future::join_all(loads).await;

        assert!(results.iter().all(|r| matches!(r, Ok(42))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_loads_are_not_cached() {
        let coalescer = Coalescer::<u64, u64>::new();
        assert_eq!(coalescer.load(1, || async { Ok(1) }).await.unwrap(), 1);
        assert_eq!(coalescer.load(1, || async { Ok(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_shared() {
        let coalescer = Coalescer::<u64, u64>::new();
        let failed = coalescer
            .load(1, || async { Err(GatewayError::Storage("down".into())) })
            .await;
        assert!(failed.is_err());
        assert_eq!(coalescer.load(1, || async { Ok(5) }).await.unwrap(), 5);
    }
}
