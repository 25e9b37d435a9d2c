use crate::config::FailureConfig;
use crate::domain::channel::FailureKey;
use crate::domain::ports::{NotifierRef, Severity, SharedCacheRef};
use crate::error::Result;
use tracing::{debug, warn};

/// Short-window failure tally per upstream identity.
///
/// Feeds weight decay in the ranker; independent of the health score.
pub struct FailureCounter {
    cache: SharedCacheRef,
    notifier: NotifierRef,
    config: FailureConfig,
}

impl FailureCounter {
    pub fn new(cache: SharedCacheRef, notifier: NotifierRef, config: FailureConfig) -> Self {
        Self {
            cache,
            notifier,
            config,
        }
    }

    fn cache_key(key: &FailureKey) -> String {
        format!("failures:{key}")
    }

    pub fn decay_threshold(&self) -> i64 {
        self.config.decay_threshold
    }

    pub async fn record_failure(&self, key: &FailureKey) -> Result<i64> {
        let count = self
            .cache
            .incr_with_ttl(&Self::cache_key(key), self.config.window())
            .await?;

        if count == self.config.decay_threshold {
            warn!(failure_key = %key, count, "Upstream weight halved");
            self.notifier.notify(
                Severity::Warning,
                "Upstream weight halved",
                &format!(
                    "{key} failed {count} times within {}s; its weight is halved until it recovers",
                    self.config.window_secs
                ),
            );
        } else if count >= self.config.alert_threshold {
            warn!(failure_key = %key, count, "Upstream failure burst");
            self.notifier.notify(
                Severity::Critical,
                "Upstream failure burst",
                &format!(
                    "{key} failed {count} times within {}s",
                    self.config.window_secs
                ),
            );
        }
        Ok(count)
    }

    pub async fn clear(&self, key: &FailureKey) -> Result<()> {
        self.cache.delete(&Self::cache_key(key)).await?;
        debug!(failure_key = %key, "Upstream failure tally cleared");
        Ok(())
    }

    pub async fn count(&self, key: &FailureKey) -> Result<i64> {
        let raw = self.cache.get(&Self::cache_key(key)).await?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Notifier;
    use crate::infrastructure::in_memory::InMemoryCache;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Severity, String)>>);

    impl Notifier for Recorder {
        fn notify(&self, severity: Severity, title: &str, _body: &str) {
            self.0.lock().unwrap().push((severity, title.to_string()));
        }
    }

    fn counter() -> (FailureCounter, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let counter = FailureCounter::new(
            Arc::new(InMemoryCache::new()),
            recorder.clone(),
            FailureConfig::default(),
        );
        (counter, recorder)
    }

    #[tokio::test]
    async fn test_third_failure_emits_single_notice() {
        let (counter, recorder) = counter();
        let key = FailureKey::Supplier(5);
        for expected in 1..=4 {
            assert_eq!(counter.record_failure(&key).await.unwrap(), expected);
        }
        let notices = recorder.0.lock().unwrap().clone();
        assert_eq!(notices, vec![(Severity::Warning, "Upstream weight halved".to_string())]);
    }

    #[tokio::test]
    async fn test_escalates_from_tenth_failure() {
        let (counter, recorder) = counter();
        let key = FailureKey::Supplier(5);
        for _ in 0..11 {
            counter.record_failure(&key).await.unwrap();
        }
        let critical = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == Severity::Critical)
            .count();
        assert_eq!(critical, 2);
    }

    #[tokio::test]
    async fn test_clear_restarts_window() {
        let (counter, _) = counter();
        let key = FailureKey::Supplier(8);
        counter.record_failure(&key).await.unwrap();
        counter.record_failure(&key).await.unwrap();
        counter.clear(&key).await.unwrap();
        assert_eq!(counter.count(&key).await.unwrap(), 0);
        assert_eq!(counter.record_failure(&key).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tally_expires_after_window() {
        let (counter, _) = counter();
        let key = FailureKey::Supplier(9);
        counter.record_failure(&key).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(counter.record_failure(&key).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(counter.count(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let (counter, _) = counter();
        let a = FailureKey::Route {
            supplier_id: 1,
            upstream_channel_code: "a".into(),
            system_channel_code: "PIX".into(),
        };
        let b = FailureKey::Supplier(1);
        counter.record_failure(&a).await.unwrap();
        assert_eq!(counter.count(&a).await.unwrap(), 1);
        assert_eq!(counter.count(&b).await.unwrap(), 0);
    }
}
