use crate::backend::{DistanceMetric, SearchHit, VectorBackend};
use crate::error::Result;
use crate::filter::MetadataFilter;
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Adapter wrapper that retries a transient failure exactly once.
///
/// Non-transient errors are returned immediately. The second failure is
/// returned as-is so callers can decide whether to degrade.
pub struct RetryingBackend<B> {
    inner: B,
    backoff: Duration,
}

impl<B: VectorBackend> RetryingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self::with_backoff(inner, DEFAULT_BACKOFF)
    }

    pub fn with_backoff(inner: B, backoff: Duration) -> Self {
        Self { inner, backoff }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: VectorBackend> VectorBackend for RetryingBackend<B> {
    fn capability_profile_id(&self) -> &str {
        self.inner.capability_profile_id()
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> Result<Vec<SearchHit>> {
        match self.inner.search(vector, k, filter, metric).await {
            Err(err) if err.is_transient() => {
                warn!(
                    "Search against {} failed ({err}), retrying in {}ms",
                    self.inner.capability_profile_id(),
                    self.backoff.as_millis()
                );
                tokio::time::sleep(self.backoff).await;
                self.inner.search(vector, k, filter, metric).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VectorStoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    /// Fails the first `failures` calls with the given error kind.
    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
        transient: bool,
    }

    impl Flaky {
        fn new(failures: usize, transient: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                transient,
            }
        }
    }

    #[async_trait]
    impl VectorBackend for Flaky {
        fn capability_profile_id(&self) -> &str {
            "flaky"
        }

        async fn search(
            &self,
            _vector: &[f32],
            _k: usize,
            _filter: Option<&MetadataFilter>,
            _metric: DistanceMetric,
        ) -> Result<Vec<SearchHit>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    return Err(VectorStoreError::Unavailable("connection reset".to_string()));
                }
                return Err(VectorStoreError::InvalidQuery("bad vector".to_string()));
            }
            Ok(vec![SearchHit::new("doc", 0.5)])
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failure_once() {
        let backend = RetryingBackend::with_backoff(Flaky::new(1, true), Duration::from_millis(1));
        let hits = assert_ok!(backend.search(&[1.0], 1, None, DistanceMetric::Cosine).await);
        assert_eq!(hits.len(), 1);
        assert_eq!(backend.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_failure() {
        let backend = RetryingBackend::with_backoff(Flaky::new(5, true), Duration::from_millis(1));
        let err = assert_err!(backend.search(&[1.0], 1, None, DistanceMetric::Cosine).await);
        assert!(err.is_transient());
        assert_eq!(backend.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_failure() {
        let backend = RetryingBackend::new(Flaky::new(1, false));
        assert_err!(backend.search(&[1.0], 1, None, DistanceMetric::Cosine).await);
        assert_eq!(backend.inner().calls.load(Ordering::SeqCst), 1);
    }
}
