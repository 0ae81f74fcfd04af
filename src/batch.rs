use std::future::Future;
use std::time::Duration;

use crate::error::{CatalogError, RetryError};
use crate::retry::RetryExecutor;

/// TIDAL accepts at most this many items per playlist write.
pub const MAX_BATCH_SIZE: usize = 20;

/// Split `ids` into consecutive chunks of at most `batch_size`, preserving order.
///
/// An empty input yields no chunks; no chunk is ever empty.
pub fn partition<T>(ids: &[T], batch_size: usize) -> Vec<&[T]> {
    ids.chunks(batch_size.max(1)).collect()
}

/// Drives chunked playlist writes sequentially, throttled between chunks.
#[derive(Clone)]
pub struct BatchScheduler {
    retry: RetryExecutor,
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl BatchScheduler {
    pub fn new(retry: RetryExecutor, batch_size: usize, inter_batch_delay: Duration) -> Self {
        Self {
            retry,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            inter_batch_delay,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Write every chunk of `ids` through `write`, one chunk at a time.
    ///
    /// Each chunk is retried per the retry policy. The first chunk that still
    /// fails aborts the remaining chunks and its error is returned. Returns the
    /// number of chunks written.
    pub async fn write_batched<F, Fut>(
        &self,
        operation: &str,
        ids: &[String],
        mut write: F,
    ) -> Result<usize, RetryError>
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<(), CatalogError>>,
    {
        let chunks = partition(ids, self.batch_size);
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let label = format!("{} (batch {}/{})", operation, index + 1, total);
            log::debug!("{}: {} item(s)", label, chunk.len());

            self.retry.run(&label, || write(chunk.to_vec())).await?;

            if index + 1 < total && !self.inter_batch_delay.is_zero() {
                self.retry.sleeper().sleep(self.inter_batch_delay).await;
            }
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::test_utils::VirtualClock;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id{}", i)).collect()
    }

    fn scheduler(clock: Arc<VirtualClock>, batch_size: usize) -> BatchScheduler {
        let retry = RetryExecutor::new(
            Arc::new(RetryPolicy {
                jitter: false,
                ..RetryPolicy::default()
            }),
            clock,
        );
        BatchScheduler::new(retry, batch_size, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_writes_chunks_in_order_with_delays_between() {
        let clock = Arc::new(VirtualClock::default());
        let scheduler = scheduler(clock.clone(), 20);
        let written: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();

        let all = ids(45);
        let chunks = scheduler
            .write_batched("add", &all, |chunk| {
                let written = written.clone();
                async move {
                    written.lock().unwrap().push(chunk);
                    Ok(())
                }
            })
            .await
            .unwrap();

        let written = written.lock().unwrap();
        assert_eq!(chunks, 3);
        assert_eq!(
            written.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![20, 20, 5]
        );
        assert_eq!(written.concat(), all);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(500); 2]);
    }

    #[tokio::test]
    async fn test_empty_input_is_a_no_op() {
        let clock = Arc::new(VirtualClock::default());
        let scheduler = scheduler(clock.clone(), 20);

        let chunks = scheduler
            .write_batched("add", &[], |_| async {
                Err(CatalogError::Envelope("unexpected write".into()))
            })
            .await
            .unwrap();

        assert_eq!(chunks, 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_the_rest() {
        let clock = Arc::new(VirtualClock::default());
        let scheduler = scheduler(clock, 2);
        let calls: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();

        let result = scheduler
            .write_batched("add", &ids(6), |chunk| {
                let calls = calls.clone();
                async move {
                    let fail = chunk[0] == "id2";
                    calls.lock().unwrap().push(chunk);
                    if fail {
                        Err(CatalogError::Http {
                            status: 502,
                            retry_after_ms: None,
                            body: "bad gateway".into(),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.attempts, 3);
        let calls = calls.lock().unwrap();
        // one successful chunk, then three attempts at the failing one
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c[0] != "id4"));
    }

    #[test]
    fn test_batch_size_is_capped_at_api_limit() {
        let clock = Arc::new(VirtualClock::default());
        assert_eq!(scheduler(clock.clone(), 100).batch_size(), MAX_BATCH_SIZE);
        assert_eq!(scheduler(clock, 0).batch_size(), 1);
    }

    proptest! {
        /// Partitioning covers every id once, in order, in ceil(n/b) non-empty chunks of at most b
        #[test]
        fn partition_covers_ids_in_order(n in 0usize..200, b in 1usize..=20) {
            let all = ids(n);
            let chunks = partition(&all, b);

            prop_assert_eq!(chunks.len(), n.div_ceil(b));
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= b));
            prop_assert_eq!(chunks.concat(), all);
        }
    }
}
