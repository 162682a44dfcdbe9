use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

/// Executes tasks in consecutive chunks of at most `concurrency` items.
///
/// Every task in a chunk settles before the next chunk starts, so no more than
/// `concurrency` tasks are ever in flight. The stop token is only consulted at
/// chunk boundaries; a running chunk is never interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    concurrency: usize,
    chunk_delay: Duration,
}

/// What a pool run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRun<T> {
    /// Settled task results, chunk by chunk.
    pub settled: Vec<T>,
    /// Set when a stop was observed before every chunk had started.
    pub halted: bool,
}

impl WorkerPool {
    pub fn new(concurrency: usize, chunk_delay: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            chunk_delay,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        stop: &CancellationToken,
        task: F,
    ) -> PoolRun<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut settled = Vec::with_capacity(items.len());
        let mut pending = items.into_iter().peekable();
        let mut first_chunk = true;

        while pending.peek().is_some() {
            if !first_chunk && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            if stop.is_cancelled() {
                return PoolRun {
                    settled,
                    halted: true,
                };
            }
            first_chunk = false;

            let chunk: Vec<I> = pending.by_ref().take(self.concurrency).collect();
            settled.extend(join_all(chunk.into_iter().map(&task)).await);
        }

        PoolRun {
            settled,
            halted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        async fn track(&self, hold: Duration) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(hold).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_limit() {
        for limit in 1..=4 {
            let tracker = InFlight::new();
            let pool = WorkerPool::new(limit, Duration::from_millis(5));
            let token = CancellationToken::new();

            let run = pool
                .run((0..10u64).collect(), &token, |index| {
                    let tracker = Arc::clone(&tracker);
                    async move {
                        tracker.track(Duration::from_millis(10 + index % 3)).await;
                        index
                    }
                })
                .await;

            assert!(!run.halted);
            assert_eq!(run.settled.len(), 10);
            assert_eq!(tracker.peak.load(Ordering::SeqCst), limit);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_order_is_preserved() {
        let pool = WorkerPool::new(3, Duration::ZERO);
        let token = CancellationToken::new();

        let run = pool
            .run(vec![5u64, 1, 3, 2, 4], &token, |value| async move {
                tokio::time::sleep(Duration::from_millis(value)).await;
                value
            })
            .await;

        assert_eq!(run.settled, vec![5, 1, 3, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_new_chunks_but_finishes_current_one() {
        let pool = WorkerPool::new(2, Duration::from_millis(50));
        let token = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));

        let run = pool
            .run((0..6).collect::<Vec<u32>>(), &token, |index| {
                let token = token.clone();
                let started = Arc::clone(&started);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if index == 0 {
                        token.cancel();
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    index
                }
            })
            .await;

        assert!(run.halted);
        assert_eq!(run.settled, vec![0, 1]);
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_input_settles_immediately() {
        let pool = WorkerPool::new(0, Duration::from_secs(1));
        let token = CancellationToken::new();
        let run = pool.run(Vec::<u8>::new(), &token, |v| async move { v }).await;
        assert_eq!(pool.concurrency(), 1);
        assert!(run.settled.is_empty());
        assert!(!run.halted);
    }
}
