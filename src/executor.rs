//! Worker pool shared by quick discovery (unbounded) and subnet sweeps (bounded).

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::warn;

/// How many items may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// One worker per item.
    Unbounded,
    /// At most this many workers; zero is treated as one.
    Bounded(usize),
}

impl Concurrency {
    fn workers(self, items: usize) -> usize {
        match self {
            Concurrency::Unbounded => items,
            Concurrency::Bounded(n) => n.max(1).min(items),
        }
    }
}

/// Runs an async operation over a list of items with a worker pool.
///
/// Workers pull the next index from one shared cursor, so every item is
/// handed out exactly once regardless of worker count or timing. After each
/// item resolves the shared completion counter is bumped by one and the
/// progress callback receives the new count.
#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    concurrency: Concurrency,
}

impl BoundedExecutor {
    pub fn new(concurrency: Concurrency) -> Self {
        Self { concurrency }
    }

    pub fn unbounded() -> Self {
        Self::new(Concurrency::Unbounded)
    }

    pub fn bounded(limit: usize) -> Self {
        Self::new(Concurrency::Bounded(limit))
    }

    /// Process all items, returning how many completed.
    pub async fn run<T, F, Fut, P>(&self, items: Vec<T>, op: F, on_progress: P) -> usize
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        P: Fn(usize) + Send + Sync + 'static,
    {
        let workers = self.concurrency.workers(items.len());
        let items = Arc::new(items);
        let op = Arc::new(op);
        let on_progress = Arc::new(on_progress);
        let cursor = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let items = items.clone();
            let op = op.clone();
            let on_progress = on_progress.clone();
            let cursor = cursor.clone();
            let completed = completed.clone();
            set.spawn(async move {
                loop {
                    let idx = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = items.get(idx).cloned() else {
                        break;
                    };
                    op(item).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(done);
                }
            });
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "discovery worker stopped abnormally");
            }
        }

        completed.load(Ordering::SeqCst)
    }
}
