use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

pub const MAX_CONCURRENCY: usize = 32;
const DEFAULT_MAX_CONCURRENCY: usize = 4;

pub fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(DEFAULT_MAX_CONCURRENCY).max(1)
}

pub fn parse_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_CONCURRENCY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

#[derive(Debug, Default)]
struct PoolCounters {
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
}

/// Bounded worker pool for one run. The semaphore is FIFO, so adapters that
/// ask in declaration order are admitted in declaration order.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    limit: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
}

pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<PoolCounters>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard<'a>(&'a PoolCounters);

impl<'a> WaiterGuard<'a> {
    fn new(counters: &'a PoolCounters) -> Self {
        counters.waiters.fetch_add(1, Ordering::Relaxed);
        Self(counters)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::Relaxed);
    }
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_CONCURRENCY);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            counters: Arc::new(PoolCounters::default()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Waits for a slot. `None` when `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<WorkerPermit> {
        let _waiter = WaiterGuard::new(&self.counters);
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
        };
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        Some(WorkerPermit {
            _permit: permit,
            counters: self.counters.clone(),
        })
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            limit: self.limit,
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            waiters: self.counters.waiters.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_concurrency_defaults_and_clamps() {
        assert_eq!(parse_concurrency(None, 3), 3);
        assert_eq!(parse_concurrency(Some("   "), 3), 3);
        assert_eq!(parse_concurrency(Some("2"), 3), 2);
        assert_eq!(parse_concurrency(Some("0"), 3), 1);
        assert_eq!(parse_concurrency(Some("999"), 3), MAX_CONCURRENCY);
        assert_eq!(parse_concurrency(Some("abc"), 3), 3);
        assert_eq!(parse_concurrency(Some(" 5 "), 3), 5);
        assert!((1..=DEFAULT_MAX_CONCURRENCY).contains(&default_concurrency()));
    }

    #[tokio::test]
    async fn permits_bound_in_flight_work() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();
        let first = pool.acquire(&cancel).await.unwrap();
        assert_eq!(pool.snapshot().in_flight, 1);

        let waiting = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pool.acquire(&cancel).await.is_some() })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        assert!(!waiting.await.unwrap());

        drop(first);
        assert_eq!(pool.snapshot().in_flight, 0);
        assert_eq!(pool.snapshot().waiters, 0);
    }
}
