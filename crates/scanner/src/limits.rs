use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const MAX_WORKERS: usize = 32;

const WORKERS_ENV: &str = "MAPPER_WORKERS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub peak: usize,
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_workers(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .min(MAX_WORKERS)
}

/// Worker count from `MAPPER_WORKERS`, or `default_value` when unset or malformed.
pub fn workers_from_env(default_value: usize) -> usize {
    let raw = std::env::var(WORKERS_ENV).ok();
    parse_workers(raw.as_deref(), default_value)
}

/// Number of tokenization calls allowed in flight for a configured worker count.
/// 0 and 1 both mean sequential; larger values are capped by the CPU count.
pub fn effective_workers(requested: usize) -> usize {
    requested.min(available_cpus()).clamp(1, MAX_WORKERS)
}

/// Bounded pool of tokenization slots. Owned by a single scan; nothing is process-global.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

pub struct WorkerPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl WorkerPool {
    pub fn new(requested: usize) -> Self {
        let limit = effective_workers(requested);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn acquire(&self) -> WorkerPermit {
        // The semaphore is never closed; acquire failures are not expected.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("worker pool semaphore closed"));
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(now, Ordering::Relaxed);
        WorkerPermit {
            permit,
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn snapshot(&self) -> WorkerPoolSnapshot {
        WorkerPoolSnapshot {
            limit: self.limit,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
        }
    }
}
