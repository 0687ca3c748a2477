//! Budget-bounded market sweep
//!
//! Refreshes a large candidate set through the cache without exceeding a
//! fixed budget: a worker ceiling, an item cap, a wall-clock deadline, and a
//! throttling pause between batches. Coverage is best-effort; the budget is
//! not.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;

use crate::config::ScanConfig;
use crate::error::{ApiError, Error, Result};

pub mod source;

pub use source::{CandidateSource, MarketTypeSource};

/// Immutable budget snapshot for one scan run
#[derive(Debug, Clone)]
pub struct ScanBudget {
    pub worker_count: usize,
    pub item_cap: usize,
    pub time_budget: Duration,
    pub batch_size: usize,
    pub inter_batch_pause: Duration,
    pub request_timeout: Duration,
}

impl From<&ScanConfig> for ScanBudget {
    fn from(config: &ScanConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            item_cap: config.item_cap,
            time_budget: config.time_budget(),
            batch_size: config.batch_size.max(1),
            inter_batch_pause: config.inter_batch_pause(),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Outcome of one scan run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanTally {
    /// Items handed to a worker
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items enumerated but dropped when the budget ran out
    pub skipped: usize,
    /// Batches dispatched
    pub batches: usize,
}

impl std::fmt::Display for ScanTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attempted {}, succeeded {}, failed {}, skipped {} ({} batches)",
            self.attempted, self.succeeded, self.failed, self.skipped, self.batches
        )
    }
}

type ItemFuture = Pin<Box<dyn Future<Output = (i64, Result<()>)> + Send>>;

/// Sweep candidates from `source` under `budget`, refreshing each through
/// `fetch_item`.
///
/// Per-item failures are tallied and logged, never fatal. The deadline and
/// item cap are checked between batches and cut the run off hard: remaining
/// enumerated candidates are counted as skipped and enumeration stops. Batch
/// N+1 never starts before batch N's workers have all finished.
pub async fn run_bounded_scan<S, F, Fut>(
    budget: &ScanBudget,
    source: &mut S,
    fetch_item: F,
) -> Result<ScanTally>
where
    S: CandidateSource + ?Sized,
    F: Fn(i64) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let deadline = Instant::now() + budget.time_budget;
    let mut tally = ScanTally::default();
    let mut buffer: VecDeque<i64> = VecDeque::new();
    let mut exhausted = false;
    let mut pending_backoff = Duration::ZERO;

    loop {
        // Hard cutoff between batches: once the budget is spent we stop
        // enumerating, not just processing.
        if Instant::now() >= deadline || tally.attempted >= budget.item_cap {
            tally.skipped += buffer.len();
            if !buffer.is_empty() || !exhausted {
                log::info!("Scan budget exhausted after {} batches", tally.batches);
            }
            break;
        }

        // Top the buffer up lazily, one source page at a time
        while buffer.len() < budget.batch_size && !exhausted {
            match source.next_page().await? {
                Some(page) => buffer.extend(page),
                None => exhausted = true,
            }
        }

        if buffer.is_empty() {
            break;
        }

        // Pause between batches, not before the first one; a rate-limited
        // previous batch stretches it to the server's retry-after hint.
        if tally.batches > 0 {
            tokio::time::sleep(budget.inter_batch_pause.max(pending_backoff)).await;
        }

        let take = budget.batch_size.min(budget.item_cap - tally.attempted);
        let batch: Vec<i64> = buffer.drain(..take.min(buffer.len())).collect();

        pending_backoff = run_batch(budget, batch, &fetch_item, &mut tally).await;
        tally.batches += 1;
    }

    log::info!("Scan finished: {}", tally);
    Ok(tally)
}

/// Fan one batch out over at most `worker_count` concurrent fetches and
/// collect the results. One item's failure or timeout never cancels its
/// siblings. Returns the backoff demanded by the worst rate-limit response
/// in the batch, if any.
async fn run_batch<F, Fut>(
    budget: &ScanBudget,
    batch: Vec<i64>,
    fetch_item: &F,
    tally: &mut ScanTally,
) -> Duration
where
    F: Fn(i64) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut backoff = Duration::ZERO;
    let request_timeout = budget.request_timeout;
    let mut pending = batch.into_iter();
    let mut in_flight: FuturesUnordered<ItemFuture> = FuturesUnordered::new();

    let make_future = |item: i64, f: &F| -> ItemFuture {
        let fut = f(item);
        Box::pin(async move {
            let result = match tokio::time::timeout(request_timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::Api(ApiError::Network(format!(
                    "Fetch for item {} exceeded {:?}",
                    item, request_timeout
                )))),
            };
            (item, result)
        })
    };

    for item in pending.by_ref().take(budget.worker_count) {
        in_flight.push(make_future(item, fetch_item));
    }

    while let Some((item, result)) = in_flight.next().await {
        tally.attempted += 1;
        match result {
            Ok(()) => tally.succeeded += 1,
            Err(e) => {
                tally.failed += 1;
                if let Error::Api(ApiError::RateLimited { retry_after }) = &e {
                    // Feed the server's hint into the next inter-batch pause
                    backoff = backoff.max(*retry_after);
                }
                log::warn!("Scan item {} failed: {}", item, e);
            }
        }

        if let Some(next) = pending.next() {
            in_flight.push(make_future(next, fetch_item));
        }
    }

    backoff
}

/// Run a scan as a detached background task.
///
/// The task's lifetime is independent of the caller's readiness; it stops
/// early when `shutdown` flips to true.
pub fn spawn_background<S, F, Fut>(
    budget: ScanBudget,
    mut source: S,
    fetch_item: F,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()>
where
    S: CandidateSource + 'static,
    F: Fn(i64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            result = run_bounded_scan(&budget, &mut source, fetch_item) => {
                match result {
                    Ok(tally) => log::info!("Background scan done: {}", tally),
                    Err(e) => log::error!("Background scan aborted: {}", e),
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => {
                log::info!("Background scan cancelled by shutdown");
            }
        }
    })
}
