//! Evaluation cache and batching pipeline.
//!
//! `evaluate` answers from the cache while an entry is fresh. A miss queues a
//! request with a oneshot responder and waits. A timer task ticks every
//! `drain_interval` and starts a drain cycle if none is running; a cycle takes
//! up to `batch_size` requests, re-checks the cache for each one (an earlier
//! request in the same cycle may have filled it) and calls the evaluator for
//! the rest, one at a time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use arena_core::fen::normalize_fen;

use crate::error::EvalError;
use crate::scoring::{Evaluation, PositionEvaluator};

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// How long an evaluation stays valid
    pub ttl: Duration,
    /// Timer period for drain attempts
    pub drain_interval: Duration,
    /// Requests taken per drain cycle
    pub batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            drain_interval: Duration::from_millis(100),
            batch_size: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub external_calls: u64,
    pub failures: u64,
    pub cycles: u64,
}

/// Written once, replaced wholesale on refresh.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Evaluation,
    expires_at: Instant,
}

type Responder = oneshot::Sender<Result<Evaluation, EvalError>>;

struct BatchRequest {
    key: String,
    fen: String,
    responder: Responder,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<BatchRequest>,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    external_calls: AtomicU64,
    failures: AtomicU64,
    cycles: AtomicU64,
}

struct Shared {
    evaluator: Arc<dyn PositionEvaluator>,
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    queue: Mutex<Queue>,
    /// Held for the whole of a drain cycle.
    drain_lock: tokio::sync::Mutex<()>,
    counters: Counters,
}

/// Handle to a running pipeline. Clones share the same cache, queue and timer.
#[derive(Clone)]
pub struct EvaluationCache {
    shared: Arc<Shared>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EvaluationCache {
    /// Build the pipeline and spawn its drain timer. Must be called inside a
    /// tokio runtime.
    pub fn start(evaluator: Arc<dyn PositionEvaluator>, config: CacheConfig) -> Self {
        let shared = Arc::new(Shared {
            evaluator,
            config,
            entries: Mutex::new(HashMap::new()),
            queue: Mutex::new(Queue::default()),
            drain_lock: tokio::sync::Mutex::new(()),
            counters: Counters::default(),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let timer = tokio::spawn(run_timer(shared.clone(), shutdown_rx));

        Self {
            shared,
            shutdown_tx: Arc::new(shutdown_tx),
            timer: Arc::new(Mutex::new(Some(timer))),
        }
    }

    /// Evaluation for `fen`, from the cache when fresh.
    pub async fn evaluate(&self, fen: &str) -> Result<Evaluation, EvalError> {
        let key = normalize_fen(fen);
        if let Some(value) = self.shared.lookup(&key) {
            self.shared.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.shared.counters.misses.fetch_add(1, Ordering::Relaxed);

        let (responder, rx) = oneshot::channel();
        {
            let mut queue = lock(&self.shared.queue);
            if queue.closed {
                return Err(EvalError::Shutdown);
            }
            queue.pending.push_back(BatchRequest {
                key,
                fen: fen.to_string(),
                responder,
            });
        }

        rx.await.unwrap_or(Err(EvalError::Abandoned))
    }

    /// Fresh cached value without queueing anything.
    pub fn peek(&self, fen: &str) -> Option<Evaluation> {
        self.shared.lookup(&normalize_fen(fen))
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.shared.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            external_calls: c.external_calls.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            cycles: c.cycles.load(Ordering::Relaxed),
        }
    }

    /// Requests waiting for a drain cycle.
    pub fn pending(&self) -> usize {
        lock(&self.shared.queue).pending.len()
    }

    /// Run a drain cycle now unless one is already running. Returns whether a
    /// cycle ran.
    pub async fn drain_now(&self) -> bool {
        self.shared.try_drain().await
    }

    /// Stop the timer, let an in-flight cycle finish, and fail everything
    /// still queued. Later misses fail with `EvalError::Shutdown`.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let stranded: Vec<BatchRequest> = {
            let mut queue = lock(&self.shared.queue);
            queue.closed = true;
            queue.pending.drain(..).collect()
        };

        // Wait out a cycle that already dequeued its requests.
        let _guard = self.shared.drain_lock.lock().await;

        let count = stranded.len();
        for request in stranded {
            let _ = request.responder.send(Err(EvalError::Shutdown));
        }

        let timer = lock(&self.timer).take();
        if let Some(timer) = timer {
            let _ = timer.await;
        }
        info!(failed_pending = count, "Evaluation pipeline shut down");
    }
}

impl Shared {
    /// Fresh entry for `key`. An expired entry is removed and reported absent.
    fn lookup(&self, key: &str) -> Option<Evaluation> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, value: Evaluation) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.config.ttl,
        };
        lock(&self.entries).insert(key, entry);
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        lock(&self.entries).retain(|_, entry| entry.expires_at > now);
    }

    fn has_pending(&self) -> bool {
        !lock(&self.queue).pending.is_empty()
    }

    async fn try_drain(&self) -> bool {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            return false;
        };
        self.drain_cycle().await;
        true
    }

    async fn drain_cycle(&self) {
        let batch: Vec<BatchRequest> = {
            let mut queue = lock(&self.queue);
            let n = self.config.batch_size.min(queue.pending.len());
            queue.pending.drain(..n).collect()
        };
        if batch.is_empty() {
            return;
        }

        let size = batch.len();
        let mut calls = 0;
        for request in batch {
            if let Some(value) = self.lookup(&request.key) {
                let _ = request.responder.send(Ok(value));
                continue;
            }

            calls += 1;
            self.counters.external_calls.fetch_add(1, Ordering::Relaxed);
            let result = self.evaluator.evaluate(&request.fen).await;
            match &result {
                Ok(value) => self.store(request.key, value.clone()),
                Err(e) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(fen = %request.fen, error = %e, "Position evaluation failed");
                }
            }
            let _ = request.responder.send(result);
        }

        self.purge_expired();
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);
        debug!(batch = size, calls, "Drain cycle complete");
    }
}

async fn run_timer(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.config.drain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if shared.has_pending() {
                    // Overlapping ticks fall through try_lock as no-ops.
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        shared.try_drain().await;
                    });
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
