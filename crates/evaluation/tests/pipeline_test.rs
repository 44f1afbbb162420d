//! Integration tests for the batching evaluation cache under concurrent load.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evaluation::{CacheConfig, EvalError, Evaluation, EvaluationCache, PositionEvaluator};
use futures::future::join_all;

/// Scores every position 0.25 after `delay`. Positions starting with "bad"
/// fail. Tracks calls and peak concurrency.
struct SlowEvaluator {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowEvaluator {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionEvaluator for SlowEvaluator {
    async fn evaluate(&self, fen: &str) -> Result<Evaluation, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if fen.starts_with("bad") {
            return Err(EvalError::Service(format!("cannot score {fen}")));
        }
        Ok(Evaluation {
            score: 0.25,
            mate: None,
            best_move: None,
        })
    }
}

fn position(i: usize) -> String {
    format!("8/8/8/8/8/8/{i}/K1k5 w - - 0 1")
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_on_same_key_call_once() {
    let evaluator = SlowEvaluator::new(Duration::from_millis(50));
    let cache = EvaluationCache::start(evaluator.clone(), CacheConfig::default());

    let lookups = (0..37).map(|i| {
        let cache = cache.clone();
        async move { cache.evaluate(&position(i % 4)).await }
    });
    let results = join_all(lookups).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(evaluator.calls(), 4);
    let stats = cache.stats();
    assert_eq!(stats.external_calls, 4);
    assert_eq!(stats.hits + stats.misses, 37);

    cache.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_fetched_again() {
    let evaluator = SlowEvaluator::new(Duration::ZERO);
    let config = CacheConfig {
        ttl: Duration::from_secs(60),
        ..CacheConfig::default()
    };
    let cache = EvaluationCache::start(evaluator.clone(), config);

    cache.evaluate(&position(1)).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(cache.peek(&position(1)).is_some());
    cache.evaluate(&position(1)).await.unwrap();
    assert_eq!(evaluator.calls(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(cache.peek(&position(1)).is_none());
    cache.evaluate(&position(1)).await.unwrap();
    assert_eq!(evaluator.calls(), 2);

    cache.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_external_calls_never_overlap() {
    let evaluator = SlowEvaluator::new(Duration::from_millis(300));
    let config = CacheConfig {
        drain_interval: Duration::from_millis(10),
        ..CacheConfig::default()
    };
    let cache = EvaluationCache::start(evaluator.clone(), config);

    let lookups = (0..25).map(|i| {
        let cache = cache.clone();
        async move { cache.evaluate(&position(i)).await }
    });
    let results = join_all(lookups).await;

    assert_eq!(results.len(), 25);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(evaluator.calls(), 25);
    assert_eq!(evaluator.peak.load(Ordering::SeqCst), 1);
    // At most ten requests per cycle
    assert!(cache.stats().cycles >= 3);

    cache.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_affect_other_requests() {
    let evaluator = SlowEvaluator::new(Duration::ZERO);
    let cache = EvaluationCache::start(evaluator.clone(), CacheConfig::default());

    let good_key = position(2);
    let (bad, good) = tokio::join!(
        cache.evaluate("bad position w - -"),
        cache.evaluate(&good_key)
    );
    assert!(matches!(bad, Err(EvalError::Service(_))));
    assert_eq!(good.unwrap().score, 0.25);

    // A later lookup of the failed key goes back to the service
    assert!(cache.evaluate("bad position w - -").await.is_err());
    assert_eq!(evaluator.calls(), 3);
    assert_eq!(cache.stats().failures, 2);

    cache.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_finishes_cycle_and_fails_queue() {
    let evaluator = SlowEvaluator::new(Duration::from_secs(1));
    let cache = EvaluationCache::start(evaluator.clone(), CacheConfig::default());

    let waiters: Vec<_> = (0..15)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.evaluate(&position(i)).await })
        })
        .collect();

    // Past the first tick with pending work: one cycle holds ten requests.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.pending(), 5);

    cache.shutdown().await;

    let mut served = 0;
    let mut refused = 0;
    for waiter in waiters {
        match waiter.await.unwrap() {
            Ok(_) => served += 1,
            Err(EvalError::Shutdown) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(served, 10);
    assert_eq!(refused, 5);
    assert_eq!(evaluator.calls(), 10);
    assert_eq!(cache.evaluate(&position(99)).await, Err(EvalError::Shutdown));
    // Served entries stay readable after shutdown
    assert!(cache.peek(&position(0)).is_some());
}
