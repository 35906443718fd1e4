use crate::domain::errors::PredictionError;
use crate::domain::types::{FEATURE_SCHEMA_VERSION, Prediction};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Cache key: the full identity of a prediction request. The schema version
/// is part of the key so a feature redefinition can never serve stale
/// entries computed under the old schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub home: String,
    pub away: String,
    pub date: NaiveDate,
    pub schema_version: u32,
}

impl Fingerprint {
    pub fn new(home: &str, away: &str, date: NaiveDate) -> Self {
        Self {
            home: home.to_string(),
            away: away.to_string(),
            date,
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

type FlightResult = Option<Result<Arc<Prediction>, PredictionError>>;

struct CachedEntry {
    prediction: Arc<Prediction>,
    expires_at: Instant,
    last_used: u64,
}

enum Slot {
    Ready(CachedEntry),
    InFlight(watch::Receiver<FlightResult>),
}

struct CacheInner {
    entries: HashMap<Fingerprint, Slot>,
    /// Monotonic access counter for least-recently-used eviction.
    tick: u64,
    /// Bumped on every invalidation. A flight started under an older
    /// generation must not install its result.
    generation: u64,
}

/// TTL + LRU prediction cache with single-flight request coalescing.
///
/// Concurrent requests for the same fingerprint share one computation: the
/// first caller becomes the leader and the rest subscribe to its result.
/// The computation runs on a spawned task, so a leader that disconnects
/// mid-flight does not abandon the waiters behind it. Errors are returned
/// to every waiter of that flight but never cached.
pub struct PredictionCache {
    inner: Arc<Mutex<CacheInner>>,
    ttl: Duration,
    capacity: usize,
}

impl PredictionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
                generation: 0,
            })),
            ttl,
            capacity,
        }
    }

    pub async fn get_or_compute<F>(
        &self,
        key: Fingerprint,
        compute: F,
    ) -> Result<Arc<Prediction>, PredictionError>
    where
        F: Future<Output = Result<Prediction, PredictionError>> + Send + 'static,
    {
        enum Lookup {
            Fresh(Arc<Prediction>),
            Follow(watch::Receiver<FlightResult>),
            Miss,
        }

        let mut rx = {
            let mut inner = self.inner.lock().await;

            let lookup = match inner.entries.get(&key) {
                Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                    Lookup::Fresh(entry.prediction.clone())
                }
                Some(Slot::InFlight(rx)) => Lookup::Follow(rx.clone()),
                _ => Lookup::Miss,
            };

            match lookup {
                Lookup::Fresh(prediction) => {
                    let tick = inner.tick;
                    inner.tick += 1;
                    if let Some(Slot::Ready(entry)) = inner.entries.get_mut(&key) {
                        entry.last_used = tick;
                    }
                    return Ok(prediction);
                }
                Lookup::Follow(rx) => rx,
                Lookup::Miss => {
                    let (tx, rx) = watch::channel(None);
                    let started_in = inner.generation;
                    inner.entries.insert(key.clone(), Slot::InFlight(rx.clone()));
                    self.evict_if_full(&mut inner);

                    let shared = self.inner.clone();
                    let ttl = self.ttl;
                    let flight_key = key.clone();
                    // The flight outlives its leader. Cancellation of any
                    // individual caller must not cancel the shared work.
                    tokio::spawn(async move {
                        let result = compute.await.map(Arc::new);
                        let mut inner = shared.lock().await;
                        if inner.generation == started_in {
                            match &result {
                                Ok(prediction) => {
                                    let tick = inner.tick;
                                    inner.tick += 1;
                                    inner.entries.insert(
                                        flight_key,
                                        Slot::Ready(CachedEntry {
                                            prediction: prediction.clone(),
                                            expires_at: Instant::now() + ttl,
                                            last_used: tick,
                                        }),
                                    );
                                }
                                Err(_) => {
                                    inner.entries.remove(&flight_key);
                                }
                            }
                        } else {
                            debug!("discarding flight result from invalidated generation");
                        }
                        drop(inner);
                        let _ = tx.send(Some(result));
                    });
                    rx
                }
            }
        };

        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // Flight task dropped its sender without producing a value.
                return Err(PredictionError::Cancelled);
            }
        }
    }

    /// Drops every entry and abandons in-flight installs. Called after a
    /// model swap so no prediction from a superseded version survives.
    pub async fn invalidate_all(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.generation += 1;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Evicts the least-recently-used ready entry when over capacity.
    /// In-flight slots are never evicted; waiters hold receivers into them.
    fn evict_if_full(&self, inner: &mut CacheInner) {
        while inner.entries.len() > self.capacity {
            let victim = inner
                .entries
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready(entry) => Some((entry.last_used, key.clone())),
                    Slot::InFlight(_) => None,
                })
                .min_by_key(|(last_used, _)| *last_used);
            match victim {
                Some((_, key)) => {
                    inner.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Outcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn prediction() -> Prediction {
        Prediction {
            reference: Uuid::new_v4(),
            outcome: Outcome::Home,
            probabilities: [0.2, 0.3, 0.5],
            confidence: 0.5,
            model_version: 1,
            computed_at: chrono::Utc::now(),
        }
    }

    fn key(home: &str) -> Fingerprint {
        Fingerprint::new(home, "Away", NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_returns_the_cached_prediction() {
        let cache = PredictionCache::new(Duration::from_secs(3600), 16);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let first = cache
            .get_or_compute(key("A"), async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(prediction())
            })
            .await
            .unwrap();

        let c = calls.clone();
        let second = cache
            .get_or_compute(key("A"), async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(prediction())
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.reference, second.reference);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_recomputed() {
        let cache = PredictionCache::new(Duration::from_secs(10), 16);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let c = calls.clone();
            cache
                .get_or_compute(key("A"), async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(prediction())
                })
                .await
                .unwrap();
            tokio::time::advance(Duration::from_secs(11)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_identical_requests_share_one_computation() {
        let cache = Arc::new(PredictionCache::new(Duration::from_secs(3600), 16));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let c = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key("A"), async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(prediction())
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut references = Vec::new();
        for handle in handles {
            references.push(handle.await.unwrap().reference);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(references.iter().all(|r| *r == references[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_returned_but_never_cached() {
        let cache = PredictionCache::new(Duration::from_secs(3600), 16);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let err = cache
            .get_or_compute(key("A"), async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(PredictionError::ContextFetch {
                    reason: "store down".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::ContextFetch { .. }));
        assert_eq!(cache.len().await, 0);

        let c = calls.clone();
        cache
            .get_or_compute(key("A"), async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(prediction())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_discards_results_from_older_flights() {
        let cache = Arc::new(PredictionCache::new(Duration::from_secs(3600), 16));

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(key("A"), async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(prediction())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        cache.invalidate_all().await;

        // The waiter still gets its answer, but nothing is installed.
        assert!(slow.await.unwrap().is_ok());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_the_least_recently_used_entry() {
        let cache = PredictionCache::new(Duration::from_secs(3600), 2);

        for home in ["A", "B"] {
            cache
                .get_or_compute(key(home), async move { Ok(prediction()) })
                .await
                .unwrap();
        }
        // Touch A so B becomes the eviction victim.
        cache
            .get_or_compute(key("A"), async move { Ok(prediction()) })
            .await
            .unwrap();
        cache
            .get_or_compute(key("C"), async move { Ok(prediction()) })
            .await
            .unwrap();

        assert_eq!(cache.len().await, 2);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        cache
            .get_or_compute(key("A"), async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(prediction())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
