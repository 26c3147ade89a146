use std::collections::hash_map::Entry;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::Scheduler;
use crate::error::{AppError, Result};

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;

struct InFlight<V> {
    generation: u64,
    load: SharedLoad<V>,
}

type Registry<K, V> = Arc<Mutex<FxHashMap<K, InFlight<V>>>>;

/// Runs a closure once, when dropped
struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Deduplicates concurrent loads of the same key
///
/// The first caller for a key spawns the loader; everyone arriving while it
/// runs, and for `window` after it finished, awaits that same result. The
/// loader runs as its own task, so a caller going away does not cancel the
/// load the others are waiting on.
pub struct Coalescer<K, V> {
    registry: Registry<K, V>,
    window: Duration,
    scheduler: Scheduler,
    generations: AtomicU64,
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration, scheduler: Scheduler) -> Self {
        Self {
            registry: Arc::new(Mutex::new(FxHashMap::default())),
            window,
            scheduler,
            generations: AtomicU64::new(0),
        }
    }

    /// Run `loader` unless a load for `key` is already in flight, and return
    /// the shared outcome
    ///
    /// `loader` runs outside the registry lock. When two callers race past
    /// the vacancy check, the second one to lock joins the first one's load
    /// and its own future is dropped unpolled.
    pub async fn load_once<F, Fut>(&self, key: K, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(load) = self.joinable(&key) {
            tracing::debug!("Joining in-flight load");
            return load.await;
        }

        let fut = loader();
        let load = {
            let mut registry = self.registry.lock();
            match registry.entry(key) {
                Entry::Occupied(entry) => entry.get().load.clone(),
                Entry::Vacant(entry) => {
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                    let load = self.spawn(entry.key().clone(), generation, fut);
                    entry.insert(InFlight {
                        generation,
                        load: load.clone(),
                    });
                    load
                }
            }
        };
        load.await
    }

    fn joinable(&self, key: &K) -> Option<SharedLoad<V>> {
        self.registry
            .lock()
            .get(key)
            .map(|in_flight| in_flight.load.clone())
    }

    /// Number of keys currently joinable
    pub fn in_flight(&self) -> usize {
        self.registry.lock().len()
    }

    // Called with the registry locked; the eviction task takes the same
    // lock, so it cannot run before the entry has been inserted.
    fn spawn<Fut>(&self, key: K, generation: u64, fut: Fut) -> SharedLoad<V>
    where
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        let scheduler = self.scheduler.clone();
        let window = self.window;

        let task = tokio::spawn(async move {
            // Dropped on every exit of the loader, unwinding included
            let _evict = OnDrop::new(move || {
                scheduler.defer(window, async move {
                    let mut registry = registry.lock();
                    // A newer generation may already own the key
                    if registry
                        .get(&key)
                        .is_some_and(|in_flight| in_flight.generation == generation)
                    {
                        registry.remove(&key);
                    }
                });
            });
            fut.await
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(AppError::LoadAborted(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn coalescer(window_ms: u64) -> Coalescer<i64, u64> {
        Coalescer::new(Duration::from_millis(window_ms), Scheduler::new())
    }

    async fn slow_load(calls: Arc<AtomicUsize>, value: u64) -> Result<u64> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(value)
    }

    async fn exploding_load() -> Result<u64> {
        panic!("loader blew up")
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let coalescer = Arc::new(coalescer(200));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..16 {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                coalescer
                    .load_once(7, move || slow_load(calls, i))
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_errors_are_replayed_to_every_waiter() {
        let coalescer = Arc::new(coalescer(200));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                coalescer
                    .load_once(1, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err::<u64, _>(AppError::VideoNotFound)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(AppError::VideoNotFound)
            ));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completed_load_is_reused_within_window() {
        let coalescer = coalescer(200);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = coalescer
            .load_once(3, {
                let calls = Arc::clone(&calls);
                move || slow_load(calls, 1)
            })
            .await
            .unwrap();
        let second = coalescer
            .load_once(3, {
                let calls = Arc::clone(&calls);
                move || slow_load(calls, 2)
            })
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_load_after_window_closes() {
        let coalescer = coalescer(40);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = coalescer
            .load_once(3, {
                let calls = Arc::clone(&calls);
                move || slow_load(calls, 1)
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(coalescer.in_flight(), 0);

        let second = coalescer
            .load_once(3, {
                let calls = Arc::clone(&calls);
                move || slow_load(calls, 2)
            })
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_keys_do_not_share_loads() {
        let coalescer = coalescer(200);
        let calls = Arc::new(AtomicUsize::new(0));

        let a = coalescer.load_once(1, {
            let calls = Arc::clone(&calls);
            move || slow_load(calls, 10)
        });
        let b = coalescer.load_once(2, {
            let calls = Arc::clone(&calls);
            move || slow_load(calls, 20)
        });
        let (a, b) = futures::join!(a, b);

        assert_eq!(a.unwrap(), 10);
        assert_eq!(b.unwrap(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_shared_load() {
        let coalescer = Arc::new(coalescer(200));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { coalescer.load_once(5, move || slow_load(calls, 9)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.abort();

        let value = coalescer
            .load_once(5, {
                let calls = Arc::clone(&calls);
                move || slow_load(calls, 0)
            })
            .await
            .unwrap();

        assert_eq!(value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_loader_does_not_pin_the_key() {
        let coalescer = coalescer(20);

        let first = coalescer.load_once(1, exploding_load).await;
        assert!(matches!(first, Err(AppError::LoadAborted(_))));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(coalescer.in_flight(), 0);

        let second = coalescer.load_once(1, || async { Ok::<u64, AppError>(7) }).await;
        assert_eq!(second.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_loader_closure_runs_outside_registry_lock() {
        let coalescer = Arc::new(coalescer(200));

        // A closure that reads the registry would deadlock if it ran under the lock
        let inner = Arc::clone(&coalescer);
        let value = coalescer
            .load_once(4, move || {
                let seen = inner.in_flight();
                async move { Ok::<u64, AppError>(seen as u64) }
            })
            .await
            .unwrap();

        assert_eq!(value, 0);
        assert_eq!(coalescer.in_flight(), 1);
    }
}
