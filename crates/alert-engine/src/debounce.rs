//! Keyed debouncing of repeated triggers.
//!
//! A [`Debouncer`] delays a callback and, when the same key is submitted
//! again before the delay elapses, cancels the earlier timer and keeps only
//! the latest payload. A burst therefore fires once, `after` the last
//! submission.
//!
//! The same mechanism drives one-shot timers such as alert auto-resolution:
//! submitting a key once and never again simply fires after the delay.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{AlertError, Result};

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Coalesces repeated submissions per key into a single delayed firing.
pub struct Debouncer<T> {
    pending: Arc<Mutex<HashMap<String, Pending>>>,
    next_generation: Arc<AtomicU64>,
    _payload: PhantomData<fn(T)>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Creates an empty debouncer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            _payload: PhantomData,
        }
    }

    /// Schedules `on_fire(payload)` to run `after` from now.
    ///
    /// A pending submission for the same key is cancelled and replaced.
    /// With a zero delay `on_fire` runs before this method returns.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Scheduler` if a delay is requested outside a tokio runtime.
    pub fn submit<F>(&self, key: impl Into<String>, payload: T, after: Duration, on_fire: F) -> Result<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let key = key.into();

        if after.is_zero() {
            self.cancel(&key);
            on_fire(payload);
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|e| AlertError::Scheduler {
            reason: format!("cannot schedule timer for '{key}': {e}"),
        })?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        // Held across spawn so the timer cannot observe the map before its entry exists.
        let mut map = self.pending.lock();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(after).await;

            {
                let mut map = pending.lock();
                match map.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&task_key);
                    }
                    _ => return,
                }
            }

            trace!(key = %task_key, "debounced timer fired");
            on_fire(payload);
        });

        if let Some(previous) = map.insert(key, Pending { generation, handle }) {
            previous.handle.abort();
        }

        Ok(())
    }

    /// Cancels the pending submission for `key` without firing it.
    ///
    /// Returns true if something was pending.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = self.pending.lock().remove(key);
        removed.is_some_and(|entry| {
            entry.handle.abort();
            true
        })
    }

    /// Cancels every pending submission without firing any of them.
    pub fn reset(&self) {
        let drained: Vec<Pending> = self.pending.lock().drain().map(|(_, p)| p).collect();
        for entry in drained {
            entry.handle.abort();
        }
    }

    /// Returns true if a submission for `key` is waiting to fire.
    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Returns the number of keys waiting to fire.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T: Send + 'static> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            next_generation: Arc::clone(&self.next_generation),
            _payload: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (Arc<Mutex<Vec<u32>>>, impl Fn() -> Box<dyn FnOnce(u32) + Send>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let make = move || {
            let sink = Arc::clone(&sink);
            Box::new(move |v: u32| sink.lock().push(v)) as Box<dyn FnOnce(u32) + Send>
        };
        (fired, make)
    }

    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
        tokio::task::yield_now().await;
    }

    #[test]
    fn zero_delay_fires_synchronously() {
        let debouncer = Debouncer::new();
        let (fired, on_fire) = collector();

        debouncer.submit("k", 7, Duration::ZERO, on_fire()).unwrap();

        assert_eq!(*fired.lock(), vec![7]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[test]
    fn delay_outside_runtime_fails() {
        let debouncer: Debouncer<u32> = Debouncer::new();
        let err = debouncer
            .submit("k", 1, Duration::from_millis(10), |_| {})
            .unwrap_err();
        assert!(matches!(err, AlertError::Scheduler { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let debouncer = Debouncer::new();
        let (fired, on_fire) = collector();

        debouncer.submit("k", 1, Duration::from_millis(1000), on_fire()).unwrap();
        assert!(debouncer.is_pending("k"));

        settle(Duration::from_millis(999)).await;
        assert!(fired.lock().is_empty());

        settle(Duration::from_millis(2)).await;
        assert_eq!(*fired.lock(), vec![1]);
        assert!(!debouncer.is_pending("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once_with_last_payload() {
        let debouncer = Debouncer::new();
        let (fired, on_fire) = collector();

        for payload in 1..=3 {
            debouncer.submit("k", payload, Duration::from_millis(1000), on_fire()).unwrap();
            settle(Duration::from_millis(100)).await;
        }
        assert_eq!(debouncer.pending_count(), 1);

        settle(Duration::from_millis(1000)).await;
        assert_eq!(*fired.lock(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let debouncer = Debouncer::new();
        let (fired, on_fire) = collector();

        debouncer.submit("a", 1, Duration::from_millis(100), on_fire()).unwrap();
        debouncer.submit("b", 2, Duration::from_millis(200), on_fire()).unwrap();

        settle(Duration::from_millis(300)).await;
        assert_eq!(*fired.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_without_firing() {
        let debouncer = Debouncer::new();
        let (fired, on_fire) = collector();

        debouncer.submit("a", 1, Duration::from_millis(100), on_fire()).unwrap();
        debouncer.submit("b", 2, Duration::from_millis(100), on_fire()).unwrap();
        debouncer.reset();

        settle(Duration::from_millis(500)).await;
        assert!(fired.lock().is_empty());
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_single_key() {
        let debouncer = Debouncer::new();
        let (fired, on_fire) = collector();

        debouncer.submit("a", 1, Duration::from_millis(100), on_fire()).unwrap();
        debouncer.submit("b", 2, Duration::from_millis(100), on_fire()).unwrap();
        assert!(debouncer.cancel("a"));
        assert!(!debouncer.cancel("missing"));

        settle(Duration::from_millis(200)).await;
        assert_eq!(*fired.lock(), vec![2]);
    }
}
