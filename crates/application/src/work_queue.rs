//! Deduplicated FIFO work queue with per-key exponential backoff.
//!
//! The queue guarantees at most one in-flight reconcile per tenant at any
//! instant: an `add` for a key currently being processed coalesces into a
//! dirty mark and re-enqueues on `done`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use landlord_core::TenantId;
use tokio::sync::Notify;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(300);

/// Concurrent deduplicated FIFO keyed by tenant id.
#[derive(Clone)]
pub struct RateLimitedQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<TenantId>,
    queued: HashSet<TenantId>,
    processing: HashSet<TenantId>,
    dirty: HashSet<TenantId>,
    retries: HashMap<TenantId, u32>,
    shutting_down: bool,
}

impl Default for RateLimitedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitedQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Enqueues a key unless it is already queued; keys currently being
    /// processed are marked dirty and re-enqueued on [`Self::done`].
    pub fn add(&self, key: TenantId) {
        self.inner.add(key);
    }

    /// Schedules an `add` after this key's exponential backoff delay and
    /// bumps its retry counter.
    pub fn add_rate_limited(&self, key: TenantId) {
        let delay = {
            let mut state = self.inner.lock_state();
            if state.shutting_down {
                return;
            }
            let attempt = state.retries.entry(key).or_insert(0);
            *attempt += 1;
            backoff_delay(*attempt)
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.add(key);
        });
    }

    /// Waits for the next ready key, marking it as processing.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<TenantId> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.lock_state();
                if let Some(key) = state.ready.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key);
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Releases a key after processing; re-enqueues immediately when the key
    /// was marked dirty in the meantime.
    pub fn done(&self, key: TenantId) {
        let mut state = self.inner.lock_state();
        state.processing.remove(&key);
        if state.dirty.remove(&key) && !state.shutting_down && state.queued.insert(key) {
            state.ready.push_back(key);
            drop(state);
            self.inner.notify.notify_waiters();
        }
    }

    /// Resets the retry counter for a key after a successful reconcile.
    pub fn forget(&self, key: TenantId) {
        self.inner.lock_state().retries.remove(&key);
    }

    /// Returns the number of rate-limited retries recorded for a key.
    #[must_use]
    pub fn retries(&self, key: TenantId) -> u32 {
        self.inner
            .lock_state()
            .retries
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of keys ready for processing.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock_state().ready.len()
    }

    /// Returns whether no keys are ready.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops accepting work and wakes every blocked [`Self::get`] caller.
    pub fn shut_down(&self) {
        self.inner.lock_state().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Returns whether [`Self::shut_down`] has been called.
    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.inner.lock_state().shutting_down
    }
}

impl QueueInner {
    fn add(&self, key: TenantId) {
        let mut state = self.lock_state();
        if state.shutting_down {
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key) {
            state.ready.push_back(key);
            drop(state);
            self.notify.notify_waiters();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        // Recover from poisoning: the guarded collections stay
        // structurally sound if a holder panics.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Returns the delay before retry attempt `attempt` (1-based):
/// `min(2^(attempt-1) * 1s, 5m)`.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = BASE_DELAY.saturating_mul(1_u32 << exponent);
    delay.min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use landlord_core::TenantId;

    use super::{RateLimitedQueue, backoff_delay};

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(9), Duration::from_secs(256));
        assert_eq!(backoff_delay(10), Duration::from_secs(300));
        assert_eq!(backoff_delay(30), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn duplicate_adds_coalesce() {
        let queue = RateLimitedQueue::new();
        let key = TenantId::new();

        queue.add(key);
        queue.add(key);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.get().await, Some(key));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn add_during_processing_requeues_on_done() {
        let queue = RateLimitedQueue::new();
        let key = TenantId::new();

        queue.add(key);
        assert_eq!(queue.get().await, Some(key));

        // Key is in flight: a new add must not surface a second copy.
        queue.add(key);
        assert_eq!(queue.len(), 0);

        queue.done(key);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(key));
    }

    #[tokio::test]
    async fn done_without_dirty_does_not_requeue() {
        let queue = RateLimitedQueue::new();
        let key = TenantId::new();

        queue.add(key);
        assert_eq!(queue.get().await, Some(key));
        queue.done(key);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_adds_become_ready_after_their_delay() {
        let queue = RateLimitedQueue::new();
        let key = TenantId::new();

        queue.add_rate_limited(key);
        assert_eq!(queue.retries(key), 1);
        assert_eq!(queue.len(), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.get().await, Some(key));
        queue.done(key);

        // Second retry waits twice as long.
        queue.add_rate_limited(key);
        assert_eq!(queue.retries(key), 2);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(queue.len(), 0);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn forget_resets_the_retry_counter() {
        let queue = RateLimitedQueue::new();
        let key = TenantId::new();

        queue.add_rate_limited(key);
        queue.add_rate_limited(key);
        assert_eq!(queue.retries(key), 2);

        queue.forget(key);
        assert_eq!(queue.retries(key), 0);
    }

    #[tokio::test]
    async fn shutdown_unblocks_waiting_getters() {
        let queue = RateLimitedQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        queue.shut_down();
        let result = waiter.await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap_or(Some(TenantId::new())), None);
        assert!(queue.shutting_down());
    }

    #[tokio::test]
    async fn shutdown_drains_ready_items_first() {
        let queue = RateLimitedQueue::new();
        let key = TenantId::new();

        queue.add(key);
        queue.shut_down();

        assert_eq!(queue.get().await, Some(key));
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn adds_after_shutdown_are_ignored() {
        let queue = RateLimitedQueue::new();
        queue.shut_down();
        queue.add(TenantId::new());
        assert_eq!(queue.len(), 0);
    }
}
