//! Release timer registry.
//!
//! One pending timer per participant. Each scheduled timer gets a fresh
//! generation number; a firing timer must claim its own generation before
//! acting, so a timer that was superseded or cancelled can never release a
//! participant that has since been re-frozen.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::domain::ParticipantKey;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Registry of release timers keyed by participant.
#[derive(Default)]
pub struct ReleaseTimers {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_generation: u64,
    pending: HashMap<ParticipantKey, Pending>,
}

impl ReleaseTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire(generation)` after `delay`, replacing any pending timer
    /// for `key`. Returns the generation assigned.
    pub fn schedule<F, Fut>(&self, key: ParticipantKey, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;
        // Spawned while holding the lock so the task cannot claim before it is registered.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation).await;
        });
        if let Some(previous) = inner.pending.insert(key, Pending { generation, handle }) {
            previous.handle.abort();
        }
        generation
    }

    /// Claim the pending timer of `key` if it still has `generation`.
    ///
    /// Called by the firing task itself; the entry is removed without aborting.
    pub fn claim(&self, key: &ParticipantKey, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.pending.get(key) {
            Some(p) if p.generation == generation => {
                inner.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Abort the pending timer of `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &ParticipantKey) -> bool {
        match self.inner.lock().pending.remove(key) {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every pending timer. Returns how many were pending.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.pending.len();
        for (_, p) in inner.pending.drain() {
            p.handle.abort();
        }
        count
    }

    #[must_use]
    pub fn is_pending(&self, key: &ParticipantKey) -> bool {
        self.inner.lock().pending.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn key() -> ParticipantKey {
        ParticipantKey::new("g", "a")
    }

    fn firing(
        timers: &Arc<ReleaseTimers>,
        fired: &Arc<AtomicUsize>,
    ) -> impl FnOnce(u64) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static
    {
        let timers = Arc::clone(timers);
        let fired = Arc::clone(fired);
        move |generation| {
            Box::pin(async move {
                if timers.claim(&key(), generation) {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_delay() {
        let timers = Arc::new(ReleaseTimers::new());
        let fired = Arc::new(AtomicUsize::new(0));
        timers.schedule(key(), Duration::from_secs(10), firing(&timers, &fired));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = Arc::new(ReleaseTimers::new());
        let fired = Arc::new(AtomicUsize::new(0));
        timers.schedule(key(), Duration::from_secs(10), firing(&timers, &fired));
        assert!(timers.cancel(&key()));
        assert!(!timers.cancel(&key()));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_supersedes_previous_generation() {
        let timers = Arc::new(ReleaseTimers::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let first = timers.schedule(key(), Duration::from_secs(5), firing(&timers, &fired));
        let second = timers.schedule(key(), Duration::from_secs(30), firing(&timers, &fired));
        assert!(second > first);
        assert!(!timers.claim(&key(), first));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
