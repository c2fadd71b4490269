//! Pending evictions of `Down` nodes.
//!
//! All timers live in a single [`DelayQueue`] driven by one task, instead of
//! one sleeping task per node.

use std::collections::HashMap;
use std::future::poll_fn;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    queue: DelayQueue<Uuid>,
    keys: HashMap<Uuid, Key>,
    idle_waker: Option<Waker>,
}

/// Table of armed eviction timers keyed by node id.
#[derive(Default)]
pub struct EvictionTimers {
    inner: Mutex<Inner>,
}

impl EvictionTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer for `id` firing after `after`, replacing any timer
    /// already armed for it.
    pub fn arm(&self, id: Uuid, after: Duration) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.keys.remove(&id) {
            inner.queue.try_remove(&old);
        }
        let key = inner.queue.insert(id, after);
        inner.keys.insert(id, key);
        if let Some(waker) = inner.idle_waker.take() {
            waker.wake();
        }
    }

    /// Cancels the timer for `id`. Returns whether one was armed.
    pub fn disarm(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        match inner.keys.remove(&id) {
            Some(key) => {
                inner.queue.try_remove(&key);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_armed(&self, id: Uuid) -> bool {
        self.inner.lock().keys.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every armed timer.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.keys.clear();
    }

    /// Waits for the next timer to fire and returns its node id. The timer is
    /// no longer armed once returned.
    pub async fn next_expired(&self) -> Uuid {
        poll_fn(|cx| self.poll_expired(cx)).await
    }

    fn poll_expired(&self, cx: &mut Context<'_>) -> Poll<Uuid> {
        let mut inner = self.inner.lock();
        match inner.queue.poll_expired(cx) {
            Poll::Ready(Some(expired)) => {
                let id = expired.into_inner();
                inner.keys.remove(&id);
                Poll::Ready(id)
            }
            Poll::Ready(None) => {
                inner.idle_waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
