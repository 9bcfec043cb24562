//! Counting limit on concurrent executions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

struct Inner {
    running: AtomicUsize,
    max: usize,
    released: Notify,
}

/// Non-blocking test-and-increment counter. A [`SlotGuard`] gives the slot
/// back when dropped, on every path out of a run, and wakes the queue drain.
#[derive(Clone)]
pub struct RunningSlots {
    inner: Arc<Inner>,
}

impl RunningSlots {
    pub fn new(max: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicUsize::new(0),
                max: max.max(1),
                released: Notify::new(),
            }),
        }
    }

    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.inner
            .running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.inner.max).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                inner: Arc::clone(&self.inner),
            })
    }

    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.inner.max
    }

    /// Wake whoever waits in [`RunningSlots::released`].
    pub fn notify(&self) {
        self.inner.released.notify_one();
    }

    /// Resolves after a slot is released or [`RunningSlots::notify`] is called.
    pub async fn released(&self) {
        self.inner.released.notified().await;
    }
}

pub struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.running.fetch_sub(1, Ordering::AcqRel);
        self.inner.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_max() {
        let slots = RunningSlots::new(2);
        let a = slots.try_acquire().unwrap();
        let _b = slots.try_acquire().unwrap();
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.running(), 2);

        drop(a);
        assert_eq!(slots.running(), 1);
        assert!(slots.try_acquire().is_some());
    }

    #[test]
    fn zero_max_still_allows_one() {
        let slots = RunningSlots::new(0);
        assert_eq!(slots.max(), 1);
        assert!(slots.try_acquire().is_some());
    }

    #[tokio::test]
    async fn released_on_panic() {
        let slots = RunningSlots::new(1);
        let guard = slots.try_acquire().unwrap();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("run blew up");
        });
        assert!(handle.await.is_err());
        assert_eq!(slots.running(), 0);
    }

    #[tokio::test]
    async fn release_wakes_waiter() {
        let slots = RunningSlots::new(1);
        let guard = slots.try_acquire().unwrap();
        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.released().await })
        };
        drop(guard);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
