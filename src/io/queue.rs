use crate::command::CommandRef;
use crate::error::RecvError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Queue of shared commands consumed by an [`Executor`](crate::executor::Executor).
pub type CommandQueue = BlockingQueue<CommandRef>;

struct Inner<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

/// Unbounded FIFO queue with blocking, non-blocking and timed pops.
///
/// Cheaply clonable: every clone is a handle to the same queue. All state is
/// guarded by a single mutex paired with a single condvar, and every wait
/// re-checks its predicate under that mutex, so wakeups cannot be missed.
///
/// Shutdown is monotonic. After it, pushes are dropped and blocking pops
/// drain the remaining items before reporting [`RecvError::Closed`].
pub struct BlockingQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BlockingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("BlockingQueue")
            .field("len", &inner.items.len())
            .field("shutdown", &inner.shutdown)
            .finish()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    items: VecDeque::new(),
                    shutdown: false,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Append to the tail and wake one waiter.
    ///
    /// Returns `false` if the queue is shut down; the item is dropped.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.shutdown {
            drop(inner);
            crate::warn_throttled!(
                Duration::from_secs(5),
                "[Queue] push after shutdown dropped"
            );
            return false;
        }
        inner.items.push_back(item);
        drop(inner);
        self.shared.ready.notify_one();
        true
    }

    /// Block until an item is available or the queue is shut down and drained.
    #[inline]
    pub fn pop(&self) -> Result<T, RecvError> {
        self.pop_while(|| true)
    }

    /// Blocking pop that gives up with [`RecvError::Interrupted`] once `active`
    /// returns false.
    ///
    /// `active` is evaluated under the queue lock before any item is handed
    /// out. Whoever flips the condition must call [`wake_all`](Self::wake_all)
    /// afterwards so that parked waiters re-evaluate it.
    pub fn pop_while(&self, active: impl Fn() -> bool) -> Result<T, RecvError> {
        let mut inner = self.shared.inner.lock();
        loop {
            if !active() {
                return Err(RecvError::Interrupted);
            }
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if inner.shutdown {
                return Err(RecvError::Closed);
            }
            self.shared.ready.wait(&mut inner);
        }
    }

    /// Never blocks. `None` means nothing is queued, whatever the shutdown state.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.shared.inner.lock().items.pop_front()
    }

    /// Block for at most `timeout`.
    ///
    /// [`RecvError::Timeout`] means the queue stayed empty for the whole wait.
    /// A timeout too large to form a deadline waits like [`pop`](Self::pop).
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.pop();
        };
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if inner.shutdown {
                return Err(RecvError::Closed);
            }
            if self.shared.ready.wait_until(&mut inner, deadline).timed_out() {
                return match inner.items.pop_front() {
                    Some(item) => Ok(item),
                    None if inner.shutdown => Err(RecvError::Closed),
                    None => Err(RecvError::Timeout),
                };
            }
        }
    }

    /// Wake every waiter so it re-checks its predicate.
    pub fn wake_all(&self) {
        let _inner = self.shared.inner.lock();
        self.shared.ready.notify_all();
    }

    /// Mark the queue as shut down and wake every waiter. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.shutdown = true;
        drop(inner);
        self.shared.ready.notify_all();
        tracing::debug!("[Queue] shut down");
    }

    /// Discard every queued item and return how many were dropped.
    pub fn clear(&self) -> usize {
        let discarded = std::mem::take(&mut self.shared.inner.lock().items);
        discarded.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.inner.lock().items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().items.is_empty()
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.inner.lock().shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn pops_in_push_order() {
        let q = BlockingQueue::new();
        for i in 0..100 {
            assert!(q.push(i));
        }
        let mut seen = Vec::new();
        while let Some(v) = q.try_pop() {
            seen.push(v);
        }
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn order_is_kept_across_threads() {
        let q = BlockingQueue::new();
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..1_000 {
                    q.push(i);
                }
                q.shutdown();
            })
        };

        let mut seen = Vec::with_capacity(1_000);
        while let Ok(v) = q.pop() {
            seen.push(v);
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn pop_on_closed_empty_queue_returns_immediately() {
        let q = BlockingQueue::<u32>::new();
        q.shutdown();
        let start = Instant::now();
        assert_eq!(q.pop(), Err(RecvError::Closed));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn shutdown_drains_before_closing() {
        let q = BlockingQueue::new();
        q.push(1);
        q.push(2);
        q.shutdown();

        assert!(!q.push(3));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Ok(1));
        assert_eq!(q.pop(), Ok(2));
        assert_eq!(q.pop(), Err(RecvError::Closed));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let q = BlockingQueue::<u32>::new();
        q.shutdown();
        q.shutdown();
        assert!(q.is_shutdown());
    }

    #[test]
    fn try_pop_never_waits() {
        let q = BlockingQueue::<u32>::new();
        let start = Instant::now();
        assert_eq!(q.try_pop(), None);
        assert!(start.elapsed() < Duration::from_millis(50));

        q.shutdown();
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn blocked_pop_wakes_on_push() {
        let q = BlockingQueue::new();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.push(7);
        assert_eq!(consumer.join().unwrap(), Ok(7));
    }

    #[test]
    fn blocked_pop_wakes_on_shutdown() {
        let q = BlockingQueue::<u32>::new();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.shutdown();
        assert_eq!(consumer.join().unwrap(), Err(RecvError::Closed));
    }

    #[test]
    fn pop_timeout_reports_each_outcome() {
        let q = BlockingQueue::new();

        let start = Instant::now();
        assert_eq!(q.pop_timeout(Duration::from_millis(30)), Err(RecvError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(30));

        q.push(5);
        assert_eq!(q.pop_timeout(Duration::from_millis(30)), Ok(5));

        q.shutdown();
        assert_eq!(q.pop_timeout(Duration::from_secs(5)), Err(RecvError::Closed));
    }

    #[test]
    fn pop_timeout_accepts_unbounded_duration() {
        let q = BlockingQueue::new();
        q.push(9);
        assert_eq!(q.pop_timeout(Duration::MAX), Ok(9));

        q.shutdown();
        assert_eq!(q.pop_timeout(Duration::MAX), Err(RecvError::Closed));
    }

    #[test]
    fn pop_timeout_wakes_on_shutdown() {
        let q = BlockingQueue::<u32>::new();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let start = Instant::now();
                (q.pop_timeout(Duration::from_secs(10)), start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        q.shutdown();
        let (res, waited) = consumer.join().unwrap();
        assert_eq!(res, Err(RecvError::Closed));
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn pop_while_is_interrupted_by_wake_all() {
        let q = BlockingQueue::<u32>::new();
        let active = Arc::new(AtomicBool::new(true));
        let consumer = {
            let q = q.clone();
            let active = active.clone();
            thread::spawn(move || q.pop_while(|| active.load(Ordering::Acquire)))
        };
        thread::sleep(Duration::from_millis(20));
        active.store(false, Ordering::Release);
        q.wake_all();
        assert_eq!(consumer.join().unwrap(), Err(RecvError::Interrupted));
    }

    #[test]
    fn pop_while_checks_predicate_before_items() {
        let q = BlockingQueue::new();
        q.push(1);
        assert_eq!(q.pop_while(|| false), Err(RecvError::Interrupted));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn clear_discards_queued_items() {
        let q = BlockingQueue::new();
        q.push("a");
        q.push("b");
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }
}
