//! # BoundedQueue and ObjectPool
//!
//! A fixed-capacity MPMC FIFO built on [`tokio::sync::mpsc`], and an object
//! pool built on top of it. These are the two leaf primitives every worker
//! and every queue in the pipeline is built from.

use crate::error::{McError, Result};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

/// A fixed-capacity pointer FIFO with strict FIFO ordering.
///
/// `push` never blocks: it either enqueues or fails with [`McError::Full`].
/// `pop` either blocks until an item is available (`wait = true`) or returns
/// immediately with [`McError::Empty`] (`wait = false`). Multiple producers
/// and consumers may operate on the same queue concurrently; consumers
/// serialize on an internal lock around the receive half.
pub struct BoundedQueue<T> {
    tx: mpsc::Sender<T>,
    rx: AsyncMutex<mpsc::Receiver<T>>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: AsyncMutex::new(rx),
        }
    }

    /// Enqueue `item`. Never blocks.
    pub fn push(&self, item: T) -> Result<()> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => McError::Full,
            mpsc::error::TrySendError::Closed(_) => McError::Closed,
        })
    }

    /// Dequeue the oldest item. If `wait` is true, suspends the caller until
    /// an item arrives or the queue is closed; if false, returns immediately.
    pub async fn pop(&self, wait: bool) -> Result<T> {
        let mut rx = self.rx.lock().await;
        if wait {
            rx.recv().await.ok_or(McError::Closed)
        } else {
            rx.try_recv().map_err(|e| match e {
                mpsc::error::TryRecvError::Empty => McError::Empty,
                mpsc::error::TryRecvError::Disconnected => McError::Closed,
            })
        }
    }

    /// Wake every waiter with `Closed` and refuse further pushes.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }

    /// A synchronous, best-effort non-blocking pop: returns `None` if the
    /// receive half is currently locked by another pop/close in progress,
    /// or if the queue is empty. Used by call sites that are not `async`
    /// themselves and can tolerate a spurious miss under contention (the
    /// Control handler's response-message acquisition, which always has
    /// far more pool headroom than concurrent control requests).
    pub fn try_pop_sync(&self) -> Option<T> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }
}

/// A bounded pool of pre-allocated objects of type `T`.
///
/// Implemented as a [`BoundedQueue`] seeded at construction with exactly
/// `capacity` objects. `acquire` may block; `release` is guaranteed
/// non-blocking because the pool never holds more objects in circulation
/// than it was built with.
pub struct ObjectPool<T> {
    queue: BoundedQueue<T>,
}

impl<T> ObjectPool<T> {
    /// Build a pool of `capacity` objects, each produced by `make`.
    pub fn new<F>(capacity: usize, mut make: F) -> Self
    where
        F: FnMut() -> T,
    {
        let queue = BoundedQueue::new(capacity);
        for _ in 0..capacity {
            queue
                .push(make())
                .expect("pool capacity matches seed count");
        }
        Self { queue }
    }

    pub async fn acquire(&self, wait: bool) -> Result<T> {
        self.queue.pop(wait).await
    }

    /// Return an object to the pool. Never fails under correct usage: the
    /// pool's channel capacity equals the number of objects it manages, so
    /// every `release` is matched by a prior `acquire`.
    pub fn release(&self, obj: T) {
        if self.queue.push(obj).is_err() {
            tracing::error!("object pool release failed: pool over capacity");
        }
    }

    pub async fn close(&self) {
        self.queue.close().await;
    }

    /// See [`BoundedQueue::try_pop_sync`].
    pub fn try_acquire_sync(&self) -> Option<T> {
        self.queue.try_pop_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_fails_when_full() {
        let q: BoundedQueue<u8> = BoundedQueue::new(2);
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert!(matches!(q.push(3), Err(McError::Full)));
    }

    #[tokio::test]
    async fn pop_nonblocking_returns_empty() {
        let q: BoundedQueue<u8> = BoundedQueue::new(2);
        assert!(matches!(q.pop(false).await, Err(McError::Empty)));
    }

    #[tokio::test]
    async fn pop_is_fifo() {
        let q: BoundedQueue<u8> = BoundedQueue::new(4);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();
        assert_eq!(q.pop(true).await.unwrap(), 1);
        assert_eq!(q.pop(true).await.unwrap(), 2);
        assert_eq!(q.pop(true).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn close_wakes_waiters_with_closed() {
        let q = std::sync::Arc::new(BoundedQueue::<u8>::new(1));
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.pop(true).await });
        tokio::task::yield_now().await;
        q.close().await;
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(McError::Closed)));
    }

    #[tokio::test]
    async fn object_pool_acquire_release_round_trips() {
        let pool = ObjectPool::new(2, || 0u32);
        let a = pool.acquire(true).await.unwrap();
        let b = pool.acquire(true).await.unwrap();
        assert!(matches!(pool.acquire(false).await, Err(McError::Empty)));
        pool.release(a);
        pool.release(b);
        pool.acquire(true).await.unwrap();
        pool.acquire(true).await.unwrap();
    }
}
