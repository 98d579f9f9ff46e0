//! Pooled staging buffers for CPU↔GPU data transfer.
//!
//! A [`StagingPool`] owns a fixed set of staging buffers. Callers
//! (usually [`Texture`](crate::texture::Texture) copies) take a buffer
//! from the pool, record into it, and return it; blocking on an empty
//! pool is what bounds staging memory under concurrent load. Each
//! buffer batches any number of copies into one command list, and
//! [`StagingPool::commit_all`] flushes the whole pool as a single
//! submission with no-partial-submission semantics: if any buffer
//! fails to close its recording, nothing at all is submitted.

mod buffer;

pub(crate) use buffer::{StagingBuffer, STAGING_BLOCK};

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::backend::GpuBackend;
use crate::error::StreamError;

/// A fixed-size pool of staging buffers.
pub struct StagingPool {
    backend: Arc<dyn GpuBackend>,
    queue: Mutex<VecDeque<StagingBuffer>>,
    available: Condvar,
    capacity: usize,
    // Serializes commit_all against itself; taking every buffer from
    // the queue under two racing commits would deadlock.
    commit_lock: Mutex<()>,
}

impl StagingPool {
    /// Create a pool with `count` staging buffers, or one per
    /// available CPU when `count` is `None`.
    pub fn new(backend: Arc<dyn GpuBackend>, count: Option<usize>) -> Result<Self, StreamError> {
        let count = count
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1);
        let mut queue = VecDeque::with_capacity(count);
        for _ in 0..count {
            queue.push_back(StagingBuffer::new(backend.clone(), STAGING_BLOCK * 32)?);
        }
        log::trace!("staging pool created with {} buffers", count);
        Ok(Self {
            backend,
            queue: Mutex::new(queue),
            available: Condvar::new(),
            capacity: count,
            commit_lock: Mutex::new(()),
        })
    }

    /// Number of buffers in the pool.
    pub fn buffer_count(&self) -> usize {
        self.capacity
    }

    /// Take a staging buffer, blocking until one is available.
    pub(crate) fn take(&self) -> StagingBuffer {
        let mut queue = self.queue.lock();
        loop {
            if let Some(buf) = queue.pop_front() {
                return buf;
            }
            self.available.wait(&mut queue);
        }
    }

    /// Return a staging buffer to the pool.
    pub(crate) fn put(&self, buf: StagingBuffer) {
        self.queue.lock().push_back(buf);
        self.available.notify_one();
    }

    /// Submit every copy recorded in the pool as one batch and block
    /// until the work completes.
    ///
    /// Either the whole batch is submitted or none of it is: if any
    /// buffer fails to close its recording, already-closed lists are
    /// reset and still-recording ones are discarded. In every outcome
    /// all staged reservations are released and every pending layer is
    /// resolved, to its copy's target layout on success or to
    /// undefined on failure.
    pub fn commit_all(&self) -> Result<(), StreamError> {
        let _commit = self.commit_lock.lock();
        let mut bufs: Vec<StagingBuffer> = (0..self.capacity).map(|_| self.take()).collect();

        let mut lists = Vec::with_capacity(bufs.len());
        let mut ended = Vec::with_capacity(bufs.len());
        let mut result = Ok(());
        for i in 0..bufs.len() {
            if !bufs[i].is_recording() {
                continue;
            }
            match bufs[i].end() {
                Ok(()) => {
                    lists.push(bufs[i].list_handle());
                    ended.push(i);
                }
                Err(err) => {
                    for &j in &ended {
                        bufs[j].reset();
                    }
                    for buf in bufs[i..].iter_mut() {
                        if buf.is_recording() {
                            buf.reset();
                        }
                    }
                    result = Err(err);
                    break;
                }
            }
        }
        if result.is_ok() && !lists.is_empty() {
            result = self.backend.submit(&lists);
        }
        let failed = result.is_err();
        for buf in &mut bufs {
            buf.clear_bitmap();
            buf.drain_pending(failed);
        }
        for buf in bufs {
            self.put(buf);
        }
        result
    }
}

impl std::fmt::Debug for StagingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingPool")
            .field("buffers", &self.capacity)
            .finish()
    }
}

static_assertions::assert_impl_all!(StagingPool: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_pool_take_put() {
        let pool = StagingPool::new(Arc::new(DummyBackend::new()), Some(2)).unwrap();
        assert_eq!(pool.buffer_count(), 2);
        let a = pool.take();
        let b = pool.take();
        pool.put(a);
        pool.put(b);
        assert!(pool.commit_all().is_ok());
    }

    #[test]
    fn test_pool_default_count() {
        let pool = StagingPool::new(Arc::new(DummyBackend::new()), None).unwrap();
        assert!(pool.buffer_count() >= 1);
    }

    #[test]
    fn test_commit_all_idle_pool() {
        let pool = StagingPool::new(Arc::new(DummyBackend::new()), Some(3)).unwrap();
        assert!(pool.commit_all().is_ok());
        assert!(pool.commit_all().is_ok());
    }

    #[test]
    fn test_take_blocks_until_put() {
        let pool = Arc::new(StagingPool::new(Arc::new(DummyBackend::new()), Some(1)).unwrap());
        let buf = pool.take();
        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let buf = pool.take();
                pool.put(buf);
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished());
        pool.put(buf);
        waiter.join().unwrap();
    }
}
