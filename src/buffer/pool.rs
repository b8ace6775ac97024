//! Pooled storage for response buffers
//!
//! Pre-allocated byte vectors handed out to reference-counted buffers.
//! Uses crossbeam-queue for lock-free acquire/release. Storage only comes
//! back when a buffer's count reaches zero, so a leaking consumer shows up
//! as a pool that keeps missing.

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded pool of byte vectors
///
/// # Example
/// ```
/// use buffer_leak_harness::buffer::BufferPool;
///
/// let pool = BufferPool::with_capacity(4, 1024);
///
/// let mut storage = pool.acquire();
/// storage.extend_from_slice(b"hello");
///
/// // Cleared and returned for the next response
/// assert!(pool.release(storage));
/// ```
pub struct BufferPool {
    stack: ArrayQueue<Vec<u8>>,
    buffer_size: usize,
    misses: AtomicU64,
}

impl BufferPool {
    /// Create a pool pre-populated with `capacity` vectors of `buffer_size` bytes
    pub fn with_capacity(capacity: usize, buffer_size: usize) -> Self {
        // ArrayQueue panics on zero capacity
        let stack = ArrayQueue::new(capacity.max(1));

        for _ in 0..capacity {
            if stack.push(Vec::with_capacity(buffer_size)).is_err() {
                break;
            }
        }

        Self {
            stack,
            buffer_size,
            misses: AtomicU64::new(0),
        }
    }

    /// Take an empty vector from the pool, allocating a fresh one when drained
    #[inline]
    pub fn acquire(&self) -> Vec<u8> {
        match self.stack.pop() {
            Some(storage) => storage,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.buffer_size)
            }
        }
    }

    /// Return a vector to the pool
    ///
    /// Returns `false` when the pool is already full and the vector was dropped.
    #[inline]
    pub fn release(&self, mut storage: Vec<u8>) -> bool {
        storage.clear();
        self.stack.push(storage).is_ok()
    }

    /// Number of vectors currently available
    #[inline]
    pub fn available(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Maximum number of pooled vectors
    #[inline]
    pub fn capacity(&self) -> usize {
        self.stack.capacity()
    }

    /// How many acquires found the pool empty
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_creation() {
        let pool = BufferPool::with_capacity(16, 512);
        assert_eq!(pool.available(), 16);
        assert_eq!(pool.capacity(), 16);
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_acquire_release() {
        let pool = BufferPool::with_capacity(4, 64);

        let mut taken = Vec::new();
        for _ in 0..4 {
            taken.push(pool.acquire());
        }
        assert!(pool.is_empty());
        assert_eq!(pool.misses(), 0);

        for storage in taken {
            assert!(pool.release(storage));
        }
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_drained_pool_allocates() {
        let pool = BufferPool::with_capacity(1, 32);

        let _a = pool.acquire();
        let b = pool.acquire();

        assert_eq!(pool.misses(), 1);
        assert!(b.capacity() >= 32);
    }

    #[test]
    fn test_release_to_full_pool() {
        let pool = BufferPool::with_capacity(2, 8);
        assert!(!pool.release(vec![1, 2, 3]));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_released_storage_is_cleared() {
        let pool = BufferPool::with_capacity(1, 8);

        let mut storage = pool.acquire();
        storage.extend_from_slice(b"stale");
        pool.release(storage);

        assert!(pool.acquire().is_empty());
    }

    #[test]
    fn test_zero_capacity_pool() {
        let pool = BufferPool::with_capacity(0, 8);
        assert_eq!(pool.available(), 0);
        let _ = pool.acquire();
        assert_eq!(pool.misses(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(BufferPool::with_capacity(64, 256));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut storage = pool.acquire();
                        storage.push(1);
                        pool.release(storage);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(pool.available() > 0);
    }
}
