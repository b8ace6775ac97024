//! Buffer ledger and leak detector
//!
//! Allocates buffers out of the pool and counts what happens to them.
//! A buffer is *outstanding* from allocation until its count reaches zero,
//! and *leaked* if its last reference disappears while still outstanding.

use super::{BufferId, BufferPool, RefCountedBuffer, Shared};
use crate::{HarnessError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct LedgerInner {
    pool: BufferPool,
    next_id: AtomicU64,
    allocated: AtomicU64,
    freed: AtomicU64,
    leaked: AtomicU64,
}

/// Shared allocator handle; clones refer to the same ledger
#[derive(Clone)]
pub struct BufferLedger {
    inner: Arc<LedgerInner>,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub allocated: u64,
    pub freed: u64,
    pub outstanding: u64,
    pub leaked: u64,
    pub pool_available: usize,
    pub pool_misses: u64,
}

impl BufferLedger {
    /// Create a ledger backed by a pool of `pool_capacity` vectors of `buffer_size` bytes
    pub fn new(pool_capacity: usize, buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                pool: BufferPool::with_capacity(pool_capacity, buffer_size),
                next_id: AtomicU64::new(1),
                allocated: AtomicU64::new(0),
                freed: AtomicU64::new(0),
                leaked: AtomicU64::new(0),
            }),
        }
    }

    /// Copy `data` into pooled storage and return the single claim on it
    pub fn allocate(&self, data: &[u8]) -> RefCountedBuffer {
        self.allocate_with_count(data, 1)
    }

    /// Allocate with an explicit starting count
    ///
    /// A starting count of zero yields a buffer that is already freed; it
    /// exists so callers can model a transport that handed over nothing to
    /// release.
    pub fn allocate_with_count(&self, data: &[u8], ref_count: usize) -> RefCountedBuffer {
        let id = BufferId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let mut storage = self.inner.pool.acquire();
        storage.extend_from_slice(data);

        let shared = Arc::new(Shared::new(id, ref_count, storage, self.clone()));
        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        if ref_count == 0 {
            shared.deallocate();
        }

        tracing::trace!(buffer = %id, len = data.len(), ref_count, "Allocated buffer");
        RefCountedBuffer::from_shared(shared)
    }

    pub(crate) fn reclaim(&self, id: BufferId, storage: Vec<u8>) {
        self.inner.freed.fetch_add(1, Ordering::Relaxed);
        if !self.inner.pool.release(storage) {
            tracing::trace!(buffer = %id, "Pool full, dropping storage");
        }
    }

    pub(crate) fn record_leak(&self, id: BufferId, ref_count: usize) {
        self.inner.leaked.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            buffer = %id,
            ref_count,
            "LEAK: buffer was dropped before its reference count reached zero"
        );
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let allocated = self.inner.allocated.load(Ordering::Relaxed);
        let freed = self.inner.freed.load(Ordering::Relaxed);

        LedgerSnapshot {
            allocated,
            freed,
            outstanding: allocated.saturating_sub(freed),
            leaked: self.inner.leaked.load(Ordering::Relaxed),
            pool_available: self.inner.pool.available(),
            pool_misses: self.inner.pool.misses(),
        }
    }

    /// Number of buffers still holding a claim
    pub fn outstanding(&self) -> u64 {
        self.snapshot().outstanding
    }

    /// Check that every allocated buffer was released
    ///
    /// # Errors
    /// Returns [`HarnessError::LeakViolation`] if any buffer is still
    /// outstanding or was dropped unreleased.
    pub fn verify(&self) -> Result<()> {
        let snapshot = self.snapshot();
        if snapshot.outstanding > 0 || snapshot.leaked > 0 {
            return Err(HarnessError::LeakViolation {
                outstanding: snapshot.outstanding,
                leaked: snapshot.leaked,
            });
        }
        Ok(())
    }
}

impl Default for BufferLedger {
    fn default() -> Self {
        Self::new(64, 4096)
    }
}

impl std::fmt::Debug for BufferLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BufferLedger").field(&self.snapshot()).finish()
    }
}
