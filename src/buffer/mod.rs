//! Reference-counted response buffers
//!
//! A [`RefCountedBuffer`] is one claim on pooled storage. The storage goes
//! back to the pool only when the count reaches zero. [`RefCountedBuffer::release`]
//! consumes the handle, so a claim can't be given up twice or read afterwards.
//! Dropping a handle without releasing it keeps the count where it was; once
//! nothing references the buffer any more the ledger reports it as leaked.

mod ledger;
mod pool;

pub use ledger::{BufferLedger, LedgerSnapshot};
pub use pool::BufferPool;

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Buffer identifier, unique per ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Errors raised by buffer operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("{id} already released (refCnt: 0)")]
    AlreadyReleased { id: BufferId },
}

/// State shared by every handle and observer of one buffer
pub(crate) struct Shared {
    id: BufferId,
    ref_count: AtomicUsize,
    len: usize,
    storage: Mutex<Option<Vec<u8>>>,
    ledger: BufferLedger,
}

impl Shared {
    pub(crate) fn new(id: BufferId, ref_count: usize, storage: Vec<u8>, ledger: BufferLedger) -> Self {
        Self {
            id,
            ref_count: AtomicUsize::new(ref_count),
            len: storage.len(),
            storage: Mutex::new(Some(storage)),
            ledger,
        }
    }

    /// Hand the storage back once the last claim is gone
    pub(crate) fn deallocate(&self) {
        if let Some(storage) = self.storage.lock().take() {
            self.ledger.reclaim(self.id, storage);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let remaining = *self.ref_count.get_mut();
        if remaining > 0 {
            self.ledger.record_leak(self.id, remaining);
        }
    }
}

/// One claim on a pooled, reference-counted buffer
///
/// Created by [`BufferLedger::allocate`] with a count of one. Every
/// [`retain`](Self::retain) adds a claim and returns a new handle for it.
#[must_use = "dropping a buffer handle without release() leaks the buffer"]
pub struct RefCountedBuffer {
    shared: Arc<Shared>,
}

impl RefCountedBuffer {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> BufferId {
        self.shared.id
    }

    /// Current number of outstanding claims
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.shared.ref_count.load(Ordering::Acquire)
    }

    /// Readable length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.len == 0
    }

    /// Add a claim and return the handle that owns it
    ///
    /// A buffer whose count already reached zero has handed its storage back
    /// and can't be revived; that is reported as [`BufferError::AlreadyReleased`].
    pub fn retain(&self) -> Result<RefCountedBuffer, BufferError> {
        let shared = &self.shared;
        let mut current = shared.ref_count.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return Err(BufferError::AlreadyReleased { id: shared.id });
            }
            match shared.ref_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(Self {
            shared: Arc::clone(shared),
        })
    }

    /// Run `f` over the buffer contents
    ///
    /// Returns `None` if the storage has already been handed back to the pool.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.shared.storage.lock().as_deref().map(f)
    }

    /// Decode the contents as UTF-8, replacing invalid sequences
    pub fn decode_utf8(&self) -> Option<String> {
        self.with_bytes(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Give up this handle's claim
    ///
    /// Returns the remaining count. A count already at zero is left untouched
    /// and reported as [`BufferError::AlreadyReleased`].
    pub fn release(self) -> Result<usize, BufferError> {
        let shared = &self.shared;
        let mut current = shared.ref_count.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return Err(BufferError::AlreadyReleased { id: shared.id });
            }
            match shared.ref_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let remaining = current - 1;
        if remaining == 0 {
            shared.deallocate();
        }
        Ok(remaining)
    }

    /// Observer that reads the count without holding a claim
    pub fn observer(&self) -> BufferObserver {
        BufferObserver {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Display for RefCountedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RefCountedBuffer({}, refCnt: {}, len: {})",
            self.id(),
            self.ref_count(),
            self.len()
        )
    }
}

impl fmt::Debug for RefCountedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCountedBuffer")
            .field("id", &self.id())
            .field("ref_count", &self.ref_count())
            .field("len", &self.len())
            .finish()
    }
}

/// Read-only view of a buffer's count
///
/// Observers keep the buffer's bookkeeping alive, so leak detection for a buffer
/// only fires after its last observer is dropped as well.
#[derive(Clone)]
pub struct BufferObserver {
    shared: Arc<Shared>,
}

impl BufferObserver {
    pub fn id(&self) -> BufferId {
        self.shared.id
    }

    #[inline]
    pub fn ref_count(&self) -> usize {
        self.shared.ref_count.load(Ordering::Acquire)
    }

    /// True once the storage went back to the pool
    pub fn is_freed(&self) -> bool {
        self.shared.storage.lock().is_none()
    }
}

impl fmt::Debug for BufferObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObserver")
            .field("id", &self.id())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}


// Buffer discipline:
// - release() consumes the handle, so one claim is given up at most once
// - the count is checked before every change; it never wraps below zero
//   and a buffer at zero can't be retained back to life
// - storage returns to the pool exactly once, when the count reaches zero
