//! External locking for allocators shared across threads.
//!
//! The allocators are single-writer and carry no synchronization of their
//! own. When more than one thread must reach the same allocator, wrap it here
//! and hold the guard for the whole allocate-then-initialize sequence.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// A cloneable, mutex-guarded allocator.
#[derive(Debug, Default)]
pub struct Shared<F> {
    inner: Arc<Mutex<F>>,
}

impl<F> Shared<F> {
    pub fn new(factory: F) -> Self {
        Self {
            inner: Arc::new(Mutex::new(factory)),
        }
    }

    /// Exclusive access until the guard drops.
    pub fn lock(&self) -> MutexGuard<'_, F> {
        self.inner.lock()
    }

    /// Recover the allocator if this is the last reference.
    pub fn try_unwrap(self) -> Result<F, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl<F> Clone for Shared<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
