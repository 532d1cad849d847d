//! Zeroed, 8-byte-aligned heap regions.
//!
//! Both allocators hand out node payloads that callers may reinterpret in
//! place, so every region starts on a [`NODE_ALIGN`] boundary. Allocation
//! failure is reported as [`AllocError::OutOfMemory`] instead of aborting.

use std::alloc::{self, Layout};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use crate::error::{AllocError, Result};
use crate::layout::NODE_ALIGN;

/// An owned, zero-initialized byte region aligned to [`NODE_ALIGN`].
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuf {
    /// Allocate `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            // Dangling but aligned; never dereferenced for more than 0 bytes.
            let ptr = NonNull::new(NODE_ALIGN as *mut u8).ok_or(AllocError::OutOfMemory { size: 0 })?;
            return Ok(Self { ptr, len });
        }
        let layout = Self::layout(len)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory { size: len })?;
        Ok(Self { ptr, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn layout(len: usize) -> Result<Layout> {
        Layout::from_size_align(len, NODE_ALIGN).map_err(|_| AllocError::OutOfMemory { size: len })
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len initialized (zeroed) bytes owned by self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuf {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: ptr was allocated with this exact layout in `zeroed`.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

impl fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuf").field("len", &self.len).finish()
    }
}

// Safety: AlignedBuf uniquely owns its region, like Box<[u8]>.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}
