//! Checked views over node payload bytes.
//!
//! A view is built from a borrowed slice once its length, tag and layout
//! version have been validated against the catalog. It never outlives the
//! borrow of the allocator or handle it came from.

use crate::error::{AllocError, Result};
use crate::layout::{
    NodeKind, HEADER_BYTES, LAYOUT_VERSION, META_OFFSET, TAG_OFFSET, VERSION_OFFSET,
};

fn check(kind: NodeKind, bytes: &[u8]) -> Result<()> {
    let expected = kind.total_bytes().ok_or(AllocError::LeafPayload)?;
    if bytes.len() != expected {
        return Err(AllocError::PayloadSize {
            kind,
            expected,
            actual: bytes.len(),
        });
    }
    let tag = bytes[TAG_OFFSET];
    let version = bytes[VERSION_OFFSET];
    match NodeKind::from_tag(tag) {
        Some(found) if found != kind => Err(AllocError::KindMismatch {
            expected: kind,
            found,
        }),
        Some(_) if version == LAYOUT_VERSION => Ok(()),
        _ => Err(AllocError::CorruptHeader { kind, tag, version }),
    }
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        /// Little-endian read at a body-relative offset.
        ///
        /// # Panics
        /// Panics if the value does not fit inside the body.
        #[inline]
        pub fn $name(&self, at: usize) -> $ty {
            const N: usize = std::mem::size_of::<$ty>();
            let mut raw = [0u8; N];
            raw.copy_from_slice(&self.body()[at..at + N]);
            <$ty>::from_le_bytes(raw)
        }
    };
}

macro_rules! write_le {
    ($name:ident, $ty:ty) => {
        /// Little-endian write at a body-relative offset.
        ///
        /// # Panics
        /// Panics if the value does not fit inside the body.
        #[inline]
        pub fn $name(&mut self, at: usize, value: $ty) {
            const N: usize = std::mem::size_of::<$ty>();
            self.body_mut()[at..at + N].copy_from_slice(&value.to_le_bytes());
        }
    };
}

/// Shared view of an interior node.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    kind: NodeKind,
    bytes: &'a [u8],
}

impl<'a> NodeRef<'a> {
    /// Validate `bytes` as a payload of `kind`.
    pub fn new(kind: NodeKind, bytes: &'a [u8]) -> Result<Self> {
        check(kind, bytes)?;
        Ok(Self { kind, bytes })
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Re-check this view as `kind`, failing on any other kind.
    pub fn expect(self, kind: NodeKind) -> Result<Self> {
        if kind != self.kind {
            return Err(AllocError::KindMismatch {
                expected: kind,
                found: self.kind,
            });
        }
        Ok(self)
    }

    /// Header plus body.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn header(&self) -> &'a [u8] {
        &self.bytes[..HEADER_BYTES]
    }

    /// Tree-owned header bytes.
    #[inline]
    pub fn meta(&self) -> &'a [u8] {
        &self.bytes[META_OFFSET..HEADER_BYTES]
    }

    #[inline]
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[HEADER_BYTES..]
    }

    read_le!(read_u16, u16);
    read_le!(read_u32, u32);
    read_le!(read_u64, u64);
}

/// Exclusive view of an interior node.
///
/// The kind tag and layout version are not writable through the view.
#[derive(Debug)]
pub struct NodeMut<'a> {
    kind: NodeKind,
    bytes: &'a mut [u8],
}

impl<'a> NodeMut<'a> {
    /// Validate `bytes` as a payload of `kind`.
    pub fn new(kind: NodeKind, bytes: &'a mut [u8]) -> Result<Self> {
        check(kind, bytes)?;
        Ok(Self { kind, bytes })
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn expect(self, kind: NodeKind) -> Result<Self> {
        if kind != self.kind {
            return Err(AllocError::KindMismatch {
                expected: kind,
                found: self.kind,
            });
        }
        Ok(self)
    }

    /// Reborrow as a shared view.
    #[inline]
    pub fn as_shared(&self) -> NodeRef<'_> {
        NodeRef {
            kind: self.kind,
            bytes: self.bytes,
        }
    }

    #[inline]
    pub fn header(&self) -> &[u8] {
        &self.bytes[..HEADER_BYTES]
    }

    #[inline]
    pub fn meta(&self) -> &[u8] {
        &self.bytes[META_OFFSET..HEADER_BYTES]
    }

    #[inline]
    pub fn meta_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[META_OFFSET..HEADER_BYTES]
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.bytes[HEADER_BYTES..]
    }

    #[inline]
    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[HEADER_BYTES..]
    }

    read_le!(read_u16, u16);
    read_le!(read_u32, u32);
    read_le!(read_u64, u64);

    write_le!(write_u16, u16);
    write_le!(write_u32, u32);
    write_le!(write_u64, u64);
}
