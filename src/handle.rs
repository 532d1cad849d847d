//! Node handles and leaves.

use std::fmt;
use std::sync::Arc;

use crate::arena::ArenaAddr;
use crate::buf::AlignedBuf;
use crate::error::{AllocError, Result};
use crate::layout::NodeKind;

/// A key/value leaf.
///
/// The key is an exact-length copy of the caller's bytes. The value is a
/// shared reference to caller-owned data and is never inspected.
pub struct Leaf<V> {
    key: Box<[u8]>,
    value: Arc<V>,
}

impl<V> Leaf<V> {
    pub(crate) fn new(key: &[u8], value: Arc<V>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    /// Swap in a new value, returning the old reference.
    pub fn replace_value(&mut self, value: Arc<V>) -> Arc<V> {
        std::mem::replace(&mut self.value, value)
    }
}

impl<V: fmt::Debug> fmt::Debug for Leaf<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

/// Where a handle's bytes live.
pub(crate) enum Payload<V> {
    /// An independent heap region (direct allocator).
    Heap(AlignedBuf),
    /// A locator into the arena identified by `arena`.
    Arena { arena: u32, addr: ArenaAddr },
    /// An independently allocated leaf (either allocator).
    Leaf(Box<Leaf<V>>),
}

/// A tagged reference to a node.
///
/// The kind is fixed at construction and fully determines how the payload
/// may be interpreted. Interior payloads are reached through
/// [`NodeFactory::node`](crate::NodeFactory::node) on the allocator that
/// produced the handle.
pub struct NodeHandle<V> {
    kind: NodeKind,
    payload: Payload<V>,
}

impl<V> NodeHandle<V> {
    pub(crate) fn heap(kind: NodeKind, buf: AlignedBuf) -> Self {
        debug_assert!(!kind.is_leaf());
        debug_assert_eq!(kind.total_bytes(), Some(buf.len()));
        Self {
            kind,
            payload: Payload::Heap(buf),
        }
    }

    pub(crate) fn arena(kind: NodeKind, arena: u32, addr: ArenaAddr) -> Self {
        debug_assert!(!kind.is_leaf());
        Self {
            kind,
            payload: Payload::Arena { arena, addr },
        }
    }

    pub(crate) fn leaf(key: &[u8], value: Arc<V>) -> Self {
        Self {
            kind: NodeKind::Leaf,
            payload: Payload::Leaf(Box::new(Leaf::new(key, value))),
        }
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    #[inline]
    pub(crate) fn payload(&self) -> &Payload<V> {
        &self.payload
    }

    #[inline]
    pub(crate) fn payload_mut(&mut self) -> &mut Payload<V> {
        &mut self.payload
    }

    /// Arena locator, if the node lives in an arena.
    pub fn arena_addr(&self) -> Option<ArenaAddr> {
        match self.payload {
            Payload::Arena { addr, .. } => Some(addr),
            _ => None,
        }
    }

    pub fn as_leaf(&self) -> Result<&Leaf<V>> {
        match &self.payload {
            Payload::Leaf(leaf) => Ok(leaf),
            _ => Err(AllocError::KindMismatch {
                expected: NodeKind::Leaf,
                found: self.kind,
            }),
        }
    }

    pub fn as_leaf_mut(&mut self) -> Result<&mut Leaf<V>> {
        match &mut self.payload {
            Payload::Leaf(leaf) => Ok(leaf),
            _ => Err(AllocError::KindMismatch {
                expected: NodeKind::Leaf,
                found: self.kind,
            }),
        }
    }
}

impl<V> fmt::Debug for NodeHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("NodeHandle");
        s.field("kind", &self.kind);
        match &self.payload {
            Payload::Heap(buf) => s.field("heap", &buf.len()),
            Payload::Arena { arena, addr } => s.field("arena", arena).field("addr", addr),
            Payload::Leaf(leaf) => s.field("key_len", &leaf.key.len()),
        };
        s.finish()
    }
}
