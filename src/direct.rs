//! Direct allocator: every node is its own heap object.

use std::sync::Arc;

use tracing::trace;

use crate::buf::AlignedBuf;
use crate::error::{AllocError, Result};
use crate::factory::NodeFactory;
use crate::handle::{NodeHandle, Payload};
use crate::layout::{write_header, NodeKind};
use crate::view::{NodeMut, NodeRef};

/// Allocates each node as an independent, exactly sized heap region.
///
/// Stateless. Useful as a baseline and for checking the arena against.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectFactory;

impl DirectFactory {
    pub fn new() -> Self {
        Self
    }

    fn alloc<V>(&mut self, kind: NodeKind) -> Result<NodeHandle<V>> {
        let size = kind.total_bytes().ok_or(AllocError::LeafPayload)?;
        let mut buf = AlignedBuf::zeroed(size)?;
        write_header(&mut buf, kind);
        trace!(%kind, size, "direct.alloc");
        Ok(NodeHandle::heap(kind, buf))
    }
}

impl<V> NodeFactory<V> for DirectFactory {
    fn new_node4(&mut self) -> Result<NodeHandle<V>> {
        self.alloc(NodeKind::Node4)
    }

    fn new_node16(&mut self) -> Result<NodeHandle<V>> {
        self.alloc(NodeKind::Node16)
    }

    fn new_node48(&mut self) -> Result<NodeHandle<V>> {
        self.alloc(NodeKind::Node48)
    }

    fn new_node256(&mut self) -> Result<NodeHandle<V>> {
        self.alloc(NodeKind::Node256)
    }

    fn new_leaf(&mut self, key: &[u8], value: Arc<V>) -> NodeHandle<V> {
        NodeHandle::leaf(key, value)
    }

    fn node<'a>(&'a self, handle: &'a NodeHandle<V>) -> Result<NodeRef<'a>> {
        match handle.payload() {
            Payload::Heap(buf) => NodeRef::new(handle.kind(), buf),
            Payload::Arena { .. } => Err(AllocError::ForeignHandle),
            Payload::Leaf(_) => Err(AllocError::LeafPayload),
        }
    }

    fn node_mut<'a>(&'a mut self, handle: &'a mut NodeHandle<V>) -> Result<NodeMut<'a>> {
        let kind = handle.kind();
        match handle.payload_mut() {
            Payload::Heap(buf) => NodeMut::new(kind, buf),
            Payload::Arena { .. } => Err(AllocError::ForeignHandle),
            Payload::Leaf(_) => Err(AllocError::LeafPayload),
        }
    }
}
