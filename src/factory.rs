//! The node factory contract and the per-tree strategy choice.

use std::sync::Arc;

use crate::arena::{ArenaConfig, ArenaFactory};
use crate::direct::DirectFactory;
use crate::error::{AllocError, Result};
use crate::handle::NodeHandle;
use crate::layout::NodeKind;
use crate::view::{NodeMut, NodeRef};

/// Produces node handles without exposing the allocation strategy.
///
/// Interior constructors return zeroed payloads whose size matches the
/// layout catalog. They fail with [`AllocError::TooLarge`] (fatal) or
/// [`AllocError::OutOfMemory`] (recoverable).
pub trait NodeFactory<V> {
    fn new_node4(&mut self) -> Result<NodeHandle<V>>;
    fn new_node16(&mut self) -> Result<NodeHandle<V>>;
    fn new_node48(&mut self) -> Result<NodeHandle<V>>;
    fn new_node256(&mut self) -> Result<NodeHandle<V>>;

    /// Build a leaf holding a copy of `key` and a shared reference to `value`.
    fn new_leaf(&mut self, key: &[u8], value: Arc<V>) -> NodeHandle<V>;

    /// Resolve an interior handle produced by this factory.
    fn node<'a>(&'a self, handle: &'a NodeHandle<V>) -> Result<NodeRef<'a>>;

    fn node_mut<'a>(&'a mut self, handle: &'a mut NodeHandle<V>) -> Result<NodeMut<'a>>;

    /// Construct an interior node of `kind`.
    fn new_node(&mut self, kind: NodeKind) -> Result<NodeHandle<V>> {
        match kind {
            NodeKind::Node4 => self.new_node4(),
            NodeKind::Node16 => self.new_node16(),
            NodeKind::Node48 => self.new_node48(),
            NodeKind::Node256 => self.new_node256(),
            NodeKind::Leaf => Err(AllocError::LeafPayload),
        }
    }
}

/// Which strategy backs a tree instance.
#[derive(Debug, Clone, Default)]
pub enum AllocatorKind {
    #[default]
    Direct,
    Arena(ArenaConfig),
}

/// The allocator owned by one tree instance, chosen once at construction.
#[derive(Debug)]
pub enum Allocator {
    Direct(DirectFactory),
    Arena(ArenaFactory),
}

impl Allocator {
    pub fn new(kind: AllocatorKind) -> Result<Self> {
        Ok(match kind {
            AllocatorKind::Direct => Allocator::Direct(DirectFactory::new()),
            AllocatorKind::Arena(config) => Allocator::Arena(ArenaFactory::with_config(config)?),
        })
    }

    pub fn direct() -> Self {
        Allocator::Direct(DirectFactory::new())
    }

    /// An arena allocator with the default block sizes.
    pub fn arena() -> Self {
        Allocator::Arena(ArenaFactory::new())
    }

    pub fn is_arena(&self) -> bool {
        matches!(self, Allocator::Arena(_))
    }

    /// Bytes reserved across arena blocks, `None` for the direct allocator.
    pub fn arena_capacity(&self) -> Option<u64> {
        match self {
            Allocator::Direct(_) => None,
            Allocator::Arena(arena) => Some(arena.capacity()),
        }
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::direct()
    }
}

impl<V> NodeFactory<V> for Allocator {
    fn new_node4(&mut self) -> Result<NodeHandle<V>> {
        match self {
            Allocator::Direct(f) => f.new_node4(),
            Allocator::Arena(f) => f.new_node4(),
        }
    }

    fn new_node16(&mut self) -> Result<NodeHandle<V>> {
        match self {
            Allocator::Direct(f) => f.new_node16(),
            Allocator::Arena(f) => f.new_node16(),
        }
    }

    fn new_node48(&mut self) -> Result<NodeHandle<V>> {
        match self {
            Allocator::Direct(f) => f.new_node48(),
            Allocator::Arena(f) => f.new_node48(),
        }
    }

    fn new_node256(&mut self) -> Result<NodeHandle<V>> {
        match self {
            Allocator::Direct(f) => f.new_node256(),
            Allocator::Arena(f) => f.new_node256(),
        }
    }

    fn new_leaf(&mut self, key: &[u8], value: Arc<V>) -> NodeHandle<V> {
        match self {
            Allocator::Direct(f) => f.new_leaf(key, value),
            Allocator::Arena(f) => f.new_leaf(key, value),
        }
    }

    fn node<'a>(&'a self, handle: &'a NodeHandle<V>) -> Result<NodeRef<'a>> {
        match self {
            Allocator::Direct(f) => f.node(handle),
            Allocator::Arena(f) => f.node(handle),
        }
    }

    fn node_mut<'a>(&'a mut self, handle: &'a mut NodeHandle<V>) -> Result<NodeMut<'a>> {
        match self {
            Allocator::Direct(f) => f.node_mut(handle),
            Allocator::Arena(f) => f.node_mut(handle),
        }
    }
}
