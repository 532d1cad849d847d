//! Block arena for interior nodes.
//!
//! Node payloads are carved from append-only blocks with a bump pointer:
//! - only the last block is ever carved, so allocation is O(1);
//! - each new block is at least twice the previous target and large enough
//!   for the request that triggered it, capped at the maximum block size;
//! - blocks are never freed, moved or reused until the arena is dropped, so
//!   every [`ArenaAddr`] stays valid for the arena's lifetime.
//!
//! Leaves are never placed in the arena; their size is unbounded and their
//! value is an external reference.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::buf::AlignedBuf;
use crate::error::{AllocError, Result};
use crate::factory::NodeFactory;
use crate::handle::{NodeHandle, Payload};
use crate::layout::{write_header, NodeKind, NODE_ALIGN};
use crate::view::{NodeMut, NodeRef};

/// Size of the first block.
pub const INITIAL_BLOCK_SIZE: usize = 4 * 1024;

/// No block, and therefore no single allocation, may exceed this.
pub const MAX_BLOCK_SIZE: usize = 128 << 20;

/// Source of per-arena ids stamped into every handle an arena produces.
static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(0);

/// Stable locator of an arena allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaAddr {
    block: u32,
    offset: u32,
}

impl ArenaAddr {
    /// "No address".
    pub const NULL: ArenaAddr = ArenaAddr {
        block: u32::MAX,
        offset: u32::MAX,
    };

    #[inline]
    pub const fn new(block: u32, offset: u32) -> Self {
        Self { block, offset }
    }

    #[inline]
    pub fn block(self) -> u32 {
        self.block
    }

    #[inline]
    pub fn offset(self) -> u32 {
        self.offset
    }

    /// True for [`ArenaAddr::NULL`] and for any address with either half set
    /// to `u32::MAX`.
    ///
    /// The arena never produces a partial sentinel. Seeing one means the
    /// address was corrupted, typically by an unsynchronized writer.
    pub fn is_null(self) -> bool {
        if self == Self::NULL {
            return true;
        }
        if self.block == u32::MAX || self.offset == u32::MAX {
            error!(addr = %self, "arena.partial_null_address");
            return true;
        }
        false
    }
}

impl fmt::Display for ArenaAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.offset)
    }
}

impl fmt::Debug for ArenaAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaAddr({self})")
    }
}

/// Block sizing for an [`ArenaFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Target size of the first block.
    pub initial_block_size: usize,
    /// Upper bound on any block, and so on any single allocation.
    pub max_block_size: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_block_size: INITIAL_BLOCK_SIZE,
            max_block_size: MAX_BLOCK_SIZE,
        }
    }
}

impl ArenaConfig {
    /// Set the target size of the first block.
    pub fn with_initial_block_size(mut self, size: usize) -> Self {
        self.initial_block_size = size;
        self
    }

    /// Set the cap on any block and on any single allocation.
    pub fn with_max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = size;
        self
    }

    /// Both sizes must be powers of two, with `8 <= initial <= max` and
    /// `max` addressable by a 32-bit offset.
    pub fn validate(&self) -> Result<()> {
        let Self {
            initial_block_size: initial,
            max_block_size: max,
        } = *self;
        if !initial.is_power_of_two() || !max.is_power_of_two() {
            return Err(AllocError::InvalidConfig(format!(
                "block sizes must be powers of two (initial {initial}, max {max})"
            )));
        }
        if initial < NODE_ALIGN || initial > max {
            return Err(AllocError::InvalidConfig(format!(
                "initial block size {initial} must be within {NODE_ALIGN}..={max}"
            )));
        }
        if max > u32::MAX as usize {
            return Err(AllocError::InvalidConfig(format!(
                "max block size {max} does not fit a 32-bit offset"
            )));
        }
        Ok(())
    }
}

/// One append-only block.
struct ArenaBlock {
    buf: AlignedBuf,
    len: usize,
}

impl ArenaBlock {
    /// Carve `size` bytes, optionally starting on an 8-byte boundary.
    ///
    /// Returns the start offset, or `None` if the block lacks room.
    fn alloc(&mut self, size: usize, align: bool) -> Option<usize> {
        let offset = if align {
            (self.len + NODE_ALIGN - 1) & !(NODE_ALIGN - 1)
        } else {
            self.len
        };
        let end = offset.checked_add(size)?;
        if end > self.buf.len() {
            return None;
        }
        self.len = end;
        Some(offset)
    }
}

/// Counters describing an arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of blocks.
    pub blocks: usize,
    /// Sum of block capacities.
    pub capacity: u64,
    /// Bytes carved from blocks, including alignment padding.
    pub used: u64,
    pub node4: usize,
    pub node16: usize,
    pub node48: usize,
    pub node256: usize,
}

/// Bump allocator over growable, append-only blocks.
///
/// Not synchronized: every mutation takes `&mut self`. Share across threads
/// through [`Shared`](crate::Shared). Dropping the arena releases every block.
pub struct ArenaFactory {
    id: u32,
    config: ArenaConfig,
    block_size: usize,
    blocks: Vec<ArenaBlock>,
    /// Total size of all blocks; the approximate memory footprint.
    capacity: u64,
    counts: [usize; 4],
}

impl ArenaFactory {
    /// An empty arena with the default block sizes. Allocates nothing yet.
    pub fn new() -> Self {
        Self::unchecked(ArenaConfig::default())
    }

    /// An empty arena with custom block sizes.
    ///
    /// Fails with [`AllocError::InvalidConfig`] if `config` does not validate.
    pub fn with_config(config: ArenaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::unchecked(config))
    }

    fn unchecked(config: ArenaConfig) -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            config,
            block_size: 0,
            blocks: Vec::new(),
            capacity: 0,
            counts: [0; 4],
        }
    }

    /// Process-unique id of this arena. Handles carry it so that resolving
    /// one against another arena fails with [`AllocError::ForeignHandle`].
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The block sizing this arena was built with.
    #[inline]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Sum of all block capacities in bytes.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of blocks allocated so far.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Capacity of each block, oldest first.
    pub fn block_capacities(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().map(|b| b.buf.len())
    }

    pub fn stats(&self) -> ArenaStats {
        let [node4, node16, node48, node256] = self.counts;
        ArenaStats {
            blocks: self.blocks.len(),
            capacity: self.capacity,
            used: self.blocks.iter().map(|b| b.len as u64).sum(),
            node4,
            node16,
            node48,
            node256,
        }
    }

    /// Reserve `size` zeroed bytes aligned to 8.
    ///
    /// Fails with [`AllocError::TooLarge`] before touching any state when
    /// `size` exceeds the maximum block size.
    ///
    /// Raw allocations share blocks with node payloads. Header bytes 0 and 1
    /// of a node (kind tag and layout version) belong to the arena; a node
    /// whose header is overwritten no longer resolves.
    pub fn alloc(&mut self, size: usize) -> Result<(ArenaAddr, &mut [u8])> {
        let max = self.config.max_block_size;
        if size > max {
            warn!(size, max, "arena.alloc_too_large");
            return Err(AllocError::TooLarge { size, max });
        }

        if self.blocks.is_empty() {
            self.enlarge(size, self.config.initial_block_size)?;
        }

        let addr = match self.alloc_in_last_block(size, true)? {
            Some(addr) => addr,
            None => {
                self.enlarge(size, self.block_size << 1)?;
                match self.alloc_in_last_block(size, true)? {
                    Some(addr) => addr,
                    None => {
                        error!(size, block_size = self.block_size, "arena.retry_carve_failed");
                        return Err(AllocError::NullAddress(ArenaAddr::NULL));
                    }
                }
            }
        };

        let bytes = self.bytes_mut(addr, size)?;
        Ok((addr, bytes))
    }

    /// The `len` bytes previously allocated at `addr`.
    pub fn bytes(&self, addr: ArenaAddr, len: usize) -> Result<&[u8]> {
        let (block, start, end) = self.locate(addr, len)?;
        Ok(&self.blocks[block].buf[start..end])
    }

    /// Mutable form of [`bytes`](Self::bytes). Outside the crate, node
    /// headers are only written through [`NodeMut`].
    pub(crate) fn bytes_mut(&mut self, addr: ArenaAddr, len: usize) -> Result<&mut [u8]> {
        let (block, start, end) = self.locate(addr, len)?;
        Ok(&mut self.blocks[block].buf[start..end])
    }

    fn locate(&self, addr: ArenaAddr, len: usize) -> Result<(usize, usize, usize)> {
        if addr.is_null() {
            return Err(AllocError::NullAddress(addr));
        }
        let block = addr.block as usize;
        let start = addr.offset as usize;
        let out_of_range = AllocError::AddressOutOfRange { addr, len };
        let used = self.blocks.get(block).ok_or_else(|| out_of_range.clone())?.len;
        match start.checked_add(len) {
            Some(end) if end <= used => Ok((block, start, end)),
            _ => Err(out_of_range),
        }
    }

    /// Append a block of at least `block_size`, doubled until it exceeds
    /// `alloc_size` and capped at the maximum block size.
    fn enlarge(&mut self, alloc_size: usize, block_size: usize) -> Result<()> {
        let max = self.config.max_block_size;
        let mut target = block_size.max(self.config.initial_block_size);
        while target <= alloc_size && target < max {
            target <<= 1;
        }
        let target = target.min(max);

        let buf = AlignedBuf::zeroed(target)?;
        self.blocks.push(ArenaBlock { buf, len: 0 });
        self.block_size = target;
        self.capacity += target as u64;
        debug!(
            block = self.blocks.len() - 1,
            size = target,
            capacity = self.capacity,
            "arena.enlarge"
        );
        Ok(())
    }

    fn alloc_in_last_block(&mut self, size: usize, align: bool) -> Result<Option<ArenaAddr>> {
        let idx = self.blocks.len() - 1;
        let Some(offset) = self.blocks[idx].alloc(size, align) else {
            return Ok(None);
        };
        let block = u32::try_from(idx).map_err(|_| AllocError::NullAddress(ArenaAddr::NULL))?;
        // Blocks never exceed u32::MAX bytes (checked by ArenaConfig::validate).
        let offset = u32::try_from(offset).map_err(|_| AllocError::NullAddress(ArenaAddr::NULL))?;
        Ok(Some(ArenaAddr::new(block, offset)))
    }

    fn alloc_node<V>(&mut self, kind: NodeKind) -> Result<NodeHandle<V>> {
        let size = kind.total_bytes().ok_or(AllocError::LeafPayload)?;
        let (addr, data) = self.alloc(size)?;
        if addr.is_null() {
            return Err(AllocError::NullAddress(addr));
        }
        write_header(data, kind);
        self.counts[kind.tag() as usize - NodeKind::Node4.tag() as usize] += 1;
        trace!(%kind, %addr, "arena.alloc_node");
        Ok(NodeHandle::arena(kind, self.id, addr))
    }
}

impl Default for ArenaFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArenaFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaFactory")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<V> NodeFactory<V> for ArenaFactory {
    fn new_node4(&mut self) -> Result<NodeHandle<V>> {
        self.alloc_node(NodeKind::Node4)
    }

    fn new_node16(&mut self) -> Result<NodeHandle<V>> {
        self.alloc_node(NodeKind::Node16)
    }

    fn new_node48(&mut self) -> Result<NodeHandle<V>> {
        self.alloc_node(NodeKind::Node48)
    }

    fn new_node256(&mut self) -> Result<NodeHandle<V>> {
        self.alloc_node(NodeKind::Node256)
    }

    fn new_leaf(&mut self, key: &[u8], value: Arc<V>) -> NodeHandle<V> {
        NodeHandle::leaf(key, value)
    }

    fn node<'a>(&'a self, handle: &'a NodeHandle<V>) -> Result<NodeRef<'a>> {
        let kind = handle.kind();
        match handle.payload() {
            Payload::Arena { arena, addr } => {
                if *arena != self.id {
                    return Err(AllocError::ForeignHandle);
                }
                let len = kind.total_bytes().ok_or(AllocError::LeafPayload)?;
                NodeRef::new(kind, self.bytes(*addr, len)?)
            }
            Payload::Heap(_) => Err(AllocError::ForeignHandle),
            Payload::Leaf(_) => Err(AllocError::LeafPayload),
        }
    }

    fn node_mut<'a>(&'a mut self, handle: &'a mut NodeHandle<V>) -> Result<NodeMut<'a>> {
        let kind = handle.kind();
        match handle.payload() {
            Payload::Arena { arena, addr } => {
                if *arena != self.id {
                    return Err(AllocError::ForeignHandle);
                }
                let len = kind.total_bytes().ok_or(AllocError::LeafPayload)?;
                NodeMut::new(kind, self.bytes_mut(*addr, len)?)
            }
            Payload::Heap(_) => Err(AllocError::ForeignHandle),
            Payload::Leaf(_) => Err(AllocError::LeafPayload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{NODE256_BYTES, NODE4_BYTES, TAG_OFFSET};

    #[test]
    fn test_null_address() {
        assert!(ArenaAddr::NULL.is_null());
        assert!(ArenaAddr::new(u32::MAX, 0).is_null());
        assert!(ArenaAddr::new(0, u32::MAX).is_null());
        assert!(ArenaAddr::new(7, u32::MAX).is_null());
        assert!(!ArenaAddr::new(0, 0).is_null());
        assert!(!ArenaAddr::new(u32::MAX - 1, u32::MAX - 1).is_null());
    }

    #[test]
    fn test_first_allocations() {
        let mut arena = ArenaFactory::new();
        assert_eq!(arena.block_count(), 0);

        let (addr, data) = arena.alloc(NODE4_BYTES).unwrap();
        assert_eq!(addr, ArenaAddr::new(0, 0));
        assert_eq!(data.len(), NODE4_BYTES);
        assert_eq!(arena.block_capacities().collect::<Vec<_>>(), vec![4096]);
        assert_eq!(arena.capacity(), 4096);

        let (addr, _) = arena.alloc(NODE4_BYTES).unwrap();
        assert_eq!(addr, ArenaAddr::new(0, 80));
    }

    #[test]
    fn test_spills_into_second_block() {
        let mut arena = ArenaFactory::new();
        // 4096 / 80 = 51 allocations fit in the first block.
        for i in 0..51u32 {
            let (addr, _) = arena.alloc(NODE4_BYTES).unwrap();
            assert_eq!(addr, ArenaAddr::new(0, i * 80));
        }
        let (addr, _) = arena.alloc(NODE4_BYTES).unwrap();
        assert_eq!(addr, ArenaAddr::new(1, 0));
        assert_eq!(arena.block_capacities().collect::<Vec<_>>(), vec![4096, 8192]);
        assert_eq!(arena.capacity(), 4096 + 8192);
    }

    #[test]
    fn test_alignment_padding() {
        let mut arena = ArenaFactory::new();
        let (a, _) = arena.alloc(3).unwrap();
        let (b, _) = arena.alloc(5).unwrap();
        let (c, _) = arena.alloc(8).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 8);
        assert_eq!(c.offset(), 16);
        assert_eq!(arena.stats().used, 24);
    }

    #[test]
    fn test_too_large_leaves_state_untouched() {
        let mut arena = ArenaFactory::new();
        let err = arena.alloc(200_000_000).unwrap_err();
        assert_eq!(
            err,
            AllocError::TooLarge {
                size: 200_000_000,
                max: MAX_BLOCK_SIZE,
            }
        );
        assert!(err.is_fatal());
        assert_eq!(arena.block_count(), 0);
        assert_eq!(arena.capacity(), 0);
    }

    #[test]
    fn test_first_block_fits_large_request() {
        let mut arena = ArenaFactory::new();
        let (addr, data) = arena.alloc(5000).unwrap();
        assert_eq!(addr, ArenaAddr::new(0, 0));
        assert_eq!(data.len(), 5000);
        assert_eq!(arena.block_capacities().collect::<Vec<_>>(), vec![8192]);

        // Exactly the initial size must still strictly fit.
        let mut arena = ArenaFactory::new();
        arena.alloc(4096).unwrap();
        assert_eq!(arena.block_capacities().collect::<Vec<_>>(), vec![8192]);
    }

    #[test]
    fn test_growth_is_capped() {
        let config = ArenaConfig::default()
            .with_initial_block_size(64)
            .with_max_block_size(256);
        let mut arena = ArenaFactory::with_config(config).unwrap();
        arena.alloc(256).unwrap();
        arena.alloc(256).unwrap();
        arena.alloc(8).unwrap();
        assert_eq!(arena.block_capacities().collect::<Vec<_>>(), vec![256, 256, 256]);
        assert_eq!(
            arena.alloc(257).unwrap_err(),
            AllocError::TooLarge { size: 257, max: 256 }
        );
    }

    #[test]
    fn test_growth_doubles_previous_target() {
        let config = ArenaConfig::default().with_initial_block_size(64);
        let mut arena = ArenaFactory::with_config(config).unwrap();
        arena.alloc(48).unwrap();
        arena.alloc(48).unwrap();
        arena.alloc(48).unwrap();
        arena.alloc(300).unwrap();
        assert_eq!(arena.block_capacities().collect::<Vec<_>>(), vec![64, 128, 512]);
    }

    #[test]
    fn test_allocations_are_zeroed_and_stable() {
        let mut arena = ArenaFactory::new();
        let (first, data) = arena.alloc(16).unwrap();
        assert!(data.iter().all(|&b| b == 0));
        data.copy_from_slice(&[0xA5; 16]);

        for _ in 0..2000 {
            arena.alloc(NODE256_BYTES).unwrap();
        }
        assert!(arena.block_count() > 1);
        assert_eq!(arena.bytes(first, 16).unwrap(), &[0xA5; 16]);
    }

    #[test]
    fn test_bytes_rejects_bad_addresses() {
        let mut arena = ArenaFactory::new();
        let (addr, _) = arena.alloc(80).unwrap();

        assert_eq!(
            arena.bytes(ArenaAddr::NULL, 1).unwrap_err(),
            AllocError::NullAddress(ArenaAddr::NULL)
        );
        assert_eq!(
            arena.bytes(ArenaAddr::new(3, 0), 1).unwrap_err(),
            AllocError::AddressOutOfRange {
                addr: ArenaAddr::new(3, 0),
                len: 1,
            }
        );
        // Past the bump pointer of block 0.
        assert!(matches!(
            arena.bytes(addr, 81).unwrap_err(),
            AllocError::AddressOutOfRange { .. }
        ));
        assert_eq!(arena.bytes(addr, 80).unwrap().len(), 80);
    }

    #[test]
    fn test_arena_nodes() {
        let mut arena = ArenaFactory::new();
        let mut n4: NodeHandle<()> = arena.new_node4().unwrap();
        let n16: NodeHandle<()> = arena.new_node16().unwrap();
        let n48: NodeHandle<()> = arena.new_node48().unwrap();
        let n256: NodeHandle<()> = arena.new_node256().unwrap();

        assert_eq!(n4.arena_addr(), Some(ArenaAddr::new(0, 0)));
        assert_eq!(n16.arena_addr(), Some(ArenaAddr::new(0, 80)));
        assert_eq!(n48.arena_addr(), Some(ArenaAddr::new(0, 272)));
        assert_eq!(n256.arena_addr(), Some(ArenaAddr::new(0, 984)));

        arena.node_mut(&mut n4).unwrap().body_mut()[0] = 42;
        assert_eq!(arena.node(&n4).unwrap().body()[0], 42);
        assert_eq!(arena.node(&n16).unwrap().body()[0], 0);

        let stats = arena.stats();
        assert_eq!(stats.node4, 1);
        assert_eq!(stats.node16, 1);
        assert_eq!(stats.node48, 1);
        assert_eq!(stats.node256, 1);
        assert_eq!(stats.used, 80 + 192 + 712 + 2088);
    }

    #[test]
    fn test_rejects_handle_from_other_arena() {
        let mut a = ArenaFactory::new();
        let mut b = ArenaFactory::new();
        assert_ne!(a.id(), b.id());

        let mut from_a: NodeHandle<()> = a.new_node4().unwrap();
        let mut from_b: NodeHandle<()> = b.new_node4().unwrap();
        // Same locator in both arenas.
        assert_eq!(from_a.arena_addr(), from_b.arena_addr());

        a.node_mut(&mut from_a).unwrap().write_u64(0, 0xAAAA);
        b.node_mut(&mut from_b).unwrap().write_u64(0, 0xBBBB);

        assert_eq!(b.node(&from_a).unwrap_err(), AllocError::ForeignHandle);
        assert_eq!(b.node_mut(&mut from_a).unwrap_err(), AllocError::ForeignHandle);
        assert_eq!(a.node(&from_b).unwrap_err(), AllocError::ForeignHandle);
        assert_eq!(a.node_mut(&mut from_b).unwrap_err(), AllocError::ForeignHandle);

        assert_eq!(a.node(&from_a).unwrap().read_u64(0), 0xAAAA);
        assert_eq!(b.node(&from_b).unwrap().read_u64(0), 0xBBBB);
    }

    #[test]
    fn test_overwritten_header_no_longer_resolves() {
        let mut arena = ArenaFactory::new();
        let n4: NodeHandle<()> = arena.new_node4().unwrap();
        let n16: NodeHandle<()> = arena.new_node16().unwrap();
        let addr4 = n4.arena_addr().unwrap();
        let addr16 = n16.arena_addr().unwrap();

        arena.bytes_mut(addr4, NODE4_BYTES).unwrap()[TAG_OFFSET] = NodeKind::Node16.tag();
        assert_eq!(
            arena.node(&n4).unwrap_err(),
            AllocError::KindMismatch {
                expected: NodeKind::Node4,
                found: NodeKind::Node16,
            }
        );

        arena.bytes_mut(addr16, 2).unwrap().copy_from_slice(&[0, 0]);
        assert_eq!(
            arena.node(&n16).unwrap_err(),
            AllocError::CorruptHeader {
                kind: NodeKind::Node16,
                tag: 0,
                version: 0,
            }
        );
    }

    #[test]
    fn test_leaf_bypasses_arena() {
        let mut arena = ArenaFactory::new();
        let leaf = arena.new_leaf(b"k", Arc::new(1u8));
        assert_eq!(arena.block_count(), 0);
        assert_eq!(arena.node(&leaf).unwrap_err(), AllocError::LeafPayload);
    }

    #[test]
    fn test_config_validation() {
        assert!(ArenaConfig::default().validate().is_ok());
        for config in [
            ArenaConfig::default().with_initial_block_size(1000),
            ArenaConfig::default().with_initial_block_size(4),
            ArenaConfig::default().with_max_block_size(1024),
            ArenaConfig::default().with_max_block_size(3 << 20),
        ] {
            assert!(matches!(
                ArenaFactory::with_config(config).unwrap_err(),
                AllocError::InvalidConfig(_)
            ));
        }
    }
}
