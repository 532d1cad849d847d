use thiserror::Error;

use crate::arena::ArenaAddr;
use crate::layout::NodeKind;

/// Errors raised by the node allocators and node views.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// A single allocation may not span blocks.
    #[error("allocation of {size} bytes exceeds the maximum block size of {max} bytes")]
    TooLarge { size: usize, max: usize },
    /// The host allocator could not supply a region.
    #[error("host allocator could not supply {size} bytes")]
    OutOfMemory { size: usize },
    /// A null (or partially null) arena address where one was structurally guaranteed.
    #[error("null arena address {0}")]
    NullAddress(ArenaAddr),
    /// An address that does not point into an allocated range of this arena.
    #[error("arena address {addr} (+{len} bytes) is outside every allocated range")]
    AddressOutOfRange { addr: ArenaAddr, len: usize },
    /// The handle's payload belongs to the other allocation strategy or to
    /// a different arena.
    #[error("handle was not produced by this allocator")]
    ForeignHandle,
    /// Leaves carry no interior-node payload.
    #[error("leaf handles have no node payload")]
    LeafPayload,
    /// A payload was viewed under a kind other than its own.
    #[error("payload of kind {found} cannot be viewed as {expected}")]
    KindMismatch { expected: NodeKind, found: NodeKind },
    /// The header does not carry a valid tag and layout version.
    #[error("corrupt {kind} header: tag {tag}, layout version {version}")]
    CorruptHeader { kind: NodeKind, tag: u8, version: u8 },
    /// The payload length disagrees with the layout catalog.
    #[error("{kind} payload holds {actual} bytes, layout requires {expected}")]
    PayloadSize {
        kind: NodeKind,
        expected: usize,
        actual: usize,
    },
    #[error("invalid arena configuration: {0}")]
    InvalidConfig(String),
}

impl AllocError {
    /// Whether the error signals programmer error or memory corruption.
    ///
    /// Only host out-of-memory is recoverable; everything else must abort the
    /// operation that observed it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AllocError::OutOfMemory { .. })
    }
}

pub type Result<T> = std::result::Result<T, AllocError>;
