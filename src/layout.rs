//! Node layout catalog.
//!
//! Every interior node is one contiguous allocation: a 16-byte header followed
//! by a kind-specific body. Sizes are fixed per kind so a payload can be viewed
//! in place without copying.
//!
//! Header layout (version 1):
//!
//! ```text
//! [0]      kind tag
//! [1]      layout version
//! [2..16]  tree-owned metadata (child count, prefix length, ...)
//! ```

use std::fmt;

/// Bytes reserved before every interior node body.
pub const HEADER_BYTES: usize = 16;

/// Header byte holding the kind tag.
pub(crate) const TAG_OFFSET: usize = 0;
/// Header byte holding the layout version.
pub(crate) const VERSION_OFFSET: usize = 1;
/// First header byte owned by the tree.
pub const META_OFFSET: usize = 2;

/// Version written into byte 1 of every header.
pub const LAYOUT_VERSION: u8 = 1;

pub const NODE4_BODY: usize = 64;
pub const NODE16_BODY: usize = 176;
pub const NODE48_BODY: usize = 696;
pub const NODE256_BODY: usize = 2072;

pub const NODE4_BYTES: usize = HEADER_BYTES + NODE4_BODY;
pub const NODE16_BYTES: usize = HEADER_BYTES + NODE16_BODY;
pub const NODE48_BYTES: usize = HEADER_BYTES + NODE48_BODY;
pub const NODE256_BYTES: usize = HEADER_BYTES + NODE256_BODY;

/// Payload alignment guaranteed by both allocators.
pub const NODE_ALIGN: usize = 8;

const _: () = {
    assert!(NODE4_BYTES == 80);
    assert!(NODE16_BYTES == 192);
    assert!(NODE48_BYTES == 712);
    assert!(NODE256_BYTES == 2088);
    assert!(NODE4_BYTES % NODE_ALIGN == 0);
    assert!(NODE16_BYTES % NODE_ALIGN == 0);
    assert!(NODE48_BYTES % NODE_ALIGN == 0);
    assert!(NODE256_BYTES % NODE_ALIGN == 0);
};

/// The kind of a node.
///
/// Tags start at 1 so a zeroed header never decodes as a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    /// A key/value leaf. Variable size, never arena-backed.
    Leaf = 1,
    /// Up to 4 children.
    Node4 = 2,
    /// Up to 16 children.
    Node16 = 3,
    /// Up to 48 children.
    Node48 = 4,
    /// Up to 256 children.
    Node256 = 5,
}

impl NodeKind {
    /// Interior kinds in fan-out order.
    pub const INTERIOR: [NodeKind; 4] = [
        NodeKind::Node4,
        NodeKind::Node16,
        NodeKind::Node48,
        NodeKind::Node256,
    ];

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(NodeKind::Leaf),
            2 => Some(NodeKind::Node4),
            3 => Some(NodeKind::Node16),
            4 => Some(NodeKind::Node48),
            5 => Some(NodeKind::Node256),
            _ => None,
        }
    }

    #[inline]
    pub fn is_leaf(self) -> bool {
        self == NodeKind::Leaf
    }

    /// Maximum number of children, `None` for leaves.
    pub fn fan_out(self) -> Option<usize> {
        match self {
            NodeKind::Leaf => None,
            NodeKind::Node4 => Some(4),
            NodeKind::Node16 => Some(16),
            NodeKind::Node48 => Some(48),
            NodeKind::Node256 => Some(256),
        }
    }

    /// Body size in bytes, `None` for leaves.
    pub fn body_bytes(self) -> Option<usize> {
        match self {
            NodeKind::Leaf => None,
            NodeKind::Node4 => Some(NODE4_BODY),
            NodeKind::Node16 => Some(NODE16_BODY),
            NodeKind::Node48 => Some(NODE48_BODY),
            NodeKind::Node256 => Some(NODE256_BODY),
        }
    }

    /// Header plus body, `None` for leaves.
    pub fn total_bytes(self) -> Option<usize> {
        self.body_bytes().map(|body| HEADER_BYTES + body)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Leaf => "Leaf",
            NodeKind::Node4 => "Node4",
            NodeKind::Node16 => "Node16",
            NodeKind::Node48 => "Node48",
            NodeKind::Node256 => "Node256",
        };
        f.write_str(name)
    }
}

/// Stamp a freshly zeroed payload with its kind tag and layout version.
pub(crate) fn write_header(payload: &mut [u8], kind: NodeKind) {
    debug_assert!(!kind.is_leaf());
    debug_assert!(payload.len() >= HEADER_BYTES);
    payload[TAG_OFFSET] = kind.tag();
    payload[VERSION_OFFSET] = LAYOUT_VERSION;
}
