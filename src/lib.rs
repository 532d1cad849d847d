//! # art-alloc
//!
//! Node layouts and allocation strategies for an Adaptive Radix Tree used as
//! an in-memory table.
//!
//! Interior nodes come in four fan-out classes (4, 16, 48, 256), each a fixed
//! 16-byte header followed by a fixed-size body. Two interchangeable
//! allocators produce [`NodeHandle`]s for them:
//!
//! - [`DirectFactory`]: one independent heap region per node.
//! - [`ArenaFactory`]: node payloads bump-allocated out of append-only,
//!   geometrically growing blocks; handles carry a stable `{block, offset}`.
//!
//! Leaves (a copied key plus a shared value reference) are always allocated
//! independently. A tree picks its strategy once via [`Allocator`] and reaches
//! payload bytes only through checked [`NodeRef`]/[`NodeMut`] views.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use art_alloc::{Allocator, NodeFactory, NodeHandle, NodeKind};
//!
//! let mut alloc = Allocator::arena();
//!
//! let mut node: NodeHandle<u64> = alloc.new_node4().unwrap();
//! alloc.node_mut(&mut node).unwrap().write_u32(0, 7);
//! assert_eq!(alloc.node(&node).unwrap().read_u32(0), 7);
//! assert_eq!(alloc.node(&node).unwrap().as_bytes().len(), 80);
//!
//! let leaf = alloc.new_leaf(b"user:1001", Arc::new(42));
//! assert_eq!(leaf.kind(), NodeKind::Leaf);
//! assert_eq!(leaf.as_leaf().unwrap().key(), b"user:1001");
//!
//! assert_eq!(alloc.arena_capacity(), Some(4096));
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub mod arena;
pub mod buf;
pub mod direct;
pub mod error;
pub mod factory;
pub mod handle;
pub mod layout;
pub mod sync;
pub mod view;

pub use arena::{ArenaAddr, ArenaConfig, ArenaFactory, ArenaStats};
pub use direct::DirectFactory;
pub use error::{AllocError, Result};
pub use factory::{Allocator, AllocatorKind, NodeFactory};
pub use handle::{Leaf, NodeHandle};
pub use layout::NodeKind;
pub use sync::Shared;
pub use view::{NodeMut, NodeRef};

#[cfg(test)]
mod proptests;
