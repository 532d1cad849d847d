use super::*;

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use crate::arena::MAX_BLOCK_SIZE;

/// Scan every allocation for overlap and check it still holds its stamp.
fn validate_arena(arena: &ArenaFactory, allocs: &[(ArenaAddr, usize, u8)]) {
    let mut seen = HashSet::new();
    let mut by_block: Vec<Vec<(usize, usize)>> = vec![Vec::new(); arena.block_count()];

    for &(addr, size, stamp) in allocs {
        assert!(!addr.is_null(), "arena returned a null address");
        // Zero-length allocations may share an address with their successor.
        if size > 0 {
            assert!(seen.insert(addr), "duplicate address {addr}");
        }
        assert_eq!(addr.offset() % 8, 0, "unaligned address {addr}");

        let bytes = arena.bytes(addr, size).expect("allocation must stay dereferenceable");
        assert!(bytes.iter().all(|&b| b == stamp), "allocation at {addr} was clobbered");

        let start = addr.offset() as usize;
        by_block[addr.block() as usize].push((start, start + size));
    }

    for ranges in &mut by_block {
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlapping ranges {:?}", pair);
        }
    }

    let caps: Vec<usize> = arena.block_capacities().collect();
    for pair in caps.windows(2) {
        assert!(pair[1] >= pair[0], "block capacity shrank: {caps:?}");
    }
    assert!(caps.iter().all(|&c| c <= MAX_BLOCK_SIZE));
    assert_eq!(arena.capacity(), caps.iter().map(|&c| c as u64).sum::<u64>());
}

#[derive(Clone, Debug)]
enum Op {
    Alloc(usize),
    Node(NodeKind),
    Leaf(Vec<u8>),
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let kind = prop::sample::select(NodeKind::INTERIOR.to_vec());
    let op = prop_oneof![
        40 => (0usize..=3000).prop_map(Op::Alloc),
        5 => (3000usize..=40_000).prop_map(Op::Alloc),
        40 => kind.prop_map(Op::Node),
        15 => prop::collection::vec(any::<u8>(), 0..=32).prop_map(Op::Leaf),
    ];
    prop::collection::vec(op, 0..=400)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_arena_addresses_unique_and_stable(ops in ops_strategy()) {
        let mut arena = ArenaFactory::new();
        let mut allocs: Vec<(ArenaAddr, usize, u8)> = Vec::new();
        let mut nodes: Vec<(NodeHandle<()>, u8)> = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            let stamp = (i % 251) as u8 + 1;
            match op {
                Op::Alloc(size) => {
                    let blocks_before = arena.block_count();
                    let (addr, data) = arena.alloc(size).unwrap();
                    prop_assert_eq!(data.len(), size);
                    prop_assert!(data.iter().all(|&b| b == 0));
                    data.fill(stamp);
                    if arena.block_count() > blocks_before {
                        let last = arena.block_capacities().last().unwrap();
                        prop_assert!(last > size || last == MAX_BLOCK_SIZE);
                    }
                    allocs.push((addr, size, stamp));
                }
                Op::Node(kind) => {
                    let mut h: NodeHandle<()> = arena.new_node(kind).unwrap();
                    let mut view = arena.node_mut(&mut h).unwrap();
                    prop_assert_eq!(Some(view.as_shared().as_bytes().len()), kind.total_bytes());
                    view.body_mut().fill(stamp);
                    nodes.push((h, stamp));
                }
                Op::Leaf(key) => {
                    let before = arena.capacity();
                    let h = arena.new_leaf(&key, Arc::new(()));
                    prop_assert_eq!(h.as_leaf().unwrap().key(), key.as_slice());
                    prop_assert_eq!(arena.capacity(), before);
                }
            }
        }

        validate_arena(&arena, &allocs);
        for (h, stamp) in &nodes {
            let view = arena.node(h).unwrap();
            prop_assert_eq!(view.kind(), h.kind());
            prop_assert!(view.body().iter().all(|b| b == stamp));
        }
    }

    #[test]
    fn prop_oversize_never_mutates(size in (MAX_BLOCK_SIZE + 1)..=usize::MAX, warm in 0usize..4) {
        let mut arena = ArenaFactory::new();
        for _ in 0..warm {
            arena.alloc(100).unwrap();
        }
        let before = arena.stats();
        let err = arena.alloc(size).unwrap_err();
        prop_assert_eq!(err, AllocError::TooLarge { size, max: MAX_BLOCK_SIZE });
        prop_assert_eq!(arena.stats(), before);
    }

    #[test]
    fn prop_direct_and_arena_agree(kinds in prop::collection::vec(prop::sample::select(NodeKind::INTERIOR.to_vec()), 1..=64)) {
        let mut direct = Allocator::direct();
        let mut arena = Allocator::arena();
        for kind in kinds {
            let d: NodeHandle<()> = direct.new_node(kind).unwrap();
            let a: NodeHandle<()> = arena.new_node(kind).unwrap();
            prop_assert_eq!(direct.node(&d).unwrap().as_bytes(), arena.node(&a).unwrap().as_bytes());
        }
    }

    #[test]
    fn prop_leaf_key_is_owned(mut key in prop::collection::vec(any::<u8>(), 0..=64), value in any::<u64>()) {
        let mut alloc = Allocator::arena();
        let original = key.clone();
        let h = alloc.new_leaf(&key, Arc::new(value));
        for b in key.iter_mut() {
            *b = b.wrapping_add(1);
        }
        key.push(0);
        let leaf = h.as_leaf().unwrap();
        prop_assert_eq!(leaf.key(), original.as_slice());
        prop_assert_eq!(**leaf.value(), value);
    }
}
