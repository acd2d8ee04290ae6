//! Property tests for handle recycling

use std::collections::HashSet;

use nebula_alloc::config::IndexConfig;
use nebula_alloc::index::IndexAllocator;
use proptest::prelude::*;

/// One step against the pool
#[derive(Debug, Clone)]
enum Op {
    Allocate,
    /// Free the live handle at this position (modulo the live count)
    Free(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

proptest! {
    /// Fresh handles are consecutive from the offset.
    #[test]
    fn fresh_handles_are_consecutive(offset in 0u32..1_000_000, k in 1usize..200) {
        let mut ids = IndexAllocator::with_offset(offset);
        for expected in (offset..).take(k) {
            prop_assert_eq!(ids.allocate_index().unwrap(), expected);
        }
        prop_assert_eq!(ids.len(), k);
    }

    /// A freed handle is the next one handed out, and live handles stay
    /// unique under any interleaving.
    #[test]
    fn freed_handle_is_reused_first(ops in prop::collection::vec(arb_op(), 1..300)) {
        let mut ids = IndexAllocator::<u32>::new();
        let mut live: Vec<u32> = Vec::new();
        let mut last_freed: Option<u32> = None;

        for op in ops {
            match op {
                Op::Allocate => {
                    let index = ids.allocate_index().unwrap();
                    if let Some(freed) = last_freed.take() {
                        prop_assert_eq!(index, freed);
                    }
                    prop_assert!(!live.contains(&index), "handle {} issued twice", index);
                    live.push(index);
                }
                Op::Free(pos) if !live.is_empty() => {
                    let index = live.swap_remove(pos % live.len());
                    ids.free_index(index);
                    last_freed = Some(index);
                }
                Op::Free(_) => {}
            }
            prop_assert_eq!(ids.len(), live.len());
        }

        let unique: HashSet<_> = live.iter().copied().collect();
        prop_assert_eq!(unique.len(), live.len());
        prop_assert!(live.iter().all(|&i| i < ids.high_water_mark()));
    }

    /// Configured reservations come out in ascending order before fresh
    /// handles.
    #[test]
    fn configured_reserve_precedes_fresh(offset in 0usize..10_000, reserve in 0usize..64) {
        let config = IndexConfig { offset, reserve };
        let mut ids = IndexAllocator::<u64>::with_config(&config).unwrap();
        prop_assert_eq!(ids.free_count(), reserve);

        let got: Vec<u64> = (0..=reserve).map(|_| ids.allocate_index().unwrap()).collect();
        let want: Vec<u64> = (offset as u64..).take(reserve + 1).collect();
        prop_assert_eq!(got, want);
    }
}
