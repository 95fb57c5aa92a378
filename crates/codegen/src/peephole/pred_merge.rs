//! Collapsing identical predecessors of a join block.
//!
//! When two predecessors of a block carry the same instructions (modulo the
//! register assignment) and the same successors, one of them is rewritten to
//! a bare `goto` to the other. Merging can expose further duplicates among a
//! block's predecessors, so the scan restarts after every merge until it
//! reaches a fixed point.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use dexc_ir::{BlockId, IRCode, InstKind};

use crate::regalloc::RegisterAllocator;

use super::equivalence::BasicBlockEquivalence;

pub fn remove_identical_predecessor_blocks(
    code: &mut IRCode,
    allocator: &mut dyn RegisterAllocator,
) {
    while let Some((kept, removed)) = find_identical_predecessors(code, &*allocator) {
        if allocator.options().debug {
            assert_eq!(
                code.block_position(kept),
                code.block_position(removed),
                "identical predecessors must agree on their position in debug builds ({})",
                code.method
            );
        }
        // The allocator must observe both blocks' original intervals.
        allocator.merge_blocks(code, kept, removed);
        rewrite_to_goto(code, kept, removed);
    }
}

/// Locate one pair of identical predecessors anywhere in the graph.
fn find_identical_predecessors(
    code: &IRCode,
    allocator: &dyn RegisterAllocator,
) -> Option<(BlockId, BlockId)> {
    let equivalence = BasicBlockEquivalence::new(code, allocator);
    for &block in &code.block_order {
        let mut buckets: FxHashMap<u64, SmallVec<[BlockId; 2]>> = FxHashMap::default();
        for &pred in &code.blocks[block].preds {
            // A single-instruction predecessor is already as small as the
            // rewrite would make it.
            if code.blocks[pred].insts.len() == 1 {
                continue;
            }
            let candidates = buckets.entry(equivalence.hash(pred)).or_default();
            for &candidate in candidates.iter() {
                if candidate == pred {
                    // Duplicate edge from the same predecessor.
                    continue;
                }
                if !equivalence.equivalent(candidate, pred) {
                    continue;
                }
                if !locals_compatible(code, candidate, pred) {
                    continue;
                }
                return Some((candidate, pred));
            }
            candidates.push(pred);
        }
    }
    None
}

/// The removed block becomes a forwarding `goto`, so the locals flowing out
/// of it become the locals flowing into the kept block. Merging blocks that
/// disagree on entry locals would corrupt the debugger's view.
fn locals_compatible(code: &IRCode, a: BlockId, b: BlockId) -> bool {
    code.blocks[a].locals_at_entry == code.blocks[b].locals_at_entry
}

/// Rewrite `removed` to a single `goto kept`.
fn rewrite_to_goto(code: &mut IRCode, kept: BlockId, removed: BlockId) {
    code.clear_catch_handlers(removed);
    code.blocks[removed].insts.clear();

    let succs = std::mem::take(&mut code.blocks[removed].succs);
    for succ in succs {
        code.remove_predecessor(succ, removed);
    }

    code.blocks[removed].succs.push(kept);
    debug_assert!(!code.blocks[kept].preds.contains(&removed));
    code.blocks[kept].preds.push(removed);

    let position = code.block_position(kept);
    let goto = code.make_inst(InstKind::Goto, position);
    code.blocks[removed].insts.push(goto);
}
