//! Extraction of common predecessor suffixes into a shared tail block.
//!
//! Predecessors of a join point that end in the same instruction sequence
//! (modulo the register assignment) jump to a fresh block holding one copy
//! of that suffix instead. Only predecessors with a lone `goto` successor
//! are considered, so throwing instructions can move without rewriting
//! catch handlers; return blocks reach the same code path through a
//! synthetic exit join that is never inserted into the graph.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use dexc_ir::{BlockId, IRCode, InstId, InstKind};

use crate::regalloc::RegisterAllocator;

use super::equivalence::{identical_after_register_allocation, InstructionEquivalence};

enum Join {
    Block(BlockId),
    /// Synthetic join behind every return block.
    NormalExit(Vec<BlockId>),
}

pub fn share_identical_block_suffix(
    code: &mut IRCode,
    allocator: &mut dyn RegisterAllocator,
    overhead: usize,
) {
    let mut round: Vec<Join> = code.block_order.iter().copied().map(Join::Block).collect();
    let normal_exits = code.compute_normal_exit_blocks();
    if normal_exits.len() > 1 {
        round.push(Join::NormalExit(normal_exits));
    }

    // Newly created tail blocks are join points themselves and may expose
    // further shareable suffixes; loop until a round creates nothing.
    loop {
        let mut new_blocks: Vec<(BlockId, BlockId)> = Vec::new();
        for join in &round {
            let (successor, preds) = match join {
                Join::Block(block) => (Some(*block), code.blocks[*block].preds.to_vec()),
                Join::NormalExit(preds) => (None, preds.clone()),
            };

            for bucket in bucket_by_last_instruction(code, &preds, &*allocator) {
                if bucket.len() < 2 {
                    continue;
                }
                let first = bucket[0];
                let mut common = code.blocks[first].insts.len();
                for &pred in &bucket[1..] {
                    common = common.min(shared_suffix_size(code, first, pred, &*allocator));
                }
                common = align_suffix_to_locals(code, &bucket, common);

                let size_delta = overhead as i64 - (bucket.len() as i64 - 1) * common as i64;

                // Never share a suffix that is just the goto or return.
                if common <= 1 || size_delta >= 0 {
                    continue;
                }
                let new_block =
                    create_and_insert_block_for_suffix(code, common, &bucket, successor, allocator);
                new_blocks.push((first, new_block));
            }
        }

        if new_blocks.is_empty() {
            break;
        }
        for &(anchor, new_block) in &new_blocks {
            code.insert_block_after(new_block, anchor);
        }
        round = new_blocks
            .into_iter()
            .map(|(_, new_block)| Join::Block(new_block))
            .collect();
    }
}

/// Group shareable predecessors by their last real instruction (for goto
/// blocks, the one before the goto; for return blocks, the return itself).
fn bucket_by_last_instruction(
    code: &IRCode,
    preds: &[BlockId],
    allocator: &dyn RegisterAllocator,
) -> Vec<Vec<BlockId>> {
    let equivalence = InstructionEquivalence::new(code, allocator);
    let mut buckets: Vec<(InstId, Vec<BlockId>)> = Vec::new();
    let mut by_hash: FxHashMap<u64, SmallVec<[usize; 2]>> = FxHashMap::default();

    for &pred in preds {
        let block = &code.blocks[pred];
        // Only predecessors with a single goto edge (no handlers, no
        // fall-through ambiguity) or plain returns can donate their tail.
        let last = if !block.is_empty()
            && code.inst(block.exit()).is_goto()
            && block.succs.len() == 1
            && block.insts.len() > 1
        {
            block.insts[block.insts.len() - 2]
        } else if !block.is_empty()
            && code.inst(block.exit()).is_return()
            && block.succs.is_empty()
            && block.insts.len() > 2
        {
            block.exit()
        } else {
            continue;
        };

        let hash = equivalence.hash(pred, last);
        let candidates = by_hash.entry(hash).or_default();
        let mut placed = false;
        for &index in candidates.iter() {
            let (repr_inst, members) = &buckets[index];
            let repr_block = members[0];
            if equivalence.equivalent(repr_block, *repr_inst, pred, last) {
                buckets[index].1.push(pred);
                placed = true;
                break;
            }
        }
        if !placed {
            candidates.push(buckets.len());
            buckets.push((last, vec![pred]));
        }
    }

    buckets.into_iter().map(|(_, members)| members).collect()
}

/// Length of the identical suffix of two blocks, walking backward from the
/// terminators. Blocks that disagree on the locals state at their exit share
/// nothing.
fn shared_suffix_size(
    code: &IRCode,
    b0: BlockId,
    b1: BlockId,
    allocator: &dyn RegisterAllocator,
) -> usize {
    debug_assert!(code.inst(code.blocks[b0].exit()).is_jump());
    if code.locals_at_exit(b0) != code.locals_at_exit(b1) {
        return 0;
    }

    let insts0 = &code.blocks[b0].insts;
    let insts1 = &code.blocks[b1].insts;
    let mut size = 0;
    for (&i0, &i1) in insts0.iter().rev().zip(insts1.iter().rev()) {
        if !identical_after_register_allocation(code, b0, i0, b1, i1, allocator) {
            return size;
        }
        size += 1;
    }
    size
}

/// Largest `k <= common` at which every predecessor agrees on the locals
/// state entering the suffix. Without locals changes inside the suffix the
/// suffix-entry state equals the (already compared) exit state, so `common`
/// stands; a suffix that replays locals changes may hide disagreements that
/// only the entry states reveal.
fn align_suffix_to_locals(code: &IRCode, bucket: &[BlockId], common: usize) -> usize {
    let first = bucket[0];
    let first_insts = &code.blocks[first].insts;
    let has_locals_change = first_insts[first_insts.len() - common..]
        .iter()
        .any(|&inst| code.inst(inst).is_debug_locals_change());
    if !has_locals_change {
        return common;
    }

    for k in (0..=common).rev() {
        let state = code.locals_before_index(first, first_insts.len() - k);
        let aligned = bucket[1..].iter().all(|&pred| {
            let len = code.blocks[pred].insts.len();
            code.locals_before_index(pred, len - k) == state
        });
        if aligned {
            return k;
        }
    }
    0
}

/// Split the shared suffix of `preds` into a fresh block. The first
/// predecessor donates its instructions (keeping their numbers); every
/// predecessor is truncated and rewired to jump to the new block.
fn create_and_insert_block_for_suffix(
    code: &mut IRCode,
    suffix_size: usize,
    preds: &[BlockId],
    successor: Option<BlockId>,
    allocator: &mut dyn RegisterAllocator,
) -> BlockId {
    let first = preds[0];
    debug_assert!(
        (successor.is_some() && code.inst(code.blocks[first].exit()).is_goto())
            || (successor.is_none() && code.inst(code.blocks[first].exit()).is_return())
    );

    let new_block = code.make_block();

    // Locals entering the shared tail: the first predecessor's entry state
    // replayed through its remaining prefix.
    let prefix_len = code.blocks[first].insts.len() - suffix_size;
    let entry_locals = code.blocks[first].locals_at_entry.clone().map(|mut locals| {
        for &inst in &code.blocks[first].insts[..prefix_len] {
            code.inst(inst).apply_locals_change(&mut locals);
        }
        locals
    });

    // The allocator extends live intervals across the shared block; it must
    // observe the predecessors before they are truncated.
    allocator.add_new_block_to_share_identical_suffix(code, new_block, suffix_size, preds);

    let suffix: Vec<InstId> = code.blocks[first].insts[prefix_len..].to_vec();
    let moved_throwing = suffix
        .iter()
        .any(|&inst| code.instruction_type_can_throw(inst));
    code.blocks[new_block].insts = suffix;
    if moved_throwing && code.blocks[first].has_catch_handlers() {
        code.transfer_catch_handlers(new_block, first);
    }

    for &pred in preds {
        let mut position = code.block_position(pred);
        let len = code.blocks[pred].insts.len();
        code.blocks[pred].insts.truncate(len - suffix_size);

        // The replacement goto reports the last position still inside the
        // block, falling back to the former exit position; the line-number
        // table depends on this exact choice.
        for &inst in &code.blocks[pred].insts {
            if code.inst(inst).position.is_some() {
                position = code.inst(inst).position;
            }
        }
        let jump = code.make_inst(InstKind::Goto, position);
        code.blocks[pred].insts.push(jump);

        code.blocks[new_block].preds.push(pred);
        match successor {
            Some(join) => {
                code.replace_successor(pred, join, new_block);
                code.remove_predecessor(join, pred);
            }
            None => {
                code.blocks[pred].succs.push(new_block);
            }
        }
        if moved_throwing {
            code.clear_catch_handlers(pred);
        }
    }

    code.blocks[new_block].locals_at_entry = entry_locals;
    if let Some(join) = successor {
        code.link(new_block, join);
    }
    new_block
}
