//! Hoisting common successor prefixes into the predecessor.
//!
//! When a block ends in a two-way branch and is the only way into both
//! targets, instructions the targets share at their front can run before the
//! branch instead. Hoisting stops at the first instruction pair that differs,
//! could change exceptional control flow, does not commute with the branch's
//! register reads, or would corrupt the position stream.

use rustc_hash::FxHashSet;

use dexc_ir::{BlockId, IRCode, InstId};

use crate::regalloc::RegisterAllocator;

use super::equivalence::identical_after_register_allocation;

pub fn share_identical_block_prefix(code: &mut IRCode, allocator: &dyn RegisterAllocator) {
    let mut blocks_to_remove: FxHashSet<BlockId> = FxHashSet::default();

    let order_snapshot = code.block_order.clone();
    for &block in &order_snapshot {
        if blocks_to_remove.contains(&block) {
            // This block has already been merged away entirely.
            continue;
        }

        let normal = code.blocks[block].normal_successors();
        let &[s, t] = normal else {
            continue;
        };

        // The block must be on all paths to both successors.
        if code.blocks[s].preds.len() != 1 || code.blocks[t].preds.len() != 1 {
            continue;
        }

        // Only share when both successors agree on the locals state.
        if code.blocks[s].locals_at_entry != code.blocks[t].locals_at_entry {
            continue;
        }

        loop {
            if code.blocks[s].is_empty() || code.blocks[t].is_empty() {
                debug_assert!(blocks_to_remove.contains(&s));
                debug_assert!(blocks_to_remove.contains(&t));
                break;
            }

            let i0 = code.blocks[s].entry();
            let i1 = code.blocks[t].entry();

            if !identical_after_register_allocation(code, s, i0, t, i1, allocator) {
                break;
            }

            // A block with catch handlers may hold at most one throwing
            // instruction.
            if code.instruction_type_can_throw(i0) && code.blocks[block].has_catch_handlers() {
                break;
            }

            // Moving a throwing instruction out of a handler's scope would
            // change the exceptional control flow.
            if code.instruction_instance_can_throw(i0)
                && (code.blocks[s].has_catch_handlers() || code.blocks[t].has_catch_handlers())
            {
                break;
            }

            // The hoisted instruction runs before the branch now, so its
            // writes must not overlap the branch's register reads:
            //
            //                 <block>
            //   if-eqz r0 then goto s else goto t
            //          /                 \
            //       <s>                  <t>
            //    const r0, 1          const r0, 1
            //
            // reordering "if-eqz r0" and "const r0, 1" changes semantics.
            if !commutes_with_exit(code, block, i0, allocator) {
                break;
            }

            if !position_compatible(code, block, i0) {
                break;
            }

            code.blocks[s].insts.remove(0);
            code.blocks[t].insts.remove(0);

            if code.inst(i0).is_jump() {
                hoist_terminator(code, block, s, t, i0);
                blocks_to_remove.insert(s);
                blocks_to_remove.insert(t);
            } else {
                let at = code.blocks[block].insts.len() - 1;
                code.blocks[block].insts.insert(at, i0);

                // A hoisted locals change now happens before both successors.
                if code.inst(i0).is_debug_locals_change() {
                    let change = code.inst(i0).clone();
                    if let Some(locals) = code.blocks[s].locals_at_entry.as_mut() {
                        change.apply_locals_change(locals);
                    }
                    if let Some(locals) = code.blocks[t].locals_at_entry.as_mut() {
                        change.apply_locals_change(locals);
                    }
                }
            }
        }
    }

    if !blocks_to_remove.is_empty() {
        code.block_order.retain(|b| !blocks_to_remove.contains(b));
    }
}

/// Both successors reduced to the same terminator: it replaces the block's
/// branch, and the block links directly to its targets. The emptied
/// successors are detached; the caller deletes them from the layout.
fn hoist_terminator(code: &mut IRCode, block: BlockId, s: BlockId, t: BlockId, terminator: InstId) {
    let exit_at = code.blocks[block].insts.len() - 1;
    code.blocks[block].insts[exit_at] = terminator;

    // Keep the block's own catch-handler edges; only the branch edges go.
    code.remove_successor(block, s);
    code.remove_successor(block, t);

    let new_targets: Vec<BlockId> = code.blocks[s].normal_successors().to_vec();
    code.detach_all_successors(s);
    code.detach_all_successors(t);
    for target in new_targets {
        code.link(block, target);
    }
}

fn commutes_with_exit(
    code: &IRCode,
    block: BlockId,
    inst: InstId,
    allocator: &dyn RegisterAllocator,
) -> bool {
    let data = code.inst(inst);
    let Some(out) = data.out_value() else {
        return true;
    };
    if !code.value(out).needs_register {
        return true;
    }
    let dest = allocator.register_for_value(out, data.number);
    let dest_width = code.value(out).required_registers();

    let exit_data = code.inst(code.blocks[block].exit());
    let mut commutes = true;
    exit_data.for_each_in_value(|operand| {
        if !code.value(operand).needs_register {
            return;
        }
        let register = allocator.register_for_value(operand, exit_data.number);
        let width = code.value(operand).required_registers();
        if dest < register + width && register < dest + dest_width {
            commutes = false;
        }
    });
    commutes
}

/// The hoisted instruction's position must be unobservable: either it
/// matches the branch's position, or the branch has no position and no
/// debug values that could expose one.
fn position_compatible(code: &IRCode, block: BlockId, inst: InstId) -> bool {
    let exit_data = code.inst(code.blocks[block].exit());
    code.inst(inst).position == exit_data.position
        || (exit_data.position.is_none() && exit_data.debug_values.is_empty())
}
