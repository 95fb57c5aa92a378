//! Post-register-allocation peephole optimizations.
//!
//! One pass over the register-colored CFG, in four ordered phases:
//!
//! 1. [`remove_identical_predecessor_blocks`] collapses duplicate
//!    predecessors of a join into one, leaving forwarding gotos behind.
//! 2. [`remove_redundant_instructions`] drops self-moves and constant
//!    reloads whose value is already resident in the target register.
//! 3. [`share_identical_block_prefix`] hoists instructions common to both
//!    targets of a two-way branch ahead of the branch.
//! 4. [`share_identical_block_suffix`] splits instruction sequences common
//!    to several predecessors of a join into a shared tail block.
//!
//! Every phase skips an opportunity silently when a side condition fails
//! (positions, catch handlers, register interference); the graph is left
//! untouched for that opportunity. A structurally broken graph on entry or
//! exit is a compiler bug and aborts compilation.

pub mod equivalence;
pub mod move_eliminator;
mod pred_merge;
mod prefix_share;
mod redundancy;
mod suffix_share;

pub use pred_merge::remove_identical_predecessor_blocks;
pub use prefix_share::share_identical_block_prefix;
pub use redundancy::remove_redundant_instructions;
pub use suffix_share::share_identical_block_suffix;

use dexc_ir::IRCode;

use crate::regalloc::RegisterAllocator;

/// Optimize `code` using the register assignment the allocator produced.
pub fn optimize(code: &mut IRCode, allocator: &mut dyn RegisterAllocator) {
    assert!(
        code.is_consistent_graph(),
        "inconsistent IR handed to the peephole optimizer for {}: {:?}",
        code.method,
        code.verify().unwrap_err()
    );

    remove_identical_predecessor_blocks(code, allocator);
    remove_redundant_instructions(code, &*allocator);
    share_identical_block_prefix(code, &*allocator);
    share_identical_block_suffix(code, allocator, 0);

    assert!(
        code.is_consistent_graph(),
        "peephole optimizer produced inconsistent IR for {}: {:?}",
        code.method,
        code.verify().unwrap_err()
    );
}
