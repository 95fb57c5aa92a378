//! The register-allocator surface consumed by post-allocation passes.
//!
//! The peephole optimizer never looks inside the allocator; it only asks
//! which physical register a value occupies at a given instruction number,
//! and notifies the allocator when it restructures the graph so live
//! intervals can be kept in sync.

use cranelift_entity::SecondaryMap;
use smallvec::SmallVec;

use dexc_ir::{BlockId, IRCode, ValueId};

use crate::settings::CodegenOptions;

pub trait RegisterAllocator {
    /// Physical register holding `value` at `inst_number`. The mapping must
    /// be defined at every instruction number where the value is live; a
    /// lookup outside the value's intervals is a programmer error.
    fn register_for_value(&self, value: ValueId, inst_number: u32) -> u32;

    /// Whether the interval split covering `inst_number` was spilled and the
    /// value chosen for rematerialization, i.e. the definition at that point
    /// is dead and will be re-emitted on demand.
    fn is_spilled_and_rematerializable(&self, value: ValueId, inst_number: u32) -> bool;

    /// Two identical predecessor blocks are about to be collapsed; `removed`
    /// will be rewritten to a bare `goto kept`. Called while both blocks
    /// still carry their original instructions and edges.
    fn merge_blocks(&mut self, code: &IRCode, kept: BlockId, removed: BlockId);

    /// A new block is about to take over the shared suffix (`suffix_size`
    /// trailing instructions) of every block in `preds`. The suffix
    /// instructions of `preds[0]` will move into `new_block`; called before
    /// any of the blocks are modified.
    fn add_new_block_to_share_identical_suffix(
        &mut self,
        code: &IRCode,
        new_block: BlockId,
        suffix_size: usize,
        preds: &[BlockId],
    );

    fn options(&self) -> &CodegenOptions;
}

/// One contiguous piece of a value's live range, as a half-open range of
/// instruction numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSplit {
    pub start: u32,
    pub end: u32,
    pub register: u32,
    pub spilled_and_rematerializable: bool,
}

impl IntervalSplit {
    pub fn covers(&self, number: u32) -> bool {
        self.start <= number && number < self.end
    }

    fn overlaps(&self, lo: u32, hi: u32) -> bool {
        self.start <= hi && lo < self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveIntervals {
    pub splits: SmallVec<[IntervalSplit; 2]>,
}

impl LiveIntervals {
    pub fn split_covering(&self, number: u32) -> Option<&IntervalSplit> {
        self.splits.iter().find(|split| split.covers(number))
    }
}

/// Post-allocation snapshot of the value-to-register assignment.
///
/// A linear-scan allocator distills its interval state into this mapping
/// once colors are final; the peephole pass and the writer both consume it.
/// The structural callbacks extend interval splits so that lookups stay
/// defined at every instruction number the rewritten graph executes.
#[derive(Default)]
pub struct RegisterMapping {
    intervals: SecondaryMap<ValueId, LiveIntervals>,
    options: CodegenOptions,
}

impl RegisterMapping {
    pub fn new(options: CodegenOptions) -> Self {
        Self {
            intervals: SecondaryMap::new(),
            options,
        }
    }

    /// Assign `register` to `value` over the whole method.
    pub fn set_register(&mut self, value: ValueId, register: u32) {
        self.add_split(
            value,
            IntervalSplit {
                start: 0,
                end: u32::MAX,
                register,
                spilled_and_rematerializable: false,
            },
        );
    }

    pub fn add_split(&mut self, value: ValueId, split: IntervalSplit) {
        self.intervals[value].splits.push(split);
    }

    pub fn intervals(&self, value: ValueId) -> &LiveIntervals {
        &self.intervals[value]
    }

    /// Inclusive instruction-number range of a block, if it has any
    /// instructions.
    fn block_range(code: &IRCode, block: BlockId) -> Option<(u32, u32)> {
        let insts = &code.blocks[block].insts;
        let first = *insts.first()?;
        let last = *insts.last()?;
        Some((code.inst(first).number, code.inst(last).number))
    }

    /// Extend every split overlapping `[lo, hi]` to also cover
    /// `[cover_lo, cover_hi]`.
    fn extend_covering(&mut self, lo: u32, hi: u32, cover_lo: u32, cover_hi: u32) {
        for intervals in self.intervals.values_mut() {
            for split in intervals.splits.iter_mut() {
                if split.overlaps(lo, hi) {
                    split.start = split.start.min(cover_lo);
                    split.end = split.end.max(cover_hi.saturating_add(1));
                }
            }
        }
    }
}

impl RegisterAllocator for RegisterMapping {
    fn register_for_value(&self, value: ValueId, inst_number: u32) -> u32 {
        self.intervals[value]
            .split_covering(inst_number)
            .unwrap_or_else(|| panic!("no register for {value} at instruction {inst_number}"))
            .register
    }

    fn is_spilled_and_rematerializable(&self, value: ValueId, inst_number: u32) -> bool {
        self.intervals[value]
            .split_covering(inst_number)
            .is_some_and(|split| split.spilled_and_rematerializable)
    }

    fn merge_blocks(&mut self, code: &IRCode, kept: BlockId, removed: BlockId) {
        let Some((removed_lo, removed_hi)) = Self::block_range(code, removed) else {
            return;
        };
        let Some((kept_lo, kept_hi)) = Self::block_range(code, kept) else {
            return;
        };
        // Values flowing through the removed block now flow through the kept
        // one; their registers must stay pinned across its numbers.
        self.extend_covering(removed_lo, removed_hi, kept_lo, kept_hi);
    }

    fn add_new_block_to_share_identical_suffix(
        &mut self,
        code: &IRCode,
        _new_block: BlockId,
        suffix_size: usize,
        preds: &[BlockId],
    ) {
        // The shared block inherits the first predecessor's suffix together
        // with its instruction numbers.
        let first = &code.blocks[preds[0]].insts;
        let shared_lo = code.inst(first[first.len() - suffix_size]).number;
        let shared_hi = code.inst(*first.last().unwrap()).number;

        for &pred in &preds[1..] {
            let insts = &code.blocks[pred].insts;
            let lo = code.inst(insts[insts.len() - suffix_size]).number;
            let hi = code.inst(*insts.last().unwrap()).number;
            self.extend_covering(lo, hi, shared_lo, shared_hi);
        }
    }

    fn options(&self) -> &CodegenOptions {
        &self.options
    }
}
