//! Basic blocks.

use cranelift_entity::entity_impl;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{debuginfo::LocalsMap, InstId};

/// An opaque reference to a [`BasicBlock`]. The index doubles as the block
/// number: the pool only grows, so freshly created blocks are always numbered
/// beyond every existing one.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

/// An ordered instruction sequence ending with a terminator.
///
/// Edges are stored on the block record as index lists. The predecessor list
/// is an ordered multiset (a predecessor with two edges into the block
/// appears twice). The successor list keeps normal successors first and
/// catch-handler targets last; `catch_guards` runs parallel to the trailing
/// handler entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicBlock {
    pub insts: Vec<InstId>,
    pub preds: SmallVec<[BlockId; 4]>,
    pub succs: SmallVec<[BlockId; 2]>,
    pub catch_guards: SmallVec<[SmolStr; 2]>,
    pub locals_at_entry: Option<LocalsMap>,
}

impl BasicBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// First instruction. Panics on an empty block.
    pub fn entry(&self) -> InstId {
        self.insts[0]
    }

    /// The terminator. Panics on an empty block.
    pub fn exit(&self) -> InstId {
        *self.insts.last().expect("empty block has no exit")
    }

    pub fn has_catch_handlers(&self) -> bool {
        !self.catch_guards.is_empty()
    }

    fn normal_len(&self) -> usize {
        self.succs.len() - self.catch_guards.len()
    }

    pub fn normal_successors(&self) -> &[BlockId] {
        &self.succs[..self.normal_len()]
    }

    pub fn handler_successors(&self) -> &[BlockId] {
        &self.succs[self.normal_len()..]
    }

    /// Add `succ` as a normal successor, keeping it ahead of any
    /// catch-handler entries.
    pub(crate) fn push_normal_successor(&mut self, succ: BlockId) {
        let at = self.normal_len();
        self.succs.insert(at, succ);
    }

    /// Remove the first occurrence of `pred` from the predecessor multiset.
    pub(crate) fn remove_predecessor(&mut self, pred: BlockId) {
        let at = self
            .preds
            .iter()
            .position(|&p| p == pred)
            .expect("predecessor link out of sync");
        self.preds.remove(at);
    }
}
