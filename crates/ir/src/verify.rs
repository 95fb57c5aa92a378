//! Structural consistency checking.
//!
//! A violation means an upstream pass handed over (or a pass produced) a
//! broken graph; callers assert on [`IRCode::is_consistent_graph`] and abort
//! compilation rather than attempt repair.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{BlockId, IRCode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("{block} lists {succ} as successor but {succ} does not list it back")]
    AsymmetricEdge { block: BlockId, succ: BlockId },
    #[error("{block} has a predecessor {pred} that is not in the layout")]
    DeadPredecessor { block: BlockId, pred: BlockId },
    #[error("{block} is empty")]
    EmptyBlock { block: BlockId },
    #[error("{block} does not end with a terminator")]
    MissingTerminator { block: BlockId },
    #[error("{block} has a terminator before its last instruction")]
    EarlyTerminator { block: BlockId },
    #[error("{block} carries catch handlers but contains {count} throwing instructions")]
    ThrowingUnderHandlers { block: BlockId, count: usize },
    #[error("instruction numbers are not strictly increasing in {block}")]
    NonMonotonicNumbers { block: BlockId },
    #[error("{block} uses a value with no recorded definition")]
    MissingDefinition { block: BlockId },
    #[error("{block} uses a value before its definition")]
    UseBeforeDefinition { block: BlockId },
    #[error("locals entering {block} disagree with the locals leaving {pred}")]
    LocalsMismatch { block: BlockId, pred: BlockId },
}

impl IRCode {
    pub fn is_consistent_graph(&self) -> bool {
        self.verify().is_ok()
    }

    pub fn verify(&self) -> Result<(), ConsistencyError> {
        self.verify_edges()?;
        self.verify_blocks()?;
        self.verify_locals()?;
        Ok(())
    }

    /// Invariant 1: every predecessor/successor link is symmetric, as a
    /// multiset property (an `if` with both targets on the same block
    /// contributes two edges on both sides).
    fn verify_edges(&self) -> Result<(), ConsistencyError> {
        let mut succ_counts: BTreeMap<(BlockId, BlockId), usize> = BTreeMap::new();
        let mut pred_counts: BTreeMap<(BlockId, BlockId), usize> = BTreeMap::new();

        for &block in &self.block_order {
            for &succ in &self.blocks[block].succs {
                *succ_counts.entry((block, succ)).or_default() += 1;
            }
            for &pred in &self.blocks[block].preds {
                if !self.block_order.contains(&pred) {
                    return Err(ConsistencyError::DeadPredecessor { block, pred });
                }
                *pred_counts.entry((pred, block)).or_default() += 1;
            }
        }

        for (&(block, succ), &count) in &succ_counts {
            if pred_counts.get(&(block, succ)).copied().unwrap_or(0) != count {
                return Err(ConsistencyError::AsymmetricEdge { block, succ });
            }
        }
        for (&(pred, block), &count) in &pred_counts {
            if succ_counts.get(&(pred, block)).copied().unwrap_or(0) != count {
                return Err(ConsistencyError::AsymmetricEdge {
                    block: pred,
                    succ: block,
                });
            }
        }
        Ok(())
    }

    /// Invariants 2, 3, 4 and 6 per block.
    fn verify_blocks(&self) -> Result<(), ConsistencyError> {
        for &block in &self.block_order {
            let b = &self.blocks[block];
            if b.is_empty() {
                return Err(ConsistencyError::EmptyBlock { block });
            }
            if !self.insts[b.exit()].is_jump() {
                return Err(ConsistencyError::MissingTerminator { block });
            }

            let mut throwing = 0usize;
            let mut last_number = None;
            for (idx, &inst) in b.insts.iter().enumerate() {
                let data = &self.insts[inst];
                let is_last = idx + 1 == b.insts.len();
                if data.is_jump() && !is_last {
                    return Err(ConsistencyError::EarlyTerminator { block });
                }
                if self.instruction_type_can_throw(inst) {
                    throwing += 1;
                }
                // Prefix sharing hoists instructions ahead of an already
                // numbered terminator, so the terminator is exempt from the
                // monotonicity requirement.
                if !is_last {
                    if let Some(last) = last_number {
                        if data.number <= last {
                            return Err(ConsistencyError::NonMonotonicNumbers { block });
                        }
                    }
                    last_number = Some(data.number);
                }

                let mut missing = false;
                let mut early = false;
                data.for_each_in_value(|value| match self.def_of(value) {
                    None => missing = true,
                    Some(def) => {
                        if self.insts[def].number > data.number {
                            early = true;
                        }
                    }
                });
                if missing {
                    return Err(ConsistencyError::MissingDefinition { block });
                }
                if early {
                    return Err(ConsistencyError::UseBeforeDefinition { block });
                }
            }

            if b.has_catch_handlers() && throwing > 1 {
                return Err(ConsistencyError::ThrowingUnderHandlers {
                    block,
                    count: throwing,
                });
            }
        }
        Ok(())
    }

    /// Invariant 5: the locals state entering a block matches the locals
    /// state leaving each normal predecessor. Handler edges are exempt (the
    /// locals reaching a handler depend on the throwing point).
    fn verify_locals(&self) -> Result<(), ConsistencyError> {
        for &pred in &self.block_order {
            let Some(exit_locals) = self.locals_at_exit(pred) else {
                continue;
            };
            for &succ in self.blocks[pred].normal_successors() {
                if let Some(entry_locals) = &self.blocks[succ].locals_at_entry {
                    if *entry_locals != exit_locals {
                        return Err(ConsistencyError::LocalsMismatch { block: succ, pred });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{debuginfo::Position, InstKind};

    #[test]
    fn detects_asymmetric_edges() {
        let mut code = IRCode::new("test");
        let b0 = code.make_block();
        let b1 = code.make_block();
        code.append_block(b0);
        code.append_block(b1);
        let goto = code.make_inst(InstKind::Goto, Position::None);
        code.blocks[b0].insts.push(goto);
        let ret = code.make_inst(InstKind::Return { value: None }, Position::None);
        code.blocks[b1].insts.push(ret);

        // Successor without the matching predecessor entry.
        code.blocks[b0].succs.push(b1);
        assert_eq!(
            code.verify(),
            Err(ConsistencyError::AsymmetricEdge { block: b0, succ: b1 })
        );

        code.blocks[b1].preds.push(b0);
        assert!(code.is_consistent_graph());
    }

    #[test]
    fn detects_missing_terminator() {
        let mut code = IRCode::new("test");
        let b0 = code.make_block();
        code.append_block(b0);
        assert_eq!(code.verify(), Err(ConsistencyError::EmptyBlock { block: b0 }));

        let value = code.make_value(crate::Value::new(crate::Type::Int));
        let konst = code.make_inst(
            InstKind::ConstNumber { dest: value, value: 1 },
            Position::None,
        );
        code.blocks[b0].insts.push(konst);
        assert_eq!(
            code.verify(),
            Err(ConsistencyError::MissingTerminator { block: b0 })
        );
    }
}
