//! The CFG container.
//!
//! Values, instructions and blocks live in entity pools; blocks reference
//! instructions and each other by index, so structural rewrites never chase
//! pointers. `block_order` is the layout order of live blocks (the entry
//! block first); pool entries dropped from the order simply become garbage.

use cranelift_entity::{packed_option::PackedOption, PrimaryMap, SecondaryMap};

use crate::{
    debuginfo::{LocalsMap, Position},
    BasicBlock, BlockId, Inst, InstId, InstKind, Type, Value, ValueId,
};

pub struct IRCode {
    /// Method identifier, used in diagnostics only.
    pub method: String,
    pub values: PrimaryMap<ValueId, Value>,
    pub insts: PrimaryMap<InstId, Inst>,
    pub blocks: PrimaryMap<BlockId, BasicBlock>,
    /// Layout order of live blocks; the first entry is the entry block.
    pub block_order: Vec<BlockId>,
    defs: SecondaryMap<ValueId, PackedOption<InstId>>,
    next_number: u32,
}

impl IRCode {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            values: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            block_order: Vec::new(),
            defs: SecondaryMap::new(),
            next_number: 0,
        }
    }

    pub fn make_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    /// Create an instruction with a fresh, monotonically increasing number.
    pub fn make_inst(&mut self, kind: InstKind, position: Position) -> InstId {
        let number = self.next_number;
        // Leave gaps the way the allocator numbering does, so spill and
        // resolution moves can be numbered between existing instructions.
        self.next_number += 2;
        let inst = Inst::new(kind, number, position);
        self.insert_inst(inst)
    }

    /// Insert a fully formed instruction, registering its definition.
    pub fn insert_inst(&mut self, inst: Inst) -> InstId {
        self.next_number = self.next_number.max(inst.number + 2);
        let out = inst.out_value();
        let id = self.insts.push(inst);
        if let Some(out) = out {
            debug_assert!(self.defs[out].is_none(), "value defined twice");
            self.defs[out] = id.into();
        }
        id
    }

    /// Create a block in the pool without inserting it into the layout.
    pub fn make_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::new())
    }

    pub fn append_block(&mut self, block: BlockId) {
        debug_assert!(!self.block_order.contains(&block));
        self.block_order.push(block);
    }

    pub fn insert_block_after(&mut self, block: BlockId, after: BlockId) {
        let at = self
            .block_order
            .iter()
            .position(|&b| b == after)
            .expect("anchor block is not in the layout");
        self.block_order.insert(at + 1, block);
    }

    pub fn entry_block(&self) -> BlockId {
        self.block_order[0]
    }

    pub fn inst(&self, inst: InstId) -> &Inst {
        &self.insts[inst]
    }

    pub fn inst_mut(&mut self, inst: InstId) -> &mut Inst {
        &mut self.insts[inst]
    }

    pub fn value(&self, value: ValueId) -> &Value {
        &self.values[value]
    }

    pub fn value_ty(&self, value: ValueId) -> Type {
        self.values[value].ty
    }

    pub fn def_of(&self, value: ValueId) -> Option<InstId> {
        self.defs[value].expand()
    }

    /// Blocks whose terminator is a return, in layout order.
    pub fn compute_normal_exit_blocks(&self) -> Vec<BlockId> {
        self.block_order
            .iter()
            .copied()
            .filter(|&b| {
                let block = &self.blocks[b];
                !block.is_empty() && self.insts[block.exit()].is_return()
            })
            .collect()
    }

    /// Highest block number among live blocks.
    pub fn max_block_number(&self) -> u32 {
        self.block_order
            .iter()
            .map(|b| b.0)
            .max()
            .expect("code has no blocks")
    }

    /// The position a block reports: its terminator's position.
    pub fn block_position(&self, block: BlockId) -> Position {
        self.insts[self.blocks[block].exit()].position
    }

    /// `goto` target: the lone normal successor.
    pub fn goto_target(&self, block: BlockId) -> BlockId {
        self.blocks[block].normal_successors()[0]
    }

    /// `if` targets in (then, else) order.
    pub fn if_targets(&self, block: BlockId) -> (BlockId, BlockId) {
        let succs = self.blocks[block].normal_successors();
        (succs[0], succs[1])
    }

    // ---------------------------------------------------------------------
    // Throwing predicates. Instance-level refinement needs the def table,
    // which is why these live here rather than on `Inst`.

    /// Can any instance of this opcode throw?
    pub fn instruction_type_can_throw(&self, inst: InstId) -> bool {
        match &self.insts[inst].kind {
            InstKind::InvokeStatic { .. } => true,
            InstKind::Binop { op, dest, .. } => {
                op.can_divide_by_zero() && self.value_ty(*dest).is_integral()
            }
            _ => false,
        }
    }

    /// Can this particular instance throw? A division whose divisor is
    /// defined by a non-zero constant cannot.
    pub fn instruction_instance_can_throw(&self, inst: InstId) -> bool {
        if !self.instruction_type_can_throw(inst) {
            return false;
        }
        if let InstKind::Binop { rhs, .. } = &self.insts[inst].kind {
            if let Some(def) = self.def_of(*rhs) {
                if let InstKind::ConstNumber { value, .. } = &self.insts[def].kind {
                    return *value == 0;
                }
            }
        }
        true
    }

    /// Value-equality modulo position and SSA identity: same variant, same
    /// literal payload, and the same output type (so a narrow and a wide
    /// constant of equal bits do not compare equal).
    pub fn identical_non_value_non_position_parts(&self, a: InstId, b: InstId) -> bool {
        let (ia, ib) = (&self.insts[a], &self.insts[b]);
        if !ia.kind.same_non_value_parts(&ib.kind) {
            return false;
        }
        match (ia.out_value(), ib.out_value()) {
            (Some(oa), Some(ob)) => self.value_ty(oa) == self.value_ty(ob),
            (None, None) => true,
            _ => false,
        }
    }

    // ---------------------------------------------------------------------
    // Edge rewiring. Every helper keeps predecessor/successor links
    // symmetric; callers composing lower-level mutations own that invariant
    // themselves.

    /// Mutually link `from -> to` as a normal control-flow edge.
    pub fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].push_normal_successor(to);
        self.blocks[to].preds.push(from);
    }

    /// Remove one normal `from -> to` edge.
    pub fn remove_successor(&mut self, from: BlockId, to: BlockId) {
        let block = &mut self.blocks[from];
        let normal_len = block.succs.len() - block.catch_guards.len();
        let at = block
            .succs
            .iter()
            .position(|&s| s == to)
            .expect("successor link out of sync");
        debug_assert!(at < normal_len, "removing a catch-handler edge");
        block.succs.remove(at);
        self.blocks[to].remove_predecessor(from);
    }

    /// Drop every outgoing edge of `block`, including catch-handler edges.
    pub fn detach_all_successors(&mut self, block: BlockId) {
        let succs = std::mem::take(&mut self.blocks[block].succs);
        for succ in succs {
            self.blocks[succ].remove_predecessor(block);
        }
        self.blocks[block].catch_guards.clear();
    }

    /// Remove one occurrence of `pred` from `block`'s predecessor multiset.
    pub fn remove_predecessor(&mut self, block: BlockId, pred: BlockId) {
        self.blocks[block].remove_predecessor(pred);
    }

    /// Replace every occurrence of `old` in `block`'s successor list with
    /// `new`. Predecessor lists of `old` and `new` are left to the caller.
    pub fn replace_successor(&mut self, block: BlockId, old: BlockId, new: BlockId) {
        for succ in self.blocks[block].succs.iter_mut() {
            if *succ == old {
                *succ = new;
            }
        }
    }

    /// Attach a catch handler to `block`.
    pub fn add_catch_handler(&mut self, block: BlockId, guard: &str, target: BlockId) {
        self.blocks[block].succs.push(target);
        self.blocks[block].catch_guards.push(guard.into());
        self.blocks[target].preds.push(block);
    }

    /// Drop all of `block`'s catch handlers and their edges.
    pub fn clear_catch_handlers(&mut self, block: BlockId) {
        let b = &mut self.blocks[block];
        let normal_len = b.succs.len() - b.catch_guards.len();
        let handlers: Vec<BlockId> = b.succs.drain(normal_len..).collect();
        b.catch_guards.clear();
        for handler in handlers {
            self.blocks[handler].remove_predecessor(block);
        }
    }

    /// Move all catch handlers of `from` onto `to`, rewiring the handler
    /// edges. `to` must not already have handlers.
    pub fn transfer_catch_handlers(&mut self, to: BlockId, from: BlockId) {
        debug_assert!(!self.blocks[to].has_catch_handlers());
        let f = &mut self.blocks[from];
        let normal_len = f.succs.len() - f.catch_guards.len();
        let handlers: Vec<BlockId> = f.succs.drain(normal_len..).collect();
        let guards = std::mem::take(&mut f.catch_guards);
        for (&handler, guard) in handlers.iter().zip(guards) {
            self.blocks[to].succs.push(handler);
            self.blocks[to].catch_guards.push(guard);
            self.blocks[handler].remove_predecessor(from);
            self.blocks[handler].preds.push(to);
        }
    }

    /// Debug-locals state reaching instruction index `index` of `block`:
    /// `locals_at_entry` with the locals changes of `insts[..index]` replayed
    /// in order.
    pub fn locals_before_index(&self, block: BlockId, index: usize) -> Option<LocalsMap> {
        let b = &self.blocks[block];
        let mut locals = b.locals_at_entry.clone()?;
        for &inst in &b.insts[..index] {
            self.insts[inst].apply_locals_change(&mut locals);
        }
        Some(locals)
    }

    /// Debug-locals state reaching the end of `block`.
    pub fn locals_at_exit(&self, block: BlockId) -> Option<LocalsMap> {
        self.locals_before_index(block, self.blocks[block].insts.len())
    }
}
