//! Instruction and block equality modulo the register assignment.
//!
//! Two instructions are equivalent when they have the same opcode, the same
//! literal payload, the same operand widths, and resolve to the same physical
//! registers at each instruction's own number. Positions and debug values are
//! ignored; callers that need position exactness filter separately.
//! Terminators additionally require the same branch targets.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use dexc_ir::{BlockId, IRCode, InstId, InstKind};

use crate::regalloc::RegisterAllocator;

/// Equality implemented on instructions using the allocator's assignment.
/// `*_owner` is the block holding each instruction; terminators read their
/// branch targets from it.
pub fn identical_after_register_allocation(
    code: &IRCode,
    a_owner: BlockId,
    a: InstId,
    b_owner: BlockId,
    b: InstId,
    allocator: &dyn RegisterAllocator,
) -> bool {
    if !code.identical_non_value_non_position_parts(a, b) {
        return false;
    }

    let (ia, ib) = (code.inst(a), code.inst(b));

    if let (Some(oa), Some(ob)) = (ia.out_value(), ib.out_value()) {
        let (va, vb) = (code.value(oa), code.value(ob));
        if va.needs_register != vb.needs_register {
            return false;
        }
        if va.needs_register {
            if va.required_registers() != vb.required_registers() {
                return false;
            }
            if allocator.register_for_value(oa, ia.number)
                != allocator.register_for_value(ob, ib.number)
            {
                return false;
            }
        }
    }

    let (ins_a, ins_b) = (ia.in_values(), ib.in_values());
    if ins_a.len() != ins_b.len() {
        return false;
    }
    for (&xa, &xb) in ins_a.iter().zip(ins_b.iter()) {
        let (va, vb) = (code.value(xa), code.value(xb));
        if va.needs_register != vb.needs_register {
            return false;
        }
        if va.needs_register {
            if va.required_registers() != vb.required_registers() {
                return false;
            }
            if allocator.register_for_value(xa, ia.number)
                != allocator.register_for_value(xb, ib.number)
            {
                return false;
            }
        } else if xa != xb {
            return false;
        }
    }

    // Branch targets live on the owner blocks, not the instruction.
    match ia.kind {
        InstKind::Goto => code.goto_target(a_owner) == code.goto_target(b_owner),
        InstKind::If { .. } => code.if_targets(a_owner) == code.if_targets(b_owner),
        _ => true,
    }
}

/// Hash/equality wrapper used to bucket instructions. Hash collisions are
/// resolved by [`identical_after_register_allocation`], so buckets keyed by
/// the hash must verify membership with [`InstructionEquivalence::equivalent`].
pub struct InstructionEquivalence<'a> {
    code: &'a IRCode,
    allocator: &'a dyn RegisterAllocator,
}

impl<'a> InstructionEquivalence<'a> {
    pub fn new(code: &'a IRCode, allocator: &'a dyn RegisterAllocator) -> Self {
        Self { code, allocator }
    }

    pub fn equivalent(&self, a_owner: BlockId, a: InstId, b_owner: BlockId, b: InstId) -> bool {
        identical_after_register_allocation(self.code, a_owner, a, b_owner, b, self.allocator)
    }

    pub fn hash(&self, owner: BlockId, inst: InstId) -> u64 {
        let mut h = FxHasher::default();
        let data = self.code.inst(inst);

        std::mem::discriminant(&data.kind).hash(&mut h);
        match &data.kind {
            InstKind::Move { .. } | InstKind::Goto => {}
            InstKind::ConstNumber { value, .. } => value.hash(&mut h),
            InstKind::Binop { op, .. } => op.hash(&mut h),
            InstKind::InvokeStatic { method, args, .. } => {
                method.hash(&mut h);
                args.len().hash(&mut h);
            }
            InstKind::If { op, args } => {
                op.hash(&mut h);
                args.len().hash(&mut h);
            }
            InstKind::Return { value } => value.is_some().hash(&mut h),
            InstKind::DebugLocalsChange { ending, starting } => {
                ending.hash(&mut h);
                starting.hash(&mut h);
            }
        }

        if let Some(out) = data.out_value() {
            let value = self.code.value(out);
            value.required_registers().hash(&mut h);
            if value.needs_register {
                self.allocator
                    .register_for_value(out, data.number)
                    .hash(&mut h);
            }
        }
        data.for_each_in_value(|v| {
            let value = self.code.value(v);
            value.required_registers().hash(&mut h);
            if value.needs_register {
                self.allocator
                    .register_for_value(v, data.number)
                    .hash(&mut h);
            }
        });

        match data.kind {
            InstKind::Goto => self.code.goto_target(owner).hash(&mut h),
            InstKind::If { .. } => self.code.if_targets(owner).hash(&mut h),
            _ => {}
        }

        h.finish()
    }
}

/// Whole-block equality: same code (all instructions, terminator included)
/// and the same successors, catch handlers included.
pub struct BasicBlockEquivalence<'a> {
    insts: InstructionEquivalence<'a>,
    code: &'a IRCode,
}

impl<'a> BasicBlockEquivalence<'a> {
    pub fn new(code: &'a IRCode, allocator: &'a dyn RegisterAllocator) -> Self {
        Self {
            insts: InstructionEquivalence::new(code, allocator),
            code,
        }
    }

    pub fn equivalent(&self, a: BlockId, b: BlockId) -> bool {
        let (ba, bb) = (&self.code.blocks[a], &self.code.blocks[b]);
        if ba.succs != bb.succs || ba.catch_guards != bb.catch_guards {
            return false;
        }
        if ba.insts.len() != bb.insts.len() {
            return false;
        }
        ba.insts
            .iter()
            .zip(bb.insts.iter())
            .all(|(&ia, &ib)| self.insts.equivalent(a, ia, b, ib))
    }

    pub fn hash(&self, block: BlockId) -> u64 {
        let mut h = FxHasher::default();
        let b = &self.code.blocks[block];
        b.succs.hash(&mut h);
        b.catch_guards.hash(&mut h);
        for &inst in &b.insts {
            self.insts.hash(block, inst).hash(&mut h);
        }
        h.finish()
    }
}
