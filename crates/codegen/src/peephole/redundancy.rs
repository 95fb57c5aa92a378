//! Removal of redundant moves and constant reloads.
//!
//! Runs independently per block: the constant-residency map never flows
//! across block boundaries, since a join's predecessors may leave different
//! constants in the same register.

use rustc_hash::FxHashMap;

use dexc_ir::{IRCode, InstId};

use crate::regalloc::RegisterAllocator;

use super::move_eliminator::MoveEliminator;

pub fn remove_redundant_instructions(code: &mut IRCode, allocator: &dyn RegisterAllocator) {
    for index in 0..code.block_order.len() {
        let block = code.block_order[index];

        // register -> const instruction whose result is resident there.
        let mut register_to_number: FxHashMap<u32, InstId> = FxHashMap::default();
        let mut move_eliminator = MoveEliminator::new(allocator);

        let insts = std::mem::take(&mut code.blocks[block].insts);
        let mut kept = Vec::with_capacity(insts.len());
        for inst in insts {
            if move_eliminator.should_be_eliminated(code, inst) {
                continue;
            }
            let data = code.inst(inst);
            let Some(out) = data.out_value() else {
                kept.push(inst);
                continue;
            };
            if !code.value(out).needs_register {
                kept.push(inst);
                continue;
            }

            let number = data.number;
            if data.is_const_number() {
                if constant_spilled_at_definition(code, inst, allocator) {
                    // The allocator decided not to keep this definition in a
                    // register; it will be rematerialized on demand.
                    continue;
                }
                let register = allocator.register_for_value(out, number);
                if let Some(&resident) = register_to_number.get(&register) {
                    if code.identical_non_value_non_position_parts(resident, inst) {
                        // The same constant is already in this register.
                        continue;
                    }
                }
                register_to_number.insert(register, inst);
                if code.value(out).ty.is_wide() {
                    register_to_number.remove(&(register + 1));
                }
                remove_wide_constant_covering(code, &mut register_to_number, register);
            } else {
                let register = allocator.register_for_value(out, number);
                for i in 0..code.value(out).required_registers() {
                    register_to_number.remove(&(register + i));
                }
                remove_wide_constant_covering(code, &mut register_to_number, register);
            }
            kept.push(inst);
        }
        code.blocks[block].insts = kept;
    }
}

/// A write to `register` clobbers the upper half of any wide constant
/// resident at `register - 1`.
fn remove_wide_constant_covering(
    code: &IRCode,
    register_to_number: &mut FxHashMap<u32, InstId>,
    register: u32,
) {
    let Some(below) = register.checked_sub(1) else {
        return;
    };
    if let Some(&resident) = register_to_number.get(&below) {
        let out = code.inst(resident).out_value().unwrap();
        if code.value(out).ty.is_wide() {
            register_to_number.remove(&below);
        }
    }
}

fn constant_spilled_at_definition(
    code: &IRCode,
    inst: InstId,
    allocator: &dyn RegisterAllocator,
) -> bool {
    let data = code.inst(inst);
    let out = data.out_value().unwrap();
    if code.value(out).is_fixed_register_value() {
        return false;
    }
    allocator.is_spilled_and_rematerializable(out, data.number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regalloc::{IntervalSplit, RegisterMapping};
    use crate::settings::CodegenOptions;
    use dexc_ir::{CodeBuilder, Type};

    #[test]
    fn removes_self_move() {
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Int);
        let v1 = builder.make_value(Type::Int);
        builder.switch_to_block(b0);
        let konst = builder.const_number(v0, 5);
        builder.mov(v1, v0);
        let ret = builder.ret(Some(v1));
        let mut code = builder.finish();

        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.set_register(v0, 1);
        mapping.set_register(v1, 1);

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts, vec![konst, ret]);
    }

    #[test]
    fn removes_redundant_constant_reload() {
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Int);
        let v1 = builder.make_value(Type::Int);
        let v2 = builder.make_value(Type::Int);
        let v3 = builder.make_value(Type::Int);
        builder.switch_to_block(b0);
        let first = builder.const_number(v0, 7);
        let use0 = builder.mov(v1, v0);
        builder.const_number(v2, 7);
        let use1 = builder.mov(v3, v2);
        let ret = builder.ret(None);
        let mut code = builder.finish();

        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.set_register(v0, 3);
        mapping.set_register(v1, 0);
        mapping.set_register(v2, 3);
        mapping.set_register(v3, 1);

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts, vec![first, use0, use1, ret]);
    }

    #[test]
    fn reload_with_different_value_stays() {
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Int);
        let v1 = builder.make_value(Type::Int);
        builder.switch_to_block(b0);
        let first = builder.const_number(v0, 7);
        let second = builder.const_number(v1, 8);
        let ret = builder.ret(Some(v1));
        let mut code = builder.finish();

        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.set_register(v0, 3);
        mapping.set_register(v1, 3);

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts, vec![first, second, ret]);
    }

    #[test]
    fn wide_write_clobbers_overlapping_constants() {
        // const r3 <- 7; const wide (r2, r3) <- 7; const r3 <- 7:
        // the final narrow reload must survive, the wide write killed r3.
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Int);
        let v1 = builder.make_value(Type::Long);
        let v2 = builder.make_value(Type::Int);
        builder.switch_to_block(b0);
        builder.const_number(v0, 7);
        builder.const_number(v1, 7);
        builder.const_number(v2, 7);
        builder.ret(None);
        let mut code = builder.finish();

        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.set_register(v0, 3);
        mapping.set_register(v1, 2);
        mapping.set_register(v2, 3);

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts.len(), 4);
    }

    #[test]
    fn narrow_write_clobbers_wide_constant_below() {
        // const wide (r2, r3) <- 9; const r2 <- 1; const wide (r2, r3) <- 9:
        // the narrow write to r2 killed the wide constant, so the reload
        // must survive.
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Long);
        let v1 = builder.make_value(Type::Int);
        let v2 = builder.make_value(Type::Long);
        builder.switch_to_block(b0);
        builder.const_number(v0, 9);
        builder.const_number(v1, 1);
        builder.const_number(v2, 9);
        builder.ret(None);
        let mut code = builder.finish();

        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.set_register(v0, 2);
        mapping.set_register(v1, 2);
        mapping.set_register(v2, 2);

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts.len(), 4);
    }

    #[test]
    fn wide_constant_reload_is_removed() {
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Long);
        let v1 = builder.make_value(Type::Long);
        builder.switch_to_block(b0);
        let first = builder.const_number(v0, 9);
        builder.const_number(v1, 9);
        let ret = builder.ret(None);
        let mut code = builder.finish();

        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.set_register(v0, 2);
        mapping.set_register(v1, 2);

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts, vec![first, ret]);
    }

    #[test]
    fn narrow_and_wide_constants_do_not_match() {
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Int);
        let v1 = builder.make_value(Type::Long);
        builder.switch_to_block(b0);
        builder.const_number(v0, 9);
        builder.const_number(v1, 9);
        builder.ret(None);
        let mut code = builder.finish();

        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.set_register(v0, 2);
        mapping.set_register(v1, 2);

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts.len(), 3);
    }

    #[test]
    fn spilled_rematerializable_constant_is_dropped() {
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_value(Type::Int);
        builder.switch_to_block(b0);
        let konst = builder.const_number(v0, 42);
        let ret = builder.ret(None);
        let mut code = builder.finish();

        let number = code.inst(konst).number;
        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.add_split(
            v0,
            IntervalSplit {
                start: number,
                end: number + 2,
                register: 0,
                spilled_and_rematerializable: true,
            },
        );

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts, vec![ret]);
    }

    #[test]
    fn fixed_register_constant_is_kept() {
        let mut builder = CodeBuilder::new("test");
        let b0 = builder.make_block();
        let v0 = builder.make_fixed_value(Type::Int, 0);
        builder.switch_to_block(b0);
        let konst = builder.const_number(v0, 42);
        let ret = builder.ret(None);
        let mut code = builder.finish();

        let number = code.inst(konst).number;
        let mut mapping = RegisterMapping::new(CodegenOptions::release());
        mapping.add_split(
            v0,
            IntervalSplit {
                start: number,
                end: number + 2,
                register: 0,
                spilled_and_rematerializable: true,
            },
        );

        remove_redundant_instructions(&mut code, &mapping);
        assert_eq!(code.blocks[b0].insts, vec![konst, ret]);
    }
}
