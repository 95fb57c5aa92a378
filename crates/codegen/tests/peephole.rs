//! End-to-end tests driving the whole peephole pipeline through `optimize`.

use dexc_codegen::peephole::{optimize, remove_identical_predecessor_blocks};
use dexc_codegen::regalloc::RegisterMapping;
use dexc_codegen::settings::CodegenOptions;
use dexc_ir::{BlockId, CodeBuilder, IRCode, IfKind, Type};

fn release_mapping() -> RegisterMapping {
    RegisterMapping::new(CodegenOptions::release())
}

/// Block-structure fingerprint used by the idempotence checks.
fn shape(code: &IRCode) -> Vec<(BlockId, usize)> {
    code.block_order
        .iter()
        .map(|&b| (b, code.blocks[b].insts.len()))
        .collect()
}

#[test]
fn removes_self_move() {
    let mut builder = CodeBuilder::new("selfMove()I");
    let mut mapping = release_mapping();
    let v0 = builder.make_value(Type::Int);
    let v1 = builder.make_value(Type::Int);
    mapping.set_register(v0, 1);
    mapping.set_register(v1, 1);

    let b0 = builder.make_block();
    builder.switch_to_block(b0);
    let konst = builder.const_number(v0, 5);
    builder.mov(v1, v0);
    let ret = builder.ret(Some(v1));
    let mut code = builder.finish();

    optimize(&mut code, &mut mapping);

    assert_eq!(code.blocks[b0].insts, vec![konst, ret]);
}

#[test]
fn removes_redundant_constant_reload() {
    let mut builder = CodeBuilder::new("reload()V");
    let mut mapping = release_mapping();
    let v0 = builder.make_value(Type::Int);
    let v1 = builder.make_value(Type::Int);
    let v2 = builder.make_value(Type::Int);
    let v3 = builder.make_value(Type::Int);
    mapping.set_register(v0, 3);
    mapping.set_register(v1, 0);
    mapping.set_register(v2, 3);
    mapping.set_register(v3, 1);

    let b0 = builder.make_block();
    builder.switch_to_block(b0);
    let first = builder.const_number(v0, 7);
    let use0 = builder.mov(v1, v0);
    builder.const_number(v2, 7);
    let use1 = builder.mov(v3, v2);
    let ret = builder.ret(None);
    let mut code = builder.finish();

    optimize(&mut code, &mut mapping);

    // The second `const r3, 7` is gone; its use reads the resident value.
    assert_eq!(code.blocks[b0].insts, vec![first, use0, use1, ret]);
}

#[test]
fn merges_identical_predecessors() {
    let mut builder = CodeBuilder::new("identicalPreds()V");
    let mut mapping = release_mapping();
    let v_cond = builder.make_value(Type::Int);
    let v0 = builder.make_value(Type::Int);
    let v1 = builder.make_value(Type::Int);
    let v2 = builder.make_value(Type::Int);
    mapping.set_register(v_cond, 2);
    mapping.set_register(v0, 1);
    mapping.set_register(v1, 0);
    mapping.set_register(v2, 0);

    let entry = builder.make_block();
    let p1 = builder.make_block();
    let p2 = builder.make_block();
    let join = builder.make_block();

    builder.switch_to_block(entry);
    builder.const_number(v_cond, 0);
    builder.const_number(v0, 1);
    builder.if_(IfKind::Eq, &[v_cond]);
    builder.switch_to_block(p1);
    builder.mov(v1, v0);
    builder.goto();
    builder.switch_to_block(p2);
    builder.mov(v2, v0);
    builder.goto();
    builder.switch_to_block(join);
    builder.ret(None);

    builder.link(entry, p1);
    builder.link(entry, p2);
    builder.link(p1, join);
    builder.link(p2, join);
    let mut code = builder.finish();

    optimize(&mut code, &mut mapping);

    // p2 forwards to p1; p1 is untouched.
    assert_eq!(code.blocks[p2].insts.len(), 1);
    assert!(code.inst(code.blocks[p2].exit()).is_goto());
    assert_eq!(code.goto_target(p2), p1);
    assert_eq!(code.blocks[p1].insts.len(), 2);
    assert_eq!(code.blocks[join].preds.as_slice(), &[p1]);
}

#[test]
fn hoists_common_successor_prefix() {
    let mut builder = CodeBuilder::new("prefix()V");
    let mut mapping = release_mapping();
    let v_cond = builder.make_value(Type::Int);
    let v_acc = builder.make_value(Type::Int);
    mapping.set_register(v_cond, 0);
    mapping.set_register(v_acc, 3);

    let entry = builder.make_block();
    let s = builder.make_block();
    let t = builder.make_block();
    let join = builder.make_block();

    builder.switch_to_block(entry);
    builder.const_number(v_cond, 0);
    builder.const_number(v_acc, 0);
    builder.if_(IfKind::Eq, &[v_cond]);

    let mut arm = |builder: &mut CodeBuilder, mapping: &mut RegisterMapping, unique: i64| {
        let v_three = builder.make_value(Type::Int);
        let v_sum = builder.make_value(Type::Int);
        let v_rest = builder.make_value(Type::Int);
        mapping.set_register(v_three, 2);
        mapping.set_register(v_sum, 3);
        mapping.set_register(v_rest, 4);
        builder.const_number(v_three, 3);
        builder.binop(dexc_ir::BinopKind::Add, v_sum, v_acc, v_three);
        builder.const_number(v_rest, unique);
        builder.goto();
    };
    builder.switch_to_block(s);
    arm(&mut builder, &mut mapping, 10);
    builder.switch_to_block(t);
    arm(&mut builder, &mut mapping, 20);

    builder.switch_to_block(join);
    builder.ret(None);

    builder.link(entry, s);
    builder.link(entry, t);
    builder.link(s, join);
    builder.link(t, join);
    let mut code = builder.finish();

    optimize(&mut code, &mut mapping);

    // `const r2, 3; add r3 <- r3, r2` now sit ahead of the branch.
    assert_eq!(code.blocks[entry].insts.len(), 5);
    assert_eq!(code.blocks[s].insts.len(), 2);
    assert_eq!(code.blocks[t].insts.len(), 2);
    assert!(matches!(
        code.inst(code.blocks[entry].exit()).kind,
        dexc_ir::InstKind::If { .. }
    ));
}

#[test]
fn throwing_prefix_stays_out_of_handler_scope() {
    let mut builder = CodeBuilder::new("prefixThrow()V");
    let mut mapping = release_mapping();
    let v_cond = builder.make_value(Type::Int);
    let v_acc = builder.make_value(Type::Int);
    mapping.set_register(v_cond, 0);
    mapping.set_register(v_acc, 3);

    let entry = builder.make_block();
    let s = builder.make_block();
    let t = builder.make_block();
    let join = builder.make_block();
    let handler = builder.make_block();

    builder.switch_to_block(entry);
    builder.const_number(v_cond, 0);
    builder.const_number(v_acc, 0);
    builder.if_(IfKind::Eq, &[v_cond]);

    // Both arms start with the same divide, which can throw.
    let mut arm = |builder: &mut CodeBuilder, mapping: &mut RegisterMapping, unique: i64| {
        let v_quot = builder.make_value(Type::Int);
        let v_rest = builder.make_value(Type::Int);
        mapping.set_register(v_quot, 2);
        mapping.set_register(v_rest, 4);
        builder.binop(dexc_ir::BinopKind::Div, v_quot, v_acc, v_cond);
        builder.const_number(v_rest, unique);
        builder.goto();
    };
    builder.switch_to_block(s);
    arm(&mut builder, &mut mapping, 10);
    builder.switch_to_block(t);
    arm(&mut builder, &mut mapping, 20);

    builder.switch_to_block(join);
    builder.ret(None);
    builder.switch_to_block(handler);
    builder.ret(None);

    builder.link(entry, s);
    builder.link(entry, t);
    builder.link(s, join);
    builder.link(t, join);
    builder.add_catch_handler(entry, "Ljava/lang/ArithmeticException;", handler);
    let mut code = builder.finish();

    let s_len = code.blocks[s].insts.len();
    optimize(&mut code, &mut mapping);

    // The divide may not move under the entry block's handler.
    assert_eq!(code.blocks[entry].insts.len(), 3);
    assert_eq!(code.blocks[s].insts.len(), s_len);
}

/// Four predecessors of a join, each ending with the same five instructions
/// before the goto.
fn four_way_shared_suffix() -> (IRCode, RegisterMapping, Vec<BlockId>, BlockId) {
    let mut builder = CodeBuilder::new("suffix()V");
    let mut mapping = release_mapping();
    let v_c0 = builder.make_value(Type::Int);
    let v_c1 = builder.make_value(Type::Int);
    let v_c2 = builder.make_value(Type::Int);
    mapping.set_register(v_c0, 0);
    mapping.set_register(v_c1, 0);
    mapping.set_register(v_c2, 0);

    let entry = builder.make_block();
    let a = builder.make_block();
    let b = builder.make_block();
    let preds: Vec<BlockId> = (0..4).map(|_| builder.make_block()).collect();
    let join = builder.make_block();

    builder.switch_to_block(entry);
    builder.const_number(v_c0, 0);
    builder.if_(IfKind::Eq, &[v_c0]);
    builder.switch_to_block(a);
    builder.const_number(v_c1, 0);
    builder.if_(IfKind::Eq, &[v_c1]);
    builder.switch_to_block(b);
    builder.const_number(v_c2, 0);
    builder.if_(IfKind::Eq, &[v_c2]);

    for (i, &pred) in preds.iter().enumerate() {
        builder.switch_to_block(pred);
        let v_own = builder.make_value(Type::Int);
        mapping.set_register(v_own, 9);
        builder.const_number(v_own, 100 + i as i64);
        for register in 1..=5 {
            let v = builder.make_value(Type::Int);
            mapping.set_register(v, register);
            builder.const_number(v, register as i64);
        }
        builder.goto();
        builder.link(pred, join);
    }

    builder.switch_to_block(join);
    builder.ret(None);

    builder.link(entry, a);
    builder.link(entry, b);
    builder.link(a, preds[0]);
    builder.link(a, preds[1]);
    builder.link(b, preds[2]);
    builder.link(b, preds[3]);

    (builder.finish(), mapping, preds, join)
}

#[test]
fn extracts_shared_suffix_into_new_block() {
    let (mut code, mut mapping, preds, join) = four_way_shared_suffix();
    let max_before = code.max_block_number();
    let blocks_before = code.block_order.len();

    optimize(&mut code, &mut mapping);

    assert_eq!(code.block_order.len(), blocks_before + 1);
    let new_block = code
        .block_order
        .iter()
        .copied()
        .find(|b| b.0 > max_before)
        .unwrap();
    assert_eq!(new_block.0, max_before + 1);

    // Five shared instructions plus the goto.
    assert_eq!(code.blocks[new_block].insts.len(), 6);
    assert_eq!(code.goto_target(new_block), join);
    assert_eq!(code.blocks[join].preds.as_slice(), &[new_block]);
    for &pred in &preds {
        assert_eq!(code.blocks[pred].insts.len(), 2);
        assert!(code.inst(code.blocks[pred].exit()).is_goto());
        assert_eq!(code.goto_target(pred), new_block);
    }
}

#[test]
fn optimize_is_idempotent() {
    let (mut code, mut mapping, _, _) = four_way_shared_suffix();
    optimize(&mut code, &mut mapping);
    let first = shape(&code);

    optimize(&mut code, &mut mapping);
    assert_eq!(shape(&code), first);
}

#[test]
fn predecessor_merge_reaches_fixed_point() {
    let mut builder = CodeBuilder::new("fixedPoint()V");
    let mut mapping = release_mapping();
    let v_cond = builder.make_value(Type::Int);
    let v0 = builder.make_value(Type::Int);
    let v1 = builder.make_value(Type::Int);
    mapping.set_register(v_cond, 2);
    mapping.set_register(v0, 1);
    mapping.set_register(v1, 1);

    let entry = builder.make_block();
    let p1 = builder.make_block();
    let p2 = builder.make_block();
    let join = builder.make_block();

    builder.switch_to_block(entry);
    builder.const_number(v_cond, 0);
    builder.if_(IfKind::Eq, &[v_cond]);
    builder.switch_to_block(p1);
    builder.const_number(v0, 1);
    builder.goto();
    builder.switch_to_block(p2);
    builder.const_number(v1, 1);
    builder.goto();
    builder.switch_to_block(join);
    builder.ret(None);

    builder.link(entry, p1);
    builder.link(entry, p2);
    builder.link(p1, join);
    builder.link(p2, join);
    let mut code = builder.finish();

    optimize(&mut code, &mut mapping);
    let first = shape(&code);

    // Running the merge phase again on the optimized graph finds nothing.
    remove_identical_predecessor_blocks(&mut code, &mut mapping);
    assert_eq!(shape(&code), first);
}
