//! Construction helpers for register-colored IR.
//!
//! The builder appends instructions to a current block, numbering them in
//! ascending order the way the allocator numbering contract requires.

use smallvec::SmallVec;

use crate::{
    debuginfo::{LocalsMap, Position},
    BinopKind, BlockId, IRCode, IfKind, InstId, InstKind, Type, Value, ValueId,
};

pub struct CodeBuilder {
    code: IRCode,
    current: Option<BlockId>,
    position: Position,
}

impl CodeBuilder {
    pub fn new(method: &str) -> Self {
        Self {
            code: IRCode::new(method),
            current: None,
            position: Position::None,
        }
    }

    pub fn make_value(&mut self, ty: Type) -> ValueId {
        self.code.make_value(Value::new(ty))
    }

    pub fn make_fixed_value(&mut self, ty: Type, register: u32) -> ValueId {
        self.code.make_value(Value::fixed(ty, register))
    }

    /// Create a block and append it to the layout.
    pub fn make_block(&mut self) -> BlockId {
        let block = self.code.make_block();
        self.code.append_block(block);
        block
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    /// Position attached to subsequently appended instructions.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn append(&mut self, kind: InstKind) -> InstId {
        let block = self.current.expect("no current block");
        let inst = self.code.make_inst(kind, self.position);
        self.code.blocks[block].insts.push(inst);
        inst
    }

    pub fn const_number(&mut self, dest: ValueId, value: i64) -> InstId {
        self.append(InstKind::ConstNumber { dest, value })
    }

    pub fn mov(&mut self, dest: ValueId, src: ValueId) -> InstId {
        self.append(InstKind::Move { dest, src })
    }

    pub fn binop(&mut self, op: BinopKind, dest: ValueId, lhs: ValueId, rhs: ValueId) -> InstId {
        self.append(InstKind::Binop { op, dest, lhs, rhs })
    }

    pub fn invoke_static(&mut self, dest: Option<ValueId>, method: &str, args: &[ValueId]) -> InstId {
        self.append(InstKind::InvokeStatic {
            dest,
            args: args.iter().copied().collect(),
            method: method.into(),
        })
    }

    /// Conditional branch; targets are the current block's first two normal
    /// successors, to be wired with [`CodeBuilder::link`].
    pub fn if_(&mut self, op: IfKind, args: &[ValueId]) -> InstId {
        let args: SmallVec<[ValueId; 2]> = args.iter().copied().collect();
        debug_assert!(matches!(args.len(), 1 | 2));
        self.append(InstKind::If { op, args })
    }

    pub fn goto(&mut self) -> InstId {
        self.append(InstKind::Goto)
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> InstId {
        self.append(InstKind::Return { value })
    }

    pub fn locals_change(&mut self, ending: LocalsMap, starting: LocalsMap) -> InstId {
        self.append(InstKind::DebugLocalsChange { ending, starting })
    }

    /// Keep `value` alive across `inst` for the debugger.
    pub fn attach_debug_value(&mut self, inst: InstId, value: ValueId) {
        self.code.insts[inst].debug_values.push(value);
    }

    pub fn link(&mut self, from: BlockId, to: BlockId) {
        self.code.link(from, to);
    }

    pub fn add_catch_handler(&mut self, block: BlockId, guard: &str, target: BlockId) {
        self.code.add_catch_handler(block, guard, target);
    }

    pub fn set_locals_at_entry(&mut self, block: BlockId, locals: LocalsMap) {
        self.code.blocks[block].locals_at_entry = Some(locals);
    }

    pub fn code(&self) -> &IRCode {
        &self.code
    }

    pub fn finish(self) -> IRCode {
        self.code
    }
}

pub mod test_util {
    use crate::debuginfo::{DebugLocalInfo, LocalsMap};

    /// Build a locals map from `(register, name, type)` triples.
    pub fn locals(entries: &[(u32, &str, &str)]) -> LocalsMap {
        entries
            .iter()
            .map(|&(register, name, ty)| (register, DebugLocalInfo::new(name, ty)))
            .collect()
    }
}
