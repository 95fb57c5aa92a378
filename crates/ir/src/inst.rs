//! Register-colored IR instructions.
//!
//! The opcode set is a closed tagged union. Branch targets are not stored on
//! the instruction: a `Goto` jumps to its block's lone normal successor and
//! an `If` to the block's first two normal successors, so rewiring control
//! flow is purely an edge-list operation.

use cranelift_entity::entity_impl;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    debuginfo::{apply_locals_change, LocalsMap, Position},
    ValueId,
};

/// An opaque reference to an [`Inst`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct InstId(pub u32);
entity_impl!(InstId, "inst");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinopKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinopKind {
    /// Division and remainder trap on a zero divisor (for integral types).
    pub fn can_divide_by_zero(self) -> bool {
        matches!(self, Self::Div | Self::Rem)
    }
}

/// Comparison performed by an [`InstKind::If`] terminator. One argument
/// compares against zero, two arguments compare registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IfKind {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Move {
        dest: ValueId,
        src: ValueId,
    },
    ConstNumber {
        dest: ValueId,
        value: i64,
    },
    Binop {
        op: BinopKind,
        dest: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    InvokeStatic {
        dest: Option<ValueId>,
        args: SmallVec<[ValueId; 4]>,
        method: SmolStr,
    },
    If {
        op: IfKind,
        args: SmallVec<[ValueId; 2]>,
    },
    Goto,
    Return {
        value: Option<ValueId>,
    },
    /// No-op that updates the debugger's view of which locals are live.
    DebugLocalsChange {
        ending: LocalsMap,
        starting: LocalsMap,
    },
}

impl InstKind {
    /// Same variant and same non-value payload (literal constant, opcode
    /// kind, callee). Values, positions and types are not compared here.
    pub fn same_non_value_parts(&self, other: &InstKind) -> bool {
        match (self, other) {
            (InstKind::Move { .. }, InstKind::Move { .. }) => true,
            (InstKind::ConstNumber { value: a, .. }, InstKind::ConstNumber { value: b, .. }) => {
                a == b
            }
            (InstKind::Binop { op: a, .. }, InstKind::Binop { op: b, .. }) => a == b,
            (
                InstKind::InvokeStatic {
                    method: a, args: xs, ..
                },
                InstKind::InvokeStatic {
                    method: b, args: ys, ..
                },
            ) => a == b && xs.len() == ys.len(),
            (InstKind::If { op: a, args: xs }, InstKind::If { op: b, args: ys }) => {
                a == b && xs.len() == ys.len()
            }
            (InstKind::Goto, InstKind::Goto) => true,
            (InstKind::Return { value: a }, InstKind::Return { value: b }) => {
                a.is_some() == b.is_some()
            }
            (
                InstKind::DebugLocalsChange {
                    ending: ea,
                    starting: sa,
                },
                InstKind::DebugLocalsChange {
                    ending: eb,
                    starting: sb,
                },
            ) => ea == eb && sa == sb,
            _ => false,
        }
    }
}

/// An instruction node in a block's ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub kind: InstKind,
    /// Allocation-time position key. The register allocator's mapping is
    /// keyed by these numbers, so they survive every structural rewrite.
    pub number: u32,
    pub position: Position,
    /// No-op dependencies kept alive for the debugger.
    pub debug_values: SmallVec<[ValueId; 2]>,
}

impl Inst {
    pub fn new(kind: InstKind, number: u32, position: Position) -> Self {
        Self {
            kind,
            number,
            position,
            debug_values: SmallVec::new(),
        }
    }

    pub fn out_value(&self) -> Option<ValueId> {
        match &self.kind {
            InstKind::Move { dest, .. }
            | InstKind::ConstNumber { dest, .. }
            | InstKind::Binop { dest, .. } => Some(*dest),
            InstKind::InvokeStatic { dest, .. } => *dest,
            InstKind::If { .. }
            | InstKind::Goto
            | InstKind::Return { .. }
            | InstKind::DebugLocalsChange { .. } => None,
        }
    }

    pub fn for_each_in_value(&self, mut f: impl FnMut(ValueId)) {
        match &self.kind {
            InstKind::Move { src, .. } => f(*src),
            InstKind::ConstNumber { .. } => {}
            InstKind::Binop { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            InstKind::InvokeStatic { args, .. } => args.iter().copied().for_each(f),
            InstKind::If { args, .. } => args.iter().copied().for_each(f),
            InstKind::Goto => {}
            InstKind::Return { value } => {
                if let Some(value) = value {
                    f(*value)
                }
            }
            InstKind::DebugLocalsChange { .. } => {}
        }
    }

    pub fn in_values(&self) -> SmallVec<[ValueId; 4]> {
        let mut values = SmallVec::new();
        self.for_each_in_value(|v| values.push(v));
        values
    }

    pub fn is_move(&self) -> bool {
        matches!(self.kind, InstKind::Move { .. })
    }

    pub fn is_const_number(&self) -> bool {
        matches!(self.kind, InstKind::ConstNumber { .. })
    }

    pub fn is_goto(&self) -> bool {
        matches!(self.kind, InstKind::Goto)
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, InstKind::Return { .. })
    }

    pub fn is_debug_locals_change(&self) -> bool {
        matches!(self.kind, InstKind::DebugLocalsChange { .. })
    }

    /// Terminators: the only instructions allowed in a block's last slot.
    pub fn is_jump(&self) -> bool {
        matches!(
            self.kind,
            InstKind::If { .. } | InstKind::Goto | InstKind::Return { .. }
        )
    }

    /// Apply this instruction's locals delta to `locals`. No-op unless this
    /// is a [`InstKind::DebugLocalsChange`].
    pub fn apply_locals_change(&self, locals: &mut LocalsMap) {
        if let InstKind::DebugLocalsChange { ending, starting } = &self.kind {
            apply_locals_change(ending, starting, locals);
        }
    }
}
