//! SSA value definitions.

use cranelift_entity::entity_impl;

use crate::Type;

/// An opaque reference to a [`Value`]. The index is the SSA value number.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct ValueId(pub u32);
entity_impl!(ValueId, "v");

/// An SSA result.
///
/// Everything the register allocator decided about a value lives on the
/// allocator side (live intervals, assigned registers); the IR only records
/// the attributes that are fixed before allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub ty: Type,
    /// Whether the value must reside in a machine register at all. Values
    /// that only feed debug info do not.
    pub needs_register: bool,
    /// Register pinned by an ABI or debugger constraint, if any. A pinned
    /// definition is never considered spilled at its definition point.
    pub fixed_register: Option<u32>,
}

impl Value {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            needs_register: true,
            fixed_register: None,
        }
    }

    pub fn fixed(ty: Type, register: u32) -> Self {
        Self {
            ty,
            needs_register: true,
            fixed_register: Some(register),
        }
    }

    pub fn debug_only(ty: Type) -> Self {
        Self {
            ty,
            needs_register: false,
            fixed_register: None,
        }
    }

    pub fn required_registers(&self) -> u32 {
        self.ty.required_registers()
    }

    pub fn is_fixed_register_value(&self) -> bool {
        self.fixed_register.is_some()
    }
}
