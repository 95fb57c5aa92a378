//! Removal of moves whose source and destination coincide.

use rustc_hash::FxHashMap;

use dexc_ir::{IRCode, InstId, InstKind, ValueId};

use crate::regalloc::RegisterAllocator;

/// Tracks which value is resident in each physical register while walking a
/// block in order. A move is eliminated when the allocator assigns source
/// and destination the same register, or when the destination registers are
/// already known to hold the source's value (each half, for wide moves).
pub struct MoveEliminator<'a> {
    allocator: &'a dyn RegisterAllocator,
    /// register -> (value, half) currently resident in it. The half index
    /// distinguishes the low and high registers of a wide value.
    resident: FxHashMap<u32, (ValueId, u32)>,
}

impl<'a> MoveEliminator<'a> {
    pub fn new(allocator: &'a dyn RegisterAllocator) -> Self {
        Self {
            allocator,
            resident: FxHashMap::default(),
        }
    }

    /// Decide whether `inst` is a removable move, updating residency state
    /// either way. Must be called exactly once per instruction, in block
    /// order.
    pub fn should_be_eliminated(&mut self, code: &IRCode, inst: InstId) -> bool {
        let data = code.inst(inst);

        if let InstKind::Move { dest, src } = data.kind {
            let width = code.value(dest).required_registers();
            let src_reg = self.allocator.register_for_value(src, data.number);
            let dst_reg = self.allocator.register_for_value(dest, data.number);

            if src_reg == dst_reg {
                return true;
            }
            let aliased = (0..width).all(|i| {
                match (
                    self.resident.get(&(dst_reg + i)),
                    self.resident.get(&(src_reg + i)),
                ) {
                    (Some(d), Some(s)) => d == s,
                    _ => false,
                }
            });
            if aliased {
                return true;
            }

            // The move executes: its destination registers now hold whatever
            // the source registers hold (the source value itself if we have
            // no earlier record of it). Read all source halves before
            // writing; a wide move may overlap its own source.
            let halves: Vec<(ValueId, u32)> = (0..width)
                .map(|i| {
                    self.resident
                        .get(&(src_reg + i))
                        .copied()
                        .unwrap_or((src, i))
                })
                .collect();
            for (i, &half) in halves.iter().enumerate() {
                self.resident.insert(src_reg + i as u32, half);
            }
            for (i, &half) in halves.iter().enumerate() {
                self.resident.insert(dst_reg + i as u32, half);
            }
            return false;
        }

        // Any other register write clobbers residency for the registers it
        // covers.
        if let Some(out) = data.out_value() {
            let value = code.value(out);
            if value.needs_register {
                let register = self.allocator.register_for_value(out, data.number);
                for i in 0..value.required_registers() {
                    self.resident.remove(&(register + i));
                }
            }
        }
        false
    }
}
