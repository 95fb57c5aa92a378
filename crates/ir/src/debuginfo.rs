//! Source positions and the debug-locals state carried on blocks.

use std::collections::BTreeMap;

use smol_str::SmolStr;

/// Source position attached to an instruction.
///
/// Positions participate in the line-number table emitted for the debugger,
/// so passes that move instructions must only do so when the observable
/// position sequence is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    #[default]
    None,
    Line(u32),
}

impl Position {
    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }
}

/// A source-level local variable visible to the debugger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DebugLocalInfo {
    pub name: SmolStr,
    pub ty: SmolStr,
}

impl DebugLocalInfo {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Mapping from physical register number to the local resident in it.
///
/// Ordered so that equality and hashing are structural; blocks own their map
/// and replay clones it rather than sharing.
pub type LocalsMap = BTreeMap<u32, DebugLocalInfo>;

/// Apply a locals delta: `ending` entries stop being visible, `starting`
/// entries become visible.
pub fn apply_locals_change(ending: &LocalsMap, starting: &LocalsMap, locals: &mut LocalsMap) {
    for register in ending.keys() {
        locals.remove(register);
    }
    for (register, local) in starting {
        locals.insert(*register, local.clone());
    }
}
