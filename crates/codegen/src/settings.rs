//! Codegen-wide options consulted by post-allocation passes.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Preserve debug info (positions, locals) bit-exact. Structural
    /// rewrites that could merge differently positioned code assert instead
    /// of proceeding when this is set.
    pub debug: bool,
}

impl CodegenOptions {
    pub fn debug() -> Self {
        Self { debug: true }
    }

    pub fn release() -> Self {
        Self { debug: false }
    }
}
