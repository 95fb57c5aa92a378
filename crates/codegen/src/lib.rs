pub mod peephole;
pub mod regalloc;
pub mod settings;

pub use peephole::optimize;
pub use regalloc::{IntervalSplit, LiveIntervals, RegisterAllocator, RegisterMapping};
pub use settings::CodegenOptions;
