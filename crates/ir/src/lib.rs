pub mod block;
pub mod builder;
pub mod code;
pub mod debuginfo;
pub mod inst;
pub mod types;
pub mod value;
pub mod verify;

pub use block::{BasicBlock, BlockId};
pub use builder::CodeBuilder;
pub use code::IRCode;
pub use debuginfo::{DebugLocalInfo, LocalsMap, Position};
pub use inst::{BinopKind, IfKind, Inst, InstId, InstKind};
pub use types::Type;
pub use value::{Value, ValueId};
pub use verify::ConsistencyError;
