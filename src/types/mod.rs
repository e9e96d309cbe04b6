mod drop_keep;
mod error;
mod opcode;
mod value;
mod value_type;

pub use drop_keep::DropKeep;
pub use error::TrapCode;
pub use opcode::{DisasmOp, Opcode};
pub use value::UntypedValue;
pub use value_type::ValueType;

/// 64 KiB, the fixed granularity of linear-memory growth.
pub const PAGE_SIZE: u32 = 65536;
