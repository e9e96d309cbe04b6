//! Lowers an already-disassembled module-local function body into the
//! packed internal opcode stream the interpreter in [`crate::vm`] executes:
//! structural opcodes disappear, branches become absolute jumps with
//! pre-resolved stack reconciliation, and `br_table` sites get a side table
//! of resolved targets. See the crate docs for the split of responsibility
//! between this crate and the upstream disassembler/validator.

mod branch_table;
mod compiled_function;
mod control_frame;
mod error;
mod lowering;

pub use branch_table::{BranchTable, Target};
pub use compiled_function::CompiledFunction;
pub use error::CompileError;
pub use lowering::compile_function;
