use crate::compiler::branch_table::BranchTable;
use crate::types::ValueType;
use alloc::vec::Vec;

/// The lowered form of one module-local function, ready to be interpreted.
///
/// `code` is the densely packed internal opcode stream produced by
/// [`crate::compiler::compile_function`]: every structural Wasm opcode has
/// already disappeared, branch targets are resolved absolute offsets, and
/// stack reconciliation for taken branches is baked into the branch
/// instructions themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub code: Vec<u8>,
    pub branch_tables: Vec<BranchTable>,
    /// Upper bound on operand-stack depth this function can reach; the VM
    /// sizes its stack buffer from this and the interpreter never checks
    /// for overflow again.
    pub max_depth: u32,
    /// Parameters plus declared locals.
    pub total_local_vars: u32,
    pub args: u32,
    pub result: Option<ValueType>,
}

impl CompiledFunction {
    pub fn returns(&self) -> bool {
        self.result.is_some()
    }
}
