//! The module data model: a read-only description of a Wasm module as
//! produced by an external disassembler/validator. This crate treats
//! binary parsing and validation as an upstream collaborator's
//! responsibility (see the crate-level docs); everything here is the
//! interchange format the compiler consumes.

mod data;
mod export;
mod func_type;
mod function;
mod global;
mod import;
mod init_expr;
mod memory;
mod table;

pub use data::DataSegment;
pub use export::{Export, ExportKind};
pub use func_type::FuncType;
pub use function::{Function, FunctionKind};
pub use global::GlobalDecl;
pub use import::{Import, ImportKind};
pub use init_expr::InitExpr;
pub use memory::MemoryDecl;
pub use table::TableDecl;

use alloc::vec::Vec;

/// A parsed, validated Wasm module, ready to be handed to
/// [`crate::compiler::compile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub func_types: Vec<FuncType>,
    /// The function index space: imports first, then locally defined
    /// functions, in the order the original binary declared them.
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalDecl>,
    pub memory: Option<MemoryDecl>,
    pub table: Option<TableDecl>,
    pub imports: Vec<Import>,
    pub exports: Vec<Export>,
    /// Initializers applied to linear memory during module binding, in
    /// declaration order.
    pub data: Vec<DataSegment>,
    /// Present only so the compiler can reject it; this runtime never
    /// invokes a start function.
    pub start: Option<u32>,
}

impl Module {
    pub fn func_type_of(&self, func_idx: u32) -> Option<&FuncType> {
        let f = self.functions.get(func_idx as usize)?;
        self.func_types.get(f.type_idx as usize)
    }

    pub fn export_by_name(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| &*e.name == name)
    }
}
