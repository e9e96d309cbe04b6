use crate::types::ValueType;
use core::fmt::{self, Display, Formatter};

/// A static error raised while lowering a [`crate::module::Module`] into a
/// [`crate::vm::CompiledModule`].
///
/// Every variant here is caught before a VM ever exists: malformed
/// structural nesting, references to nonexistent labels/locals/globals, and
/// type mismatches on the symbolic stack are all compile-time traps, never
/// runtime ones (see crate docs, error handling design).
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The module declares a start function. Dynamic initialization is not
    /// permitted for smart contracts under this runtime.
    StartFunctionNotSupported,
    /// The module declares more than one linear memory. Kept for interface
    /// parity with the binding step that rejects it conceptually; never
    /// actually constructed, since [`crate::module::Module::memory`] is an
    /// `Option<MemoryDecl>` and so cannot structurally represent more than
    /// one memory in the first place.
    MultipleLinearMemories,
    /// A function, global, or local used a floating-point value type, which
    /// this integer-only engine does not lower.
    UnsupportedValueType(ValueType),
    /// A `br`/`br_if`/`br_table` referenced a label deeper than the current
    /// block nesting.
    UnresolvedLabel { depth: u32 },
    LocalIndexOutOfBounds { index: u32 },
    GlobalIndexOutOfBounds { index: u32 },
    FunctionIndexOutOfBounds { index: u32 },
    FunctionTypeIndexOutOfBounds { index: u32 },
    /// A module declares a memory instruction but no linear memory.
    MemoryRequired,
    /// A module declares `call_indirect` but no table.
    TableRequired,
    /// The symbolic operand stack underflowed during lowering — malformed
    /// instruction nesting from the upstream disassembler.
    StackUnderflow,
    /// `else` encountered without a matching open `if`.
    ElseWithoutIf,
    /// `end` encountered with no open block to close.
    EndWithoutMatchingBlock,
    /// A function body fell off its end (or an explicit `return`) without
    /// the control stack fully unwound, or unwound too far.
    UnbalancedControlStack,
    /// A global initializer expression referenced something other than
    /// `i32.const`, `i64.const`, or `global.get` of an already-initialized
    /// immutable import.
    InvalidGlobalInitializer,
    /// An imported function has no matching entry in the embedder's host
    /// registry.
    UnresolvedImportFunction { module: alloc::boxed::Box<str>, field: alloc::boxed::Box<str> },
    /// A data segment's `offset + bytes.len()` exceeds the memory's declared
    /// maximum; unlike growth within the maximum (which the module-binding
    /// layer performs in place), this cannot be satisfied at all.
    DataSegmentOutOfBounds { offset: u32, len: u32 },
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::StartFunctionNotSupported => {
                write!(f, "start entry is not supported in smart contracts")
            }
            CompileError::MultipleLinearMemories => {
                write!(f, "more than one linear memory in module")
            }
            CompileError::UnsupportedValueType(ty) => {
                write!(f, "unsupported value type: {ty}")
            }
            CompileError::UnresolvedLabel { depth } => {
                write!(f, "branch references unresolved label at depth {depth}")
            }
            CompileError::LocalIndexOutOfBounds { index } => {
                write!(f, "local index {index} out of bounds")
            }
            CompileError::GlobalIndexOutOfBounds { index } => {
                write!(f, "global index {index} out of bounds")
            }
            CompileError::FunctionIndexOutOfBounds { index } => {
                write!(f, "function index {index} out of bounds")
            }
            CompileError::FunctionTypeIndexOutOfBounds { index } => {
                write!(f, "function type index {index} out of bounds")
            }
            CompileError::MemoryRequired => {
                write!(f, "memory instruction used but module declares no memory")
            }
            CompileError::TableRequired => {
                write!(f, "call_indirect used but module declares no table")
            }
            CompileError::StackUnderflow => {
                write!(f, "operand stack underflow while lowering function body")
            }
            CompileError::ElseWithoutIf => write!(f, "else without matching if"),
            CompileError::EndWithoutMatchingBlock => write!(f, "end without matching block"),
            CompileError::UnbalancedControlStack => {
                write!(f, "function body left the control stack unbalanced")
            }
            CompileError::InvalidGlobalInitializer => {
                write!(f, "global initializer is not a supported constant form")
            }
            CompileError::UnresolvedImportFunction { module, field } => {
                write!(f, "unresolved import function {module}::{field}")
            }
            CompileError::DataSegmentOutOfBounds { offset, len } => {
                write!(f, "data segment at offset {offset} (length {len}) exceeds memory's declared maximum")
            }
        }
    }
}
