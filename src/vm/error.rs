use crate::compiler::CompileError;
use crate::types::{TrapCode, ValueType};
use core::fmt::{self, Display, Formatter};

/// An error detected at VM construction or at `exec_code` entry, before the
/// dispatch loop ever runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupError {
    /// The compiled module's memory already exceeds the VM's configured
    /// limit; this is checked once, at construction.
    MemoryLimitExceeded { len: u32, limit: u32 },
    InvalidFunctionIndex { index: u32 },
    InvalidArgumentCount { expected: u32, found: u32 },
    /// The requested entry point resolves to a host function; this runtime
    /// only accepts module-local functions as entry points.
    EntryPointIsHostFunction { index: u32 },
    InvalidReturnType { declared: Option<ValueType> },
}

impl Display for SetupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::MemoryLimitExceeded { len, limit } => {
                write!(f, "memory of {len} bytes exceeds the configured limit of {limit} bytes")
            }
            SetupError::InvalidFunctionIndex { index } => {
                write!(f, "invalid function index {index}")
            }
            SetupError::InvalidArgumentCount { expected, found } => {
                write!(f, "expected {expected} arguments, found {found}")
            }
            SetupError::EntryPointIsHostFunction { index } => {
                write!(f, "function {index} is a host function and cannot be an entry point")
            }
            SetupError::InvalidReturnType { declared } => match declared {
                Some(ty) => write!(f, "unsupported declared return type: {ty}"),
                None => write!(f, "function declares no return type"),
            },
        }
    }
}

/// An error surfaced from a completed (or aborted) `exec_code` call.
///
/// This does not include the panic-carried traps described in the crate
/// docs' error-handling design: those propagate as genuine unwinds unless
/// [`crate::vm::VmConfig::with_recover_panic`] is set, in which case they
/// are caught at the `exec_code` boundary and wrapped in the `Trap`
/// variant here.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    Setup(SetupError),
    /// The gas accountant refused a step; this is a clean, non-panic exit.
    GasExhausted,
    /// A panic-carried trap, recovered via `catch_unwind` because
    /// `recover_panic` was enabled.
    Trap(TrapCode),
}

impl Display for ExecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Setup(e) => write!(f, "{e}"),
            ExecError::GasExhausted => write!(f, "gas limit exhausted"),
            ExecError::Trap(t) => write!(f, "trap: {t}"),
        }
    }
}

impl From<SetupError> for ExecError {
    fn from(e: SetupError) -> Self {
        ExecError::Setup(e)
    }
}

impl From<TrapCode> for ExecError {
    fn from(t: TrapCode) -> Self {
        ExecError::Trap(t)
    }
}

/// The crate-wide error type unifying all three strata (see crate docs,
/// error-handling design): compile-time, setup, and runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Compile(CompileError),
    Setup(SetupError),
    Exec(ExecError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Compile(e) => write!(f, "{e}"),
            EngineError::Setup(e) => write!(f, "{e}"),
            EngineError::Exec(e) => write!(f, "{e}"),
        }
    }
}

impl From<CompileError> for EngineError {
    fn from(e: CompileError) -> Self {
        EngineError::Compile(e)
    }
}

impl From<SetupError> for EngineError {
    fn from(e: SetupError) -> Self {
        EngineError::Setup(e)
    }
}

impl From<ExecError> for EngineError {
    fn from(e: ExecError) -> Self {
        EngineError::Exec(e)
    }
}
