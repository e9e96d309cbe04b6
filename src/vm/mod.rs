//! The interpreter: binds a [`crate::module::Module`] and a host registry
//! into a [`CompiledModule`], constructs a [`Vm`] against it, and executes
//! lowered bytecode under a gas budget, a memory cap, and a bounded
//! call-stack depth. See the crate docs for the full data-flow picture.

mod compiled_module;
mod config;
mod error;
mod func_slot;
mod gas;
mod interpreter;
mod process;
mod vm;

pub use compiled_module::{compile, CompiledModule};
pub use config::{VmConfig, MAX_MEMORY_BYTES};
pub use error::{EngineError, ExecError, SetupError};
pub use func_slot::FuncSlot;
pub use gas::GasAccountant;
pub use process::Process;
pub use vm::Vm;
