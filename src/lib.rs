#![cfg_attr(not(feature = "std"), no_std)]
#![allow(dead_code)]

//! A deterministic, gas-metered WebAssembly execution engine for untrusted
//! smart-contract bytecode.
//!
//! This crate does not parse or validate `.wasm` binaries — that is treated
//! as an external collaborator's responsibility. It consumes an
//! already-disassembled [`module::Module`] (types, function bodies, globals,
//! memory, imports, exports) and takes it from there: lowering each function
//! body into a packed internal opcode stream ([`compiler`]) and interpreting
//! that stream under a gas budget, a memory cap, and a bounded call-stack
//! depth ([`vm`]).

extern crate alloc;

pub mod compiler;
pub mod host;
pub mod module;
pub mod types;
pub mod vm;

pub use compiler::CompileError;
pub use host::{HostFunction, HostRegistry, ImportName, ValueKind};
pub use module::{Export, Import, Module};
pub use types::{DropKeep, TrapCode, UntypedValue, ValueType};
pub use vm::{compile, CompiledModule, EngineError, ExecError, GasAccountant, Process, SetupError, Vm, VmConfig};
